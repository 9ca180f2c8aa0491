mod detailed;
mod insight;
mod reasoning;
mod verification;

pub use detailed::{DetailedScoring, DetailedScoringStage};
pub use insight::InsightStage;
pub use reasoning::{ReasoningAnalysis, ReasoningStage, ReasoningStep};
pub use verification::{VerificationStage, VerifiedScoring};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::domain::{
    CapabilityProfile, Opportunity, ScoreMode, ScoreResult, SemanticAnalysis, StrategicInsights,
};
use super::generation::{CostLedger, GenerationError, GenerationOutput, GenerationRequest, TextGeneration};
use crate::config::ScoringConfig;

/// Algorithm tag for pipeline-produced results.
pub const GENERATIVE_VERSION: &str = "gen-v2";

/// Confidence used when no stage produced an explicit value.
const DEFAULT_CONFIDENCE: u8 = 75;

/// Value parsed from a stage response paired with the stage's spend.
#[derive(Debug, Clone)]
pub struct StageOutcome<T> {
    pub value: T,
    pub ledger: CostLedger,
}

/// Malformed structured output from a generation stage.
#[derive(Debug, thiserror::Error)]
#[error("malformed structured output: {0}")]
pub struct ParseError(pub String);

/// Failure surfaced by a stage rather than a crash.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Pipeline-level failure the orchestrator classifies for fallback.
#[derive(Debug, thiserror::Error)]
#[error("scoring pipeline failed at {stage}: {source}")]
pub struct PipelineError {
    pub stage: &'static str,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    /// True when the failure stems from a provider outage or timeout, in
    /// which case deterministic fallback is appropriate.
    pub fn is_outage(&self) -> bool {
        match &self.source {
            StageError::Generation(error) => error.is_outage(),
            StageError::Parse(_) => false,
        }
    }
}

/// Run one generation call under the configured ceiling, rejecting empty output.
pub(crate) async fn generate_bounded(
    generation: &dyn TextGeneration,
    request: GenerationRequest,
    timeout: Duration,
) -> Result<GenerationOutput, GenerationError> {
    let output = tokio::time::timeout(timeout, generation.generate(request))
        .await
        .map_err(|_| GenerationError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        })??;

    if output.text.trim().is_empty() {
        return Err(GenerationError::Empty);
    }
    Ok(output)
}

/// Strip code fences and surrounding prose so a strict JSON parse can run on
/// the structural payload alone.
pub(crate) fn json_payload(text: &str) -> &str {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.strip_suffix("```").unwrap_or(rest))
        .unwrap_or(trimmed);

    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if end > start => &unfenced[start..=end],
        _ => unfenced,
    }
}

/// Compact opportunity description shared by the stage prompt builders.
pub(crate) fn opportunity_brief(opportunity: &Opportunity) -> String {
    format!(
        "Opportunity {id}: \"{title}\" from {agency}. NAICS: {naics}. Estimated value: {value}. \
         Set-aside: {set_aside}. Required clearance: {clearance:?}. Place of performance: {place}. \
         Description: {description}",
        id = opportunity.opportunity_id.0,
        title = opportunity.title,
        agency = opportunity.agency,
        naics = opportunity.naics_code.as_deref().unwrap_or("unspecified"),
        value = opportunity
            .estimated_value
            .map(|value| format!("${value}"))
            .unwrap_or_else(|| "unspecified".to_string()),
        set_aside = opportunity
            .set_aside
            .map(|set_aside| format!("{set_aside:?}"))
            .unwrap_or_else(|| "none".to_string()),
        clearance = opportunity.required_clearance,
        place = opportunity
            .place_of_performance
            .as_deref()
            .unwrap_or("unspecified"),
        description = opportunity.description,
    )
}

/// Compact profile description shared by the stage prompt builders.
pub(crate) fn profile_brief(profile: &CapabilityProfile) -> String {
    let past_performance: Vec<String> = profile
        .past_performance
        .iter()
        .map(|record| {
            format!(
                "{} (NAICS {}, ${})",
                record.agency, record.naics_code, record.contract_value
            )
        })
        .collect();

    format!(
        "Contractor profile {id}: primary NAICS {primary}, secondary [{secondary}], \
         certifications {certs:?}, clearance {clearance:?}, geographic preferences [{geo}], \
         capabilities [{caps}], past performance [{past}]",
        id = profile.profile_id.0,
        primary = profile.primary_naics.as_deref().unwrap_or("none"),
        secondary = profile.secondary_naics.join(", "),
        certs = profile.certifications,
        clearance = profile.clearance,
        geo = profile.geographic_preferences.join(", "),
        caps = profile.capabilities.join(", "),
        past = past_performance.join("; "),
    )
}

/// Multi-step generative scoring pipeline.
///
/// Advanced mode runs `Reasoning -> DetailedScoring -> Verification -> Insight`
/// and compiles the full result; fast mode collapses to a single detailed
/// scoring pass over an empty reasoning context.
pub struct ScoringPipeline {
    reasoning: ReasoningStage,
    detailed: DetailedScoringStage,
    verification: VerificationStage,
    insight: InsightStage,
}

impl ScoringPipeline {
    pub fn new(generation: Arc<dyn TextGeneration>, config: &ScoringConfig) -> Self {
        let timeout = config.generation_timeout();
        let max_tokens = config.generation_max_tokens;
        Self {
            reasoning: ReasoningStage::new(generation.clone(), timeout, max_tokens),
            detailed: DetailedScoringStage::new(
                generation.clone(),
                timeout,
                max_tokens,
                config.category_weights,
            ),
            verification: VerificationStage::new(generation.clone(), timeout, max_tokens),
            insight: InsightStage::new(generation, timeout, max_tokens),
        }
    }

    pub async fn score(
        &self,
        opportunity: &Opportunity,
        profile: &CapabilityProfile,
        mode: ScoreMode,
    ) -> Result<ScoreResult, PipelineError> {
        match mode {
            ScoreMode::Fast => self.score_fast(opportunity, profile).await,
            ScoreMode::Advanced => self.score_advanced(opportunity, profile).await,
        }
    }

    async fn score_fast(
        &self,
        opportunity: &Opportunity,
        profile: &CapabilityProfile,
    ) -> Result<ScoreResult, PipelineError> {
        let reasoning = ReasoningAnalysis::empty();
        let detailed = self
            .detailed
            .run(opportunity, profile, &reasoning)
            .await
            .map_err(|source| PipelineError {
                stage: "detailed_scoring",
                source,
            })?;

        debug!(score = detailed.value.overall_score, "fast pipeline scored");

        let mut ledger = CostLedger::new();
        ledger.merge(detailed.ledger);

        Ok(compile(
            detailed.value,
            None,
            StrategicInsights::heuristic(0),
            None,
            ledger,
            true,
        ))
    }

    async fn score_advanced(
        &self,
        opportunity: &Opportunity,
        profile: &CapabilityProfile,
    ) -> Result<ScoreResult, PipelineError> {
        let mut ledger = CostLedger::new();

        let reasoning = self
            .reasoning
            .run(opportunity, profile)
            .await
            .map_err(|source| PipelineError {
                stage: "reasoning",
                source,
            })?;
        ledger.merge(reasoning.ledger);

        let detailed = self
            .detailed
            .run(opportunity, profile, &reasoning.value)
            .await
            .map_err(|source| PipelineError {
                stage: "detailed_scoring",
                source,
            })?;
        ledger.merge(detailed.ledger);

        // Verification and insight absorb their own generation failures so a
        // late-stage outage never discards the scoring already paid for.
        let verified = match self.verification.run(&detailed.value).await {
            Ok(outcome) => {
                ledger.merge(outcome.ledger);
                outcome.value
            }
            Err(error) => {
                warn!(%error, "verification stage failed, passing scoring through");
                VerifiedScoring::unverified(detailed.value.clone())
            }
        };

        let insights = match self
            .insight
            .run(opportunity, profile, &verified)
            .await
        {
            Ok(outcome) => {
                ledger.merge(outcome.ledger);
                outcome.value
            }
            Err(error) => {
                warn!(%error, "insight stage failed, using conservative placeholder");
                StrategicInsights::conservative(verified.scoring.overall_score)
            }
        };

        let confidence = Some(verified.confidence);
        let semantic = SemanticAnalysis {
            narrative: reasoning.value.narrative.clone(),
            explicit_requirements: reasoning.value.explicit_requirements.clone(),
            implicit_preferences: reasoning.value.implicit_preferences.clone(),
            verification_notes: verified.verification_notes.clone(),
        };

        Ok(compile(
            verified.scoring,
            Some(semantic),
            insights,
            confidence,
            ledger,
            false,
        ))
    }
}

/// Compile step: enforces the final invariants regardless of what the stages
/// produced. Overall score is clamped to an integer in [0,100], confidence
/// defaults when missing, and cost/latency come from the merged ledger.
fn compile(
    detailed: DetailedScoring,
    semantic_analysis: Option<SemanticAnalysis>,
    mut insights: StrategicInsights,
    confidence: Option<u8>,
    ledger: CostLedger,
    fast: bool,
) -> ScoreResult {
    let overall_score = detailed.overall_score.min(100);

    if fast {
        insights = StrategicInsights::heuristic(overall_score);
    }

    let mut recommendations: Vec<String> = insights
        .critical_gaps
        .iter()
        .map(|gap| format!("Close {:?} gap: {}", gap.severity, gap.description))
        .collect();
    recommendations.extend(insights.teaming_recommendations.iter().cloned());
    recommendations.extend(
        insights
            .proposal_themes
            .iter()
            .map(|theme| format!("Proposal theme: {theme}")),
    );

    ScoreResult {
        overall_score,
        confidence: confidence.unwrap_or(DEFAULT_CONFIDENCE).min(100),
        algorithm_version: GENERATIVE_VERSION.to_string(),
        categories: detailed.categories,
        semantic_analysis,
        strategic_insights: Some(insights),
        recommendations,
        cost_units: ledger.total_cost(),
        processing_time_ms: ledger.total_latency_ms(),
    }
}
