use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::verification::VerifiedScoring;
use super::{generate_bounded, json_payload, opportunity_brief, profile_brief, ParseError, StageError, StageOutcome};
use crate::scoring::domain::{
    CapabilityProfile, CriticalGap, GapSeverity, Opportunity, StrategicInsights,
};
use crate::scoring::generation::{CostLedger, GenerationRequest, TextGeneration};

#[derive(Deserialize)]
struct InsightDto {
    win_probability: Option<f64>,
    win_probability_low: Option<f64>,
    win_probability_high: Option<f64>,
    #[serde(default)]
    competitive_advantages: Vec<String>,
    #[serde(default)]
    critical_gaps: Vec<GapDto>,
    #[serde(default)]
    teaming_recommendations: Vec<String>,
    #[serde(default)]
    proposal_themes: Vec<String>,
}

#[derive(Deserialize)]
struct GapDto {
    description: String,
    severity: Option<String>,
}

/// Final pipeline stage: win probability, advantages, gaps, and strategy.
pub struct InsightStage {
    generation: Arc<dyn TextGeneration>,
    timeout: Duration,
    max_tokens: u32,
}

impl InsightStage {
    pub fn new(generation: Arc<dyn TextGeneration>, timeout: Duration, max_tokens: u32) -> Self {
        Self {
            generation,
            timeout,
            max_tokens,
        }
    }

    pub async fn run(
        &self,
        opportunity: &Opportunity,
        profile: &CapabilityProfile,
        verified: &VerifiedScoring,
    ) -> Result<StageOutcome<StrategicInsights>, StageError> {
        let prompt = build_prompt(opportunity, profile, verified);
        let request = GenerationRequest::structured(prompt, self.max_tokens);
        let output = generate_bounded(self.generation.as_ref(), request, self.timeout).await?;
        let ledger = CostLedger::single("insight", &output);

        let insights = match parse(&output.text) {
            Ok(insights) => insights,
            Err(error) => {
                debug!(%error, "insight response did not parse, using conservative placeholder");
                StrategicInsights::conservative(verified.scoring.overall_score)
            }
        };

        Ok(StageOutcome {
            value: insights,
            ledger,
        })
    }
}

fn build_prompt(
    opportunity: &Opportunity,
    profile: &CapabilityProfile,
    verified: &VerifiedScoring,
) -> String {
    format!(
        "Given a verified fitness score of {score}/100 (confidence {confidence}), produce \
         pursuit strategy for this pairing.\n\n{opportunity}\n\n{profile}\n\n\
         Respond with JSON only: {{\"win_probability\": number 0-100, \
         \"win_probability_low\": number, \"win_probability_high\": number, \
         \"competitive_advantages\": [string, highest priority first], \
         \"critical_gaps\": [{{\"description\": string, \"severity\": \
         \"minor\"|\"moderate\"|\"critical\"}}], \"teaming_recommendations\": [string], \
         \"proposal_themes\": [string]}}",
        score = verified.scoring.overall_score,
        confidence = verified.confidence,
        opportunity = opportunity_brief(opportunity),
        profile = profile_brief(profile),
    )
}

fn parse(text: &str) -> Result<StrategicInsights, ParseError> {
    let dto: InsightDto =
        serde_json::from_str(json_payload(text)).map_err(|error| ParseError(error.to_string()))?;

    let win = bounded(dto.win_probability).unwrap_or(50);
    let low = bounded(dto.win_probability_low).unwrap_or_else(|| win.saturating_sub(10));
    let high = bounded(dto.win_probability_high).unwrap_or_else(|| (win + 10).min(100));

    Ok(StrategicInsights {
        win_probability: win,
        win_probability_range: (low.min(win), high.max(win)),
        competitive_advantages: dto.competitive_advantages,
        critical_gaps: dto
            .critical_gaps
            .into_iter()
            .map(|gap| CriticalGap {
                description: gap.description,
                severity: parse_severity(gap.severity.as_deref()),
            })
            .collect(),
        teaming_recommendations: dto.teaming_recommendations,
        proposal_themes: dto.proposal_themes,
    })
}

fn bounded(value: Option<f64>) -> Option<u8> {
    value
        .filter(|value| value.is_finite())
        .map(|value| value.round().clamp(0.0, 100.0) as u8)
}

fn parse_severity(raw: Option<&str>) -> GapSeverity {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("critical") => GapSeverity::Critical,
        Some("minor") => GapSeverity::Minor,
        _ => GapSeverity::Moderate,
    }
}
