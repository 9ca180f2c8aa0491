use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{generate_bounded, json_payload, opportunity_brief, profile_brief, ParseError, StageError, StageOutcome};
use crate::scoring::domain::{CapabilityProfile, Opportunity};
use crate::scoring::generation::{CostLedger, GenerationRequest, TextGeneration};

/// One extracted reasoning step with its confidence and supporting evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningStep {
    pub statement: String,
    pub confidence: u8,
    pub evidence: Vec<String>,
}

/// Unstructured analysis contrasting the opportunity's requirements against
/// the profile, plus the extracted requirement/preference lists.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningAnalysis {
    pub narrative: String,
    pub explicit_requirements: Vec<String>,
    pub implicit_preferences: Vec<String>,
    pub steps: Vec<ReasoningStep>,
}

impl ReasoningAnalysis {
    /// Minimal analysis retaining the raw narrative when parsing failed.
    pub fn minimal(narrative: String) -> Self {
        Self {
            narrative,
            explicit_requirements: Vec::new(),
            implicit_preferences: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Empty context used by fast mode, which skips this stage entirely.
    pub fn empty() -> Self {
        Self::minimal(String::new())
    }
}

#[derive(Deserialize)]
struct ReasoningDto {
    analysis: Option<String>,
    #[serde(default)]
    explicit_requirements: Vec<String>,
    #[serde(default)]
    implicit_preferences: Vec<String>,
    #[serde(default)]
    steps: Vec<ReasoningStepDto>,
}

#[derive(Deserialize)]
struct ReasoningStepDto {
    statement: String,
    confidence: Option<f64>,
    #[serde(default)]
    evidence: Vec<String>,
}

/// First pipeline stage: requirements analysis.
pub struct ReasoningStage {
    generation: Arc<dyn TextGeneration>,
    timeout: Duration,
    max_tokens: u32,
}

impl ReasoningStage {
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
    ) -> Result<StageOutcome<ReasoningAnalysis>, StageError> {
        let prompt = build_prompt(opportunity, profile);
        let request = GenerationRequest::freeform(prompt, self.max_tokens);
        let output = generate_bounded(self.generation.as_ref(), request, self.timeout).await?;
        let ledger = CostLedger::single("reasoning", &output);

        let analysis = match parse(&output.text) {
            Ok(analysis) => analysis,
            Err(error) => {
                // Parse failure degrades to a minimal analysis rather than
                // failing the pipeline.
                debug!(%error, "reasoning response did not parse, keeping raw narrative");
                ReasoningAnalysis::minimal(output.text.clone())
            }
        };

        Ok(StageOutcome {
            value: analysis,
            ledger,
        })
    }
}

fn build_prompt(opportunity: &Opportunity, profile: &CapabilityProfile) -> String {
    format!(
        "Analyze how well this contractor fits this government contracting opportunity.\n\n\
         {opportunity}\n\n{profile}\n\n\
         Contrast the opportunity's explicit requirements and implicit preferences against the \
         contractor's demonstrated capabilities. Respond with JSON: {{\"analysis\": string, \
         \"explicit_requirements\": [string], \"implicit_preferences\": [string], \
         \"steps\": [{{\"statement\": string, \"confidence\": number 0-100, \
         \"evidence\": [string]}}]}}",
        opportunity = opportunity_brief(opportunity),
        profile = profile_brief(profile),
    )
}

fn parse(text: &str) -> Result<ReasoningAnalysis, ParseError> {
    let dto: ReasoningDto = serde_json::from_str(json_payload(text))
        .map_err(|error| ParseError(error.to_string()))?;

    Ok(ReasoningAnalysis {
        narrative: dto.analysis.unwrap_or_default(),
        explicit_requirements: dto.explicit_requirements,
        implicit_preferences: dto.implicit_preferences,
        steps: dto
            .steps
            .into_iter()
            .map(|step| ReasoningStep {
                statement: step.statement,
                confidence: step
                    .confidence
                    .filter(|value| value.is_finite())
                    .map(|value| value.round().clamp(0.0, 100.0) as u8)
                    .unwrap_or(50),
                evidence: step.evidence,
            })
            .collect(),
    })
}
