use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::detailed::DetailedScoring;
use super::{generate_bounded, json_payload, ParseError, StageError, StageOutcome};
use crate::scoring::generation::{CostLedger, GenerationRequest, TextGeneration};

/// Detailed scoring annotated with an independent consistency review.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedScoring {
    pub scoring: DetailedScoring,
    pub verification_notes: Vec<String>,
    pub adjustments: Vec<String>,
    pub confidence: u8,
}

impl VerifiedScoring {
    /// Pass-through used when verification fails: the scoring is kept
    /// unchanged and confidence stays at the pipeline default.
    pub fn unverified(scoring: DetailedScoring) -> Self {
        Self {
            scoring,
            verification_notes: Vec::new(),
            adjustments: Vec::new(),
            confidence: 75,
        }
    }
}

#[derive(Deserialize)]
struct VerificationDto {
    #[serde(default)]
    verification_notes: Vec<String>,
    #[serde(default)]
    adjustments: Vec<String>,
    confidence: Option<f64>,
}

/// Third pipeline stage: cross-category coherence and evidence-quality review.
pub struct VerificationStage {
    generation: Arc<dyn TextGeneration>,
    timeout: Duration,
    max_tokens: u32,
}

impl VerificationStage {
    pub fn new(generation: Arc<dyn TextGeneration>, timeout: Duration, max_tokens: u32) -> Self {
        Self {
            generation,
            timeout,
            max_tokens,
        }
    }

    pub async fn run(
        &self,
        scoring: &DetailedScoring,
    ) -> Result<StageOutcome<VerifiedScoring>, StageError> {
        let prompt = build_prompt(scoring);
        let request = GenerationRequest::structured(prompt, self.max_tokens);
        let output = generate_bounded(self.generation.as_ref(), request, self.timeout).await?;
        let ledger = CostLedger::single("verification", &output);

        let verified = match parse(&output.text, scoring) {
            Ok(verified) => verified,
            Err(error) => {
                debug!(%error, "verification response did not parse, passing scoring through");
                VerifiedScoring::unverified(scoring.clone())
            }
        };

        Ok(StageOutcome {
            value: verified,
            ledger,
        })
    }
}

fn build_prompt(scoring: &DetailedScoring) -> String {
    let summary = serde_json::json!({
        "overall_score": scoring.overall_score,
        "reasoning": scoring.reasoning,
        "categories": scoring
            .categories
            .iter()
            .map(|(name, category)| {
                (
                    name.clone(),
                    serde_json::json!({
                        "score": category.score,
                        "strengths": category.strengths,
                        "weaknesses": category.weaknesses,
                    }),
                )
            })
            .collect::<serde_json::Map<_, _>>(),
    });

    format!(
        "Re-examine this opportunity scoring for internal consistency: do the category scores \
         cohere with each other and with the cited evidence? Flag categories whose evidence is \
         generic or contradictory.\n\nScoring under review:\n{summary}\n\n\
         Respond with JSON only: {{\"verification_notes\": [string], \"adjustments\": [string], \
         \"confidence\": number 0-100}}"
    )
}

fn parse(text: &str, scoring: &DetailedScoring) -> Result<VerifiedScoring, ParseError> {
    let dto: VerificationDto =
        serde_json::from_str(json_payload(text)).map_err(|error| ParseError(error.to_string()))?;

    Ok(VerifiedScoring {
        scoring: scoring.clone(),
        verification_notes: dto.verification_notes,
        adjustments: dto.adjustments,
        confidence: dto
            .confidence
            .filter(|value| value.is_finite())
            .map(|value| value.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(75),
    })
}
