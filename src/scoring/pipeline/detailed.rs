use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use super::reasoning::ReasoningAnalysis;
use super::{generate_bounded, json_payload, opportunity_brief, profile_brief, ParseError, StageError, StageOutcome};
use crate::config::CategoryWeights;
use crate::scoring::domain::{clamp_score, CapabilityProfile, CategoryScore, Opportunity};
use crate::scoring::generation::{CostLedger, GenerationRequest, TextGeneration};

pub const PAST_PERFORMANCE: &str = "past_performance";
pub const TECHNICAL_CAPABILITY: &str = "technical_capability";
pub const STRATEGIC_FIT: &str = "strategic_fit";
pub const CREDIBILITY: &str = "credibility";

/// Category-weighted scoring produced by the structured-output stage.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailedScoring {
    pub overall_score: u8,
    pub categories: BTreeMap<String, CategoryScore>,
    pub reasoning: String,
}

impl DetailedScoring {
    /// Canonical safe default: neutral score per category with the parse
    /// error recorded in the reasoning field so the failure stays visible.
    pub fn neutral(weights: CategoryWeights, parse_error: &str) -> Self {
        let mut categories = BTreeMap::new();
        for (name, weight) in named_weights(weights) {
            categories.insert(
                name.to_string(),
                CategoryScore::neutral(weight, "no assessment available"),
            );
        }
        let overall_score = clamp_score(
            categories
                .values()
                .map(|category| category.contribution)
                .sum(),
        );
        Self {
            overall_score,
            categories,
            reasoning: format!("structured scoring unavailable: {parse_error}"),
        }
    }
}

fn named_weights(weights: CategoryWeights) -> [(&'static str, u8); 4] {
    [
        (PAST_PERFORMANCE, weights.past_performance),
        (TECHNICAL_CAPABILITY, weights.technical_capability),
        (STRATEGIC_FIT, weights.strategic_fit),
        (CREDIBILITY, weights.credibility),
    ]
}

#[derive(Deserialize)]
struct DetailedDto {
    overall_score: Option<serde_json::Value>,
    #[serde(default)]
    categories: BTreeMap<String, CategoryDto>,
    reasoning: Option<String>,
}

#[derive(Deserialize, Default)]
struct CategoryDto {
    score: Option<f64>,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    opportunities: Vec<String>,
    #[serde(default)]
    threats: Vec<String>,
}

/// Second pipeline stage: structured four-category scoring. Fast mode runs
/// only this stage against an empty reasoning context.
pub struct DetailedScoringStage {
    generation: Arc<dyn TextGeneration>,
    timeout: Duration,
    max_tokens: u32,
    weights: CategoryWeights,
}

impl DetailedScoringStage {
    pub fn new(
        generation: Arc<dyn TextGeneration>,
        timeout: Duration,
        max_tokens: u32,
        weights: CategoryWeights,
    ) -> Self {
        Self {
            generation,
            timeout,
            max_tokens,
            weights,
        }
    }

    pub async fn run(
        &self,
        opportunity: &Opportunity,
        profile: &CapabilityProfile,
        reasoning: &ReasoningAnalysis,
    ) -> Result<StageOutcome<DetailedScoring>, StageError> {
        let prompt = self.build_prompt(opportunity, profile, reasoning);
        let request = GenerationRequest::structured(prompt, self.max_tokens);
        let output = generate_bounded(self.generation.as_ref(), request, self.timeout).await?;
        let ledger = CostLedger::single("detailed_scoring", &output);

        let scoring = match parse(&output.text, self.weights) {
            Ok(scoring) => scoring,
            Err(error) => {
                warn!(%error, "detailed scoring response did not parse, substituting neutral scoring");
                DetailedScoring::neutral(self.weights, &error.to_string())
            }
        };

        Ok(StageOutcome {
            value: scoring,
            ledger,
        })
    }

    fn build_prompt(
        &self,
        opportunity: &Opportunity,
        profile: &CapabilityProfile,
        reasoning: &ReasoningAnalysis,
    ) -> String {
        let context = if reasoning.narrative.is_empty() {
            String::new()
        } else {
            format!("\n\nPrior analysis:\n{}", reasoning.narrative)
        };

        format!(
            "Score this contractor against this opportunity in exactly four categories: \
             past_performance (weight {pp}), technical_capability (weight {tc}), \
             strategic_fit (weight {sf}), credibility (weight {cr}).\n\n\
             {opportunity}\n\n{profile}{context}\n\n\
             Back every strength, weakness, opportunity, and threat with specific evidence \
             from the profile or solicitation, not generic statements. Respond with JSON only: \
             {{\"overall_score\": number 0-100, \"reasoning\": string, \"categories\": \
             {{\"past_performance\": {{\"score\": number 0-100, \"strengths\": [string], \
             \"weaknesses\": [string], \"opportunities\": [string], \"threats\": [string]}}, \
             \"technical_capability\": {{...}}, \"strategic_fit\": {{...}}, \
             \"credibility\": {{...}}}}}}",
            pp = self.weights.past_performance,
            tc = self.weights.technical_capability,
            sf = self.weights.strategic_fit,
            cr = self.weights.credibility,
            opportunity = opportunity_brief(opportunity),
            profile = profile_brief(profile),
        )
    }
}

fn parse(text: &str, weights: CategoryWeights) -> Result<DetailedScoring, ParseError> {
    let dto: DetailedDto =
        serde_json::from_str(json_payload(text)).map_err(|error| ParseError(error.to_string()))?;

    let mut categories = BTreeMap::new();
    for (name, weight) in named_weights(weights) {
        let category = match dto.categories.get(name) {
            Some(parsed) => {
                let score = parsed
                    .score
                    .filter(|value| value.is_finite())
                    .map(clamp_score)
                    .unwrap_or(50);
                CategoryScore {
                    score,
                    weight,
                    contribution: f64::from(score) * f64::from(weight) / 100.0,
                    strengths: parsed.strengths.clone(),
                    weaknesses: parsed.weaknesses.clone(),
                    opportunities: parsed.opportunities.clone(),
                    threats: parsed.threats.clone(),
                }
            }
            None => CategoryScore::neutral(weight, "category missing from assessment"),
        };
        categories.insert(name.to_string(), category);
    }

    let contribution_sum: f64 = categories
        .values()
        .map(|category| category.contribution)
        .sum();

    // The model-reported overall wins only when it is numeric and in range;
    // otherwise the sum of category contributions is authoritative.
    let overall_score = match dto.overall_score.as_ref().and_then(reported_score) {
        Some(reported) => reported,
        None => clamp_score(contribution_sum),
    };

    Ok(DetailedScoring {
        overall_score,
        categories,
        reasoning: dto.reasoning.unwrap_or_default(),
    })
}

fn reported_score(value: &serde_json::Value) -> Option<u8> {
    let number = value.as_f64()?;
    if number.is_finite() && (0.0..=100.0).contains(&number) {
        Some(number.round() as u8)
    } else {
        None
    }
}
