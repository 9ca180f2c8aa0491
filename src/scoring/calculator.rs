use std::collections::BTreeMap;

use super::domain::{
    clamp_score, CapabilityProfile, CategoryScore, ClearanceLevel, Opportunity, ScoreResult,
};

/// Algorithm tag for deterministic rule-based results.
pub const CALCULATION_VERSION: &str = "calc-v2";

const CLASSIFICATION_WEIGHT: u8 = 30;
const GEOGRAPHIC_WEIGHT: u8 = 15;
const SET_ASIDE_WEIGHT: u8 = 20;
const VALUE_FIT_WEIGHT: u8 = 15;
const CLEARANCE_WEIGHT: u8 = 20;

/// Midpoint contributed by a factor with no comparable data, so missing
/// fields never read as a hard mismatch.
const NEUTRAL_SCORE: u8 = 50;

struct Factor {
    name: &'static str,
    score: u8,
    weight: u8,
    comparable: bool,
    note: String,
}

/// Deterministic, rule-based scorer. Pure function of (opportunity, profile);
/// malformed input degrades to neutral factors and never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreCalculator;

impl ScoreCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn calculate(&self, opportunity: &Opportunity, profile: &CapabilityProfile) -> ScoreResult {
        let factors = vec![
            classification_factor(opportunity, profile),
            geographic_factor(opportunity, profile),
            set_aside_factor(opportunity, profile),
            value_fit_factor(opportunity, profile),
            clearance_factor(opportunity, profile),
        ];

        let weighted_sum: f64 = factors
            .iter()
            .map(|factor| f64::from(factor.score) * f64::from(factor.weight))
            .sum();
        let overall_score = clamp_score(weighted_sum / 100.0);

        let comparable = factors.iter().filter(|factor| factor.comparable).count() as u8;
        let confidence = (50 + comparable * 10).min(100);

        let mut categories = BTreeMap::new();
        let mut recommendations = Vec::new();
        for factor in factors {
            if factor.score < NEUTRAL_SCORE && factor.comparable {
                recommendations.push(format!("Address weak {}: {}", factor.name, factor.note));
            }
            categories.insert(
                factor.name.to_string(),
                CategoryScore {
                    score: factor.score,
                    weight: factor.weight,
                    contribution: f64::from(factor.score) * f64::from(factor.weight) / 100.0,
                    strengths: if factor.score >= 70 {
                        vec![factor.note.clone()]
                    } else {
                        Vec::new()
                    },
                    weaknesses: if factor.score < 70 {
                        vec![factor.note]
                    } else {
                        Vec::new()
                    },
                    opportunities: Vec::new(),
                    threats: Vec::new(),
                },
            );
        }

        ScoreResult {
            overall_score,
            confidence,
            algorithm_version: CALCULATION_VERSION.to_string(),
            categories,
            semantic_analysis: None,
            strategic_insights: None,
            recommendations,
            cost_units: 0.0,
            processing_time_ms: 0,
        }
    }
}

fn classification_factor(opportunity: &Opportunity, profile: &CapabilityProfile) -> Factor {
    let (score, comparable, note) = match (&opportunity.naics_code, &profile.primary_naics) {
        (Some(required), Some(primary)) if required == primary => (
            100,
            true,
            format!("primary NAICS {primary} matches the solicitation exactly"),
        ),
        (Some(required), _) if profile.secondary_naics.iter().any(|code| code == required) => (
            70,
            true,
            format!("secondary NAICS {required} covers the solicitation"),
        ),
        (Some(required), Some(primary)) if shares_industry_group(required, primary) => (
            55,
            true,
            format!("primary NAICS {primary} shares the {required} industry group"),
        ),
        (Some(required), _) => (
            10,
            true,
            format!("no classification overlap with required NAICS {required}"),
        ),
        _ => (
            NEUTRAL_SCORE,
            false,
            "classification codes unavailable for comparison".to_string(),
        ),
    };

    Factor {
        name: "classification_match",
        score,
        weight: CLASSIFICATION_WEIGHT,
        comparable,
        note,
    }
}

fn shares_industry_group(required: &str, primary: &str) -> bool {
    required.len() >= 4 && primary.len() >= 4 && required.as_bytes()[..4] == primary.as_bytes()[..4]
}

fn geographic_factor(opportunity: &Opportunity, profile: &CapabilityProfile) -> Factor {
    let (score, comparable, note) = match &opportunity.place_of_performance {
        Some(place) if profile.geographic_preferences.is_empty() => (
            NEUTRAL_SCORE,
            false,
            format!("no geographic preferences declared; performance in {place}"),
        ),
        Some(place)
            if profile
                .geographic_preferences
                .iter()
                .any(|preferred| preferred.eq_ignore_ascii_case(place)) =>
        {
            (100, true, format!("{place} is a preferred location"))
        }
        Some(place) => (
            20,
            true,
            format!("{place} is outside the declared geographic preferences"),
        ),
        None => (
            NEUTRAL_SCORE,
            false,
            "place of performance unspecified".to_string(),
        ),
    };

    Factor {
        name: "geographic_match",
        score,
        weight: GEOGRAPHIC_WEIGHT,
        comparable,
        note,
    }
}

fn set_aside_factor(opportunity: &Opportunity, profile: &CapabilityProfile) -> Factor {
    let (score, comparable, note) = match opportunity.set_aside {
        Some(set_aside) => {
            if profile
                .certifications
                .iter()
                .any(|certification| certification.satisfies(set_aside))
            {
                (
                    100,
                    true,
                    format!("certification satisfies the {set_aside:?} set-aside"),
                )
            } else {
                (
                    0,
                    true,
                    format!("no certification satisfies the {set_aside:?} set-aside"),
                )
            }
        }
        None => (
            75,
            true,
            "full and open competition, no set-aside barrier".to_string(),
        ),
    };

    Factor {
        name: "set_aside_match",
        score,
        weight: SET_ASIDE_WEIGHT,
        comparable,
        note,
    }
}

fn value_fit_factor(opportunity: &Opportunity, profile: &CapabilityProfile) -> Factor {
    let largest_performed = profile
        .past_performance
        .iter()
        .map(|record| record.contract_value)
        .max();

    let (score, comparable, note) = match (opportunity.estimated_value, largest_performed) {
        (Some(estimated), Some(largest)) if largest > 0 => {
            let ratio = estimated as f64 / largest as f64;
            if (0.5..=2.0).contains(&ratio) {
                (
                    100,
                    true,
                    format!("estimated value ${estimated} sits inside the proven delivery range"),
                )
            } else if (0.1..=5.0).contains(&ratio) {
                (
                    70,
                    true,
                    format!("estimated value ${estimated} stretches the proven delivery range"),
                )
            } else if ratio > 5.0 {
                (
                    30,
                    true,
                    format!("estimated value ${estimated} far exceeds the largest prior contract"),
                )
            } else {
                (
                    55,
                    true,
                    format!("estimated value ${estimated} is well below prior contract scale"),
                )
            }
        }
        _ => (
            NEUTRAL_SCORE,
            false,
            "no value history available for comparison".to_string(),
        ),
    };

    Factor {
        name: "value_fit",
        score,
        weight: VALUE_FIT_WEIGHT,
        comparable,
        note,
    }
}

fn clearance_factor(opportunity: &Opportunity, profile: &CapabilityProfile) -> Factor {
    let (score, comparable, note) = if opportunity.required_clearance == ClearanceLevel::None {
        (100, true, "no clearance requirement".to_string())
    } else if profile.clearance >= opportunity.required_clearance {
        (
            100,
            true,
            format!("{:?} clearance meets the requirement", profile.clearance),
        )
    } else if profile.clearance > ClearanceLevel::None {
        (
            25,
            true,
            format!(
                "{:?} clearance falls short of required {:?}",
                profile.clearance, opportunity.required_clearance
            ),
        )
    } else {
        (
            0,
            true,
            format!(
                "no clearance held; {:?} required",
                opportunity.required_clearance
            ),
        )
    };

    Factor {
        name: "clearance",
        score,
        weight: CLEARANCE_WEIGHT,
        comparable,
        note,
    }
}
