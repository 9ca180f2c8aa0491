use super::common::*;
use crate::scoring::calculator::{ScoreCalculator, CALCULATION_VERSION};
use crate::scoring::domain::{ClearanceLevel, Opportunity, OpportunityId};

#[test]
fn identical_inputs_yield_bit_identical_results() {
    let calculator = ScoreCalculator::new();
    let opportunity = matching_opportunity();
    let profile = profile();

    let first = calculator.calculate(&opportunity, &profile);
    let second = calculator.calculate(&opportunity, &profile);

    assert_eq!(first, second);
}

#[test]
fn exact_primary_naics_match_scores_full_classification_factor() {
    let calculator = ScoreCalculator::new();
    let result = calculator.calculate(&matching_opportunity(), &profile());

    let classification = &result.categories["classification_match"];
    assert_eq!(classification.score, 100);
    assert_eq!(result.algorithm_version, CALCULATION_VERSION);
}

#[test]
fn mismatched_opportunity_scores_classification_at_midpoint_or_lower() {
    let calculator = ScoreCalculator::new();
    let result = calculator.calculate(&mismatched_opportunity(), &profile());

    let classification = &result.categories["classification_match"];
    assert!(classification.score <= 50);
}

#[test]
fn overall_score_stays_within_bounds_and_weights_sum_to_hundred() {
    let calculator = ScoreCalculator::new();

    for opportunity in [matching_opportunity(), mismatched_opportunity()] {
        let result = calculator.calculate(&opportunity, &profile());
        assert!(result.overall_score <= 100);

        let weight_total: u16 = result
            .categories
            .values()
            .map(|category| u16::from(category.weight))
            .sum();
        assert_eq!(weight_total, 100);
    }
}

#[test]
fn missing_data_contributes_neutral_midpoint_not_zero() {
    let calculator = ScoreCalculator::new();
    let opportunity = Opportunity {
        opportunity_id: OpportunityId("opp-sparse".to_string()),
        title: "Untitled".to_string(),
        agency: "GSA".to_string(),
        naics_code: None,
        estimated_value: None,
        set_aside: None,
        required_clearance: ClearanceLevel::None,
        place_of_performance: None,
        response_deadline: None,
        description: String::new(),
    };

    let result = calculator.calculate(&opportunity, &profile());

    assert_eq!(result.categories["classification_match"].score, 50);
    assert_eq!(result.categories["geographic_match"].score, 50);
    assert_eq!(result.categories["value_fit"].score, 50);
}

#[test]
fn inadequate_clearance_is_penalized() {
    let calculator = ScoreCalculator::new();
    let result = calculator.calculate(&mismatched_opportunity(), &profile());

    // Secret clearance against a TopSecret requirement: partial credit only.
    assert_eq!(result.categories["clearance"].score, 25);
}

#[test]
fn weak_comparable_factors_produce_recommendations() {
    let calculator = ScoreCalculator::new();
    let result = calculator.calculate(&mismatched_opportunity(), &profile());

    assert!(!result.recommendations.is_empty());
    assert!(result
        .recommendations
        .iter()
        .any(|recommendation| recommendation.contains("classification_match")));
}
