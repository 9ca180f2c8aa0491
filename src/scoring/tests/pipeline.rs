use std::sync::Arc;

use super::common::*;
use crate::config::ScoringConfig;
use crate::scoring::domain::ScoreMode;
use crate::scoring::generation::GenerationError;
use crate::scoring::pipeline::{ScoringPipeline, GENERATIVE_VERSION};

fn pipeline(generation: ScriptedGeneration) -> ScoringPipeline {
    ScoringPipeline::new(Arc::new(generation), &ScoringConfig::default())
}

#[tokio::test]
async fn fast_mode_runs_a_single_stage_and_derives_win_probability() {
    let pipeline = pipeline(ScriptedGeneration::new(vec![Ok(detailed_response(80))]));

    let result = pipeline
        .score(&matching_opportunity(), &profile(), ScoreMode::Fast)
        .await
        .expect("fast pipeline scores");

    assert_eq!(result.overall_score, 80);
    assert_eq!(result.algorithm_version, GENERATIVE_VERSION);
    assert_eq!(result.categories.len(), 4);
    assert!(result.semantic_analysis.is_none());

    let insights = result.strategic_insights.expect("heuristic insights");
    assert_eq!(insights.win_probability, 69);

    // Only one stage executed, so only one generation call is billed.
    assert!((result.cost_units - 1.25).abs() < f64::EPSILON);
    assert_eq!(result.processing_time_ms, 40);
}

#[tokio::test]
async fn advanced_mode_compiles_all_four_stages() {
    let pipeline = pipeline(ScriptedGeneration::new(vec![
        Ok(reasoning_response()),
        Ok(detailed_response(72)),
        Ok(verification_response(88)),
        Ok(insight_response(60)),
    ]));

    let result = pipeline
        .score(&matching_opportunity(), &profile(), ScoreMode::Advanced)
        .await
        .expect("advanced pipeline scores");

    assert_eq!(result.overall_score, 72);
    assert_eq!(result.confidence, 88);

    let semantic = result.semantic_analysis.expect("semantic analysis");
    assert_eq!(semantic.explicit_requirements.len(), 2);
    assert_eq!(semantic.verification_notes.len(), 1);

    let insights = result.strategic_insights.expect("strategic insights");
    assert_eq!(insights.win_probability, 60);
    assert_eq!(insights.critical_gaps.len(), 1);

    assert!(!result.recommendations.is_empty());
    assert!((result.cost_units - 5.0).abs() < f64::EPSILON);
    assert_eq!(result.processing_time_ms, 160);
}

#[tokio::test]
async fn detailed_parse_failure_substitutes_visible_neutral_scoring() {
    let pipeline = pipeline(ScriptedGeneration::new(vec![Ok(output(
        "not json at all".to_string(),
    ))]));

    let result = pipeline
        .score(&matching_opportunity(), &profile(), ScoreMode::Fast)
        .await
        .expect("parse failure is absorbed");

    assert_eq!(result.overall_score, 50);
    for category in result.categories.values() {
        assert_eq!(category.score, 50);
    }
}

#[tokio::test]
async fn fenced_json_responses_are_accepted() {
    let fenced = {
        let inner = detailed_response(65);
        output(format!("```json\n{}\n```", inner.text))
    };
    let pipeline = pipeline(ScriptedGeneration::new(vec![Ok(fenced)]));

    let result = pipeline
        .score(&matching_opportunity(), &profile(), ScoreMode::Fast)
        .await
        .expect("fenced response parses");

    assert_eq!(result.overall_score, 65);
}

#[tokio::test]
async fn out_of_range_reported_overall_is_recomputed_from_contributions() {
    let response = output(
        serde_json::json!({
            "overall_score": 250,
            "categories": {
                "past_performance": {"score": 60},
                "technical_capability": {"score": 60},
                "strategic_fit": {"score": 60},
                "credibility": {"score": 60}
            }
        })
        .to_string(),
    );
    let pipeline = pipeline(ScriptedGeneration::new(vec![Ok(response)]));

    let result = pipeline
        .score(&matching_opportunity(), &profile(), ScoreMode::Fast)
        .await
        .expect("recomputed overall");

    // 60 in every category at weights 35/35/15/15 contributes exactly 60.
    assert_eq!(result.overall_score, 60);
}

#[tokio::test]
async fn generation_outage_aborts_with_outage_classification() {
    let pipeline = pipeline(ScriptedGeneration::outage());

    let error = pipeline
        .score(&matching_opportunity(), &profile(), ScoreMode::Fast)
        .await
        .expect_err("outage aborts the pipeline");

    assert!(error.is_outage());
    assert_eq!(error.stage, "detailed_scoring");
}

#[tokio::test]
async fn empty_generation_output_is_not_outage_classified() {
    let pipeline = pipeline(ScriptedGeneration::new(vec![Ok(output(
        "   ".to_string(),
    ))]));

    let error = pipeline
        .score(&matching_opportunity(), &profile(), ScoreMode::Fast)
        .await
        .expect_err("empty output fails the stage");

    assert!(!error.is_outage());
}

#[tokio::test]
async fn late_stage_failures_are_absorbed_with_defaults() {
    // Reasoning and detailed scoring succeed; verification and insight hit
    // an outage and fall back to pass-through / conservative defaults.
    let pipeline = pipeline(ScriptedGeneration::new(vec![
        Ok(reasoning_response()),
        Ok(detailed_response(70)),
        Err(GenerationError::Outage("quota exceeded".to_string())),
        Err(GenerationError::Outage("quota exceeded".to_string())),
    ]));

    let result = pipeline
        .score(&matching_opportunity(), &profile(), ScoreMode::Advanced)
        .await
        .expect("late failures absorbed");

    assert_eq!(result.overall_score, 70);
    assert_eq!(result.confidence, 75);

    let insights = result.strategic_insights.expect("conservative insights");
    assert!(insights.competitive_advantages.is_empty());
    assert!(insights.critical_gaps.is_empty());
}

#[tokio::test]
async fn reasoning_parse_failure_keeps_the_raw_narrative() {
    let pipeline = pipeline(ScriptedGeneration::new(vec![
        Ok(output("plain prose analysis without json".to_string())),
        Ok(detailed_response(64)),
        Ok(verification_response(80)),
        Ok(insight_response(55)),
    ]));

    let result = pipeline
        .score(&matching_opportunity(), &profile(), ScoreMode::Advanced)
        .await
        .expect("minimal reasoning is tolerated");

    let semantic = result.semantic_analysis.expect("semantic analysis");
    assert!(semantic.narrative.contains("plain prose"));
    assert!(semantic.explicit_requirements.is_empty());
}
