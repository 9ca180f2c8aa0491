use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::batch::{BatchCoordinator, BatchError};
use super::cache::ScoreCache;
use super::cancel::CancellationToken;
use super::domain::{
    CategoryScore, OpportunityId, OrganizationId, ProfileId, ScoreMethod, ScoreMode, ScoreRequest,
    ScoreResult, SemanticAnalysis, StrategicInsights,
};
use super::orchestrator::{ScoringError, ScoringOrchestrator};
use super::repository::{OpportunityRepository, ProfileRepository, RepositoryError};

/// Shared router state bundling the orchestrator and batch coordinator.
pub struct ScoringState<O, P, C> {
    pub orchestrator: Arc<ScoringOrchestrator<O, P, C>>,
    pub batch: Arc<BatchCoordinator<O, P, C>>,
}

impl<O, P, C> Clone for ScoringState<O, P, C> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            batch: self.batch.clone(),
        }
    }
}

/// Router builder exposing HTTP endpoints for match scoring.
pub fn scoring_router<O, P, C>(state: ScoringState<O, P, C>) -> Router
where
    O: OpportunityRepository + Send + Sync + 'static,
    P: ProfileRepository + Send + Sync + 'static,
    C: ScoreCache + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/api/v1/opportunities/score",
            post(score_handler::<O, P, C>),
        )
        .route(
            "/api/v1/opportunities/score/batch",
            post(batch_handler::<O, P, C>),
        )
        .route(
            "/api/v1/profiles/:profile_id/score-cache/invalidate",
            post(invalidate_handler::<O, P, C>),
        )
        .with_state(state)
}

fn default_method() -> ScoreMethod {
    ScoreMethod::Hybrid
}

fn default_mode() -> ScoreMode {
    ScoreMode::Fast
}

fn default_save_results() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub(crate) struct SingleScorePayload {
    pub(crate) opportunity_id: String,
    #[serde(default)]
    pub(crate) profile_id: Option<String>,
    #[serde(default = "default_method")]
    pub(crate) method: ScoreMethod,
    #[serde(default = "default_mode")]
    pub(crate) mode: ScoreMode,
    pub(crate) organization_id: String,
    #[serde(default)]
    pub(crate) user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchScorePayload {
    pub(crate) opportunity_ids: Vec<String>,
    #[serde(default)]
    pub(crate) profile_id: Option<String>,
    #[serde(default = "default_method")]
    pub(crate) method: ScoreMethod,
    #[serde(default = "default_mode")]
    pub(crate) mode: ScoreMode,
    pub(crate) organization_id: String,
    #[serde(default)]
    pub(crate) user_id: Option<String>,
    // Accepted for wire compatibility; result persistence lives outside
    // this service.
    #[serde(default = "default_save_results")]
    pub(crate) save_results: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SingleScoreView {
    pub(crate) opportunity_id: String,
    pub(crate) score: u8,
    pub(crate) confidence: u8,
    pub(crate) algorithm_version: String,
    pub(crate) factors: BTreeMap<String, CategoryScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) semantic_analysis: Option<SemanticAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) strategic_insights: Option<StrategicInsights>,
    pub(crate) recommendations: Vec<String>,
    pub(crate) cost_units: f64,
    pub(crate) processing_time_ms: u64,
    pub(crate) from_cache: bool,
}

impl SingleScoreView {
    fn from_result(opportunity_id: String, result: ScoreResult, from_cache: bool) -> Self {
        Self {
            opportunity_id,
            score: result.overall_score,
            confidence: result.confidence,
            algorithm_version: result.algorithm_version,
            factors: result.categories,
            semantic_analysis: result.semantic_analysis,
            strategic_insights: result.strategic_insights,
            recommendations: result.recommendations,
            cost_units: result.cost_units,
            processing_time_ms: result.processing_time_ms,
            from_cache,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchEntryView {
    pub(crate) opportunity_id: String,
    pub(crate) score: Option<u8>,
    pub(crate) confidence: Option<u8>,
    pub(crate) algorithm_version: Option<String>,
    pub(crate) factors: Option<BTreeMap<String, CategoryScore>>,
    pub(crate) cost_units: Option<f64>,
    pub(crate) from_cache: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchScoreResponse {
    pub(crate) results: Vec<BatchEntryView>,
    pub(crate) cache_hits: u32,
    pub(crate) cache_misses: u32,
}

pub(crate) async fn score_handler<O, P, C>(
    State(state): State<ScoringState<O, P, C>>,
    Json(payload): Json<SingleScorePayload>,
) -> Response
where
    O: OpportunityRepository + Send + Sync + 'static,
    P: ProfileRepository + Send + Sync + 'static,
    C: ScoreCache + Send + Sync + 'static,
{
    let opportunity_id = payload.opportunity_id.clone();
    let request = score_request(
        payload.opportunity_id,
        payload.profile_id,
        payload.method,
        payload.mode,
        payload.organization_id,
        payload.user_id,
    );

    match state.orchestrator.score_single(&request).await {
        Ok(outcome) => {
            let view =
                SingleScoreView::from_result(opportunity_id, outcome.result, outcome.from_cache);
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(error) => scoring_error_response(error),
    }
}

pub(crate) async fn batch_handler<O, P, C>(
    State(state): State<ScoringState<O, P, C>>,
    Json(payload): Json<BatchScorePayload>,
) -> Response
where
    O: OpportunityRepository + Send + Sync + 'static,
    P: ProfileRepository + Send + Sync + 'static,
    C: ScoreCache + Send + Sync + 'static,
{
    if !payload.save_results {
        tracing::debug!("save_results disabled; persistence is handled outside this service");
    }

    let requests: Vec<ScoreRequest> = payload
        .opportunity_ids
        .iter()
        .map(|opportunity_id| {
            score_request(
                opportunity_id.clone(),
                payload.profile_id.clone(),
                payload.method,
                payload.mode,
                payload.organization_id.clone(),
                payload.user_id.clone(),
            )
        })
        .collect();

    let cancel = CancellationToken::new();
    match state.batch.score_batch(requests, &cancel).await {
        Ok(outcome) => {
            let results = outcome
                .entries
                .into_iter()
                .map(|entry| match entry.result {
                    Some(result) => BatchEntryView {
                        opportunity_id: entry.opportunity_id.0,
                        score: Some(result.overall_score),
                        confidence: Some(result.confidence),
                        algorithm_version: Some(result.algorithm_version),
                        factors: Some(result.categories),
                        cost_units: Some(result.cost_units),
                        from_cache: entry.from_cache,
                    },
                    None => BatchEntryView {
                        opportunity_id: entry.opportunity_id.0,
                        score: None,
                        confidence: None,
                        algorithm_version: None,
                        factors: None,
                        cost_units: None,
                        from_cache: false,
                    },
                })
                .collect();

            let response = BatchScoreResponse {
                results,
                cache_hits: outcome.cache_hits,
                cache_misses: outcome.cache_misses,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(BatchError::TooLarge { size, limit }) => {
            let payload = json!({
                "error": format!("batch of {size} requests exceeds the ceiling of {limit}"),
            });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn invalidate_handler<O, P, C>(
    State(state): State<ScoringState<O, P, C>>,
    Path(profile_id): Path<String>,
) -> Response
where
    O: OpportunityRepository + Send + Sync + 'static,
    P: ProfileRepository + Send + Sync + 'static,
    C: ScoreCache + Send + Sync + 'static,
{
    let removed = state
        .orchestrator
        .invalidate_profile(&ProfileId(profile_id.clone()))
        .await;
    let payload = json!({
        "profile_id": profile_id,
        "invalidated": removed,
    });
    (StatusCode::OK, Json(payload)).into_response()
}

fn score_request(
    opportunity_id: String,
    profile_id: Option<String>,
    method: ScoreMethod,
    mode: ScoreMode,
    organization_id: String,
    user_id: Option<String>,
) -> ScoreRequest {
    ScoreRequest {
        opportunity_id: OpportunityId(opportunity_id),
        profile_id: profile_id.map(ProfileId),
        method,
        mode,
        organization_id: OrganizationId(organization_id),
        user_id: user_id.unwrap_or_else(|| "system".to_string()),
    }
}

fn scoring_error_response(error: ScoringError) -> Response {
    match error {
        ScoringError::UnknownOpportunity(_)
        | ScoringError::UnknownProfile(_)
        | ScoringError::MissingDefaultProfile(_) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        ScoringError::Repository(RepositoryError::NotFound) => {
            let payload = json!({ "error": "record not found" });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        ScoringError::Pipeline(error) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::BAD_GATEWAY, Json(payload)).into_response()
        }
        other => {
            let payload = json!({ "error": other.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}
