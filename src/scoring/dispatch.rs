use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::cache::ScoreCache;
use super::domain::{OpportunityId, ScoreRequest};
use super::orchestrator::{ScoringError, ScoringOrchestrator};
use super::repository::{OpportunityRepository, ProfileRepository, RepositoryError};

/// Completion events published on the asynchronous scoring path. Callers on
/// this path must not rely on synchronous return values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScoreJobEvent {
    ScoreCompleted {
        opportunity_id: OpportunityId,
        score: u8,
        algorithm_version: String,
        processing_time_ms: u64,
        cached: bool,
    },
    ScoreFailed {
        opportunity_id: OpportunityId,
        error: String,
        retryable: bool,
    },
}

/// Outbound queue seam; the concrete transport lives outside this crate.
pub trait ScoreEventPublisher: Send + Sync {
    fn publish(&self, event: ScoreJobEvent) -> Result<(), PublishError>;
}

/// Event dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
}

/// Runs scoring outside a request/response cycle with bounded concurrency
/// and limited retries. Interactive scoring is never auto-retried; this
/// path retries a retryable failure at most `max_retries` times.
pub struct BackgroundDispatcher<O, P, C> {
    orchestrator: Arc<ScoringOrchestrator<O, P, C>>,
    publisher: Arc<dyn ScoreEventPublisher>,
    permits: Arc<Semaphore>,
    max_retries: u32,
}

impl<O, P, C> BackgroundDispatcher<O, P, C>
where
    O: OpportunityRepository + Send + Sync + 'static,
    P: ProfileRepository + Send + Sync + 'static,
    C: ScoreCache + Send + Sync + 'static,
{
    pub fn new(
        orchestrator: Arc<ScoringOrchestrator<O, P, C>>,
        publisher: Arc<dyn ScoreEventPublisher>,
        concurrency: usize,
        max_retries: u32,
    ) -> Self {
        Self {
            orchestrator,
            publisher,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            max_retries,
        }
    }

    /// Fire-and-forget entry point for a `score.requested` event. The handle
    /// is returned so shutdown paths and tests can await completion.
    pub fn dispatch(&self, request: ScoreRequest) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let publisher = self.publisher.clone();
        let permits = self.permits.clone();
        let max_retries = self.max_retries;

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("background dispatcher shut down, dropping score request");
                    return;
                }
            };

            let mut attempt = 0u32;
            loop {
                match orchestrator.score_single(&request).await {
                    Ok(outcome) => {
                        info!(
                            opportunity = %request.opportunity_id.0,
                            attempt,
                            cached = outcome.from_cache,
                            "background score completed"
                        );
                        publish(
                            publisher.as_ref(),
                            ScoreJobEvent::ScoreCompleted {
                                opportunity_id: request.opportunity_id.clone(),
                                score: outcome.result.overall_score,
                                algorithm_version: outcome.result.algorithm_version.clone(),
                                processing_time_ms: outcome.result.processing_time_ms,
                                cached: outcome.from_cache,
                            },
                        );
                        return;
                    }
                    Err(error) => {
                        let retryable = is_retryable(&error);
                        if retryable && attempt < max_retries {
                            attempt += 1;
                            warn!(
                                opportunity = %request.opportunity_id.0,
                                attempt, %error,
                                "background score failed, retrying"
                            );
                            tokio::time::sleep(Duration::from_millis(
                                100 * u64::from(attempt),
                            ))
                            .await;
                            continue;
                        }

                        warn!(
                            opportunity = %request.opportunity_id.0,
                            attempt, %error, retryable,
                            "background score failed permanently"
                        );
                        publish(
                            publisher.as_ref(),
                            ScoreJobEvent::ScoreFailed {
                                opportunity_id: request.opportunity_id.clone(),
                                error: error.to_string(),
                                retryable,
                            },
                        );
                        return;
                    }
                }
            }
        })
    }
}

fn publish(publisher: &dyn ScoreEventPublisher, event: ScoreJobEvent) {
    if let Err(error) = publisher.publish(event) {
        warn!(%error, "score event publication failed");
    }
}

fn is_retryable(error: &ScoringError) -> bool {
    match error {
        ScoringError::Repository(RepositoryError::Unavailable(_)) => true,
        ScoringError::Pipeline(pipeline) => pipeline.is_outage(),
        _ => false,
    }
}
