use std::sync::Arc;

use futures::future::join_all;
use tracing::warn;

use super::cache::ScoreCache;
use super::cancel::CancellationToken;
use super::domain::{OpportunityId, ScoreRequest, ScoreResult, UsageEvent};
use super::orchestrator::{ScoringError, ScoringOrchestrator};
use super::repository::{OpportunityRepository, ProfileRepository, UsageRecorder};

/// One batch entry; `result` is `None` when that opportunity's computation
/// failed or was cancelled.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub opportunity_id: OpportunityId,
    pub result: Option<ScoreResult>,
    pub from_cache: bool,
}

/// Aggregated batch output with usage accounting classification.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub entries: Vec<BatchEntry>,
    pub cache_hits: u32,
    pub cache_misses: u32,
}

/// Error raised before any batch work starts.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("batch of {size} requests exceeds the ceiling of {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// Fans scoring out across independent concurrent tasks and aggregates the
/// results without reordering them; a single failure never aborts siblings.
pub struct BatchCoordinator<O, P, C> {
    orchestrator: Arc<ScoringOrchestrator<O, P, C>>,
    usage: Arc<dyn UsageRecorder>,
    max_batch_size: usize,
}

impl<O, P, C> BatchCoordinator<O, P, C>
where
    O: OpportunityRepository + Send + Sync + 'static,
    P: ProfileRepository + Send + Sync + 'static,
    C: ScoreCache + Send + Sync + 'static,
{
    pub fn new(
        orchestrator: Arc<ScoringOrchestrator<O, P, C>>,
        usage: Arc<dyn UsageRecorder>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            orchestrator,
            usage,
            max_batch_size,
        }
    }

    pub async fn score_batch(
        &self,
        requests: Vec<ScoreRequest>,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, BatchError> {
        if requests.len() > self.max_batch_size {
            return Err(BatchError::TooLarge {
                size: requests.len(),
                limit: self.max_batch_size,
            });
        }

        let organization_id = requests
            .first()
            .map(|request| request.organization_id.clone());

        let tasks: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let orchestrator = self.orchestrator.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let outcome = orchestrator.score_cancellable(&request, &cancel).await;
                    (request.opportunity_id, outcome)
                })
            })
            .collect();

        let mut entries = Vec::with_capacity(tasks.len());
        let mut cache_hits = 0u32;
        let mut cache_misses = 0u32;

        for joined in join_all(tasks).await {
            match joined {
                Ok((opportunity_id, Ok(outcome))) => {
                    if outcome.from_cache {
                        cache_hits += 1;
                    } else {
                        cache_misses += 1;
                    }
                    entries.push(BatchEntry {
                        opportunity_id,
                        result: Some(outcome.result),
                        from_cache: outcome.from_cache,
                    });
                }
                Ok((opportunity_id, Err(error))) => {
                    if !matches!(error, ScoringError::Cancelled) {
                        warn!(opportunity = %opportunity_id.0, %error,
                              "batch entry failed, continuing with remaining entries");
                    }
                    entries.push(BatchEntry {
                        opportunity_id,
                        result: None,
                        from_cache: false,
                    });
                }
                Err(join_error) => {
                    // A panicked task is isolated like any other entry
                    // failure; its slot is unidentifiable so it is dropped
                    // from accounting but not from the response.
                    warn!(%join_error, "batch scoring task aborted");
                    entries.push(BatchEntry {
                        opportunity_id: OpportunityId(String::from("unknown")),
                        result: None,
                        from_cache: false,
                    });
                }
            }
        }

        if cache_misses > 0 {
            if let Some(organization_id) = organization_id {
                let event = UsageEvent::match_score(organization_id, cache_misses);
                if let Err(error) = self.usage.record(event) {
                    warn!(%error, "aggregated batch usage emission failed");
                }
            }
        }

        Ok(BatchOutcome {
            entries,
            cache_hits,
            cache_misses,
        })
    }
}
