use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::cache::{ScoreCache, SingleFlight};
use super::calculator::ScoreCalculator;
use super::cancel::CancellationToken;
use super::domain::{
    clamp_score, CapabilityProfile, Opportunity, ScoreMethod, ScoreRequest, ScoreResult,
    UsageEvent,
};
use super::fingerprint::CacheKey;
use super::generation::TextGeneration;
use super::pipeline::{PipelineError, ScoringPipeline};
use super::repository::{
    OpportunityRepository, ProfileRepository, RepositoryError, UsageRecorder,
};
use crate::config::ScoringConfig;

/// Algorithm tag for blended hybrid results.
pub const HYBRID_VERSION: &str = "hybrid-v2";
/// Tag marking a generative request served by the deterministic fallback.
pub const GENERATIVE_FALLBACK_VERSION: &str = "gen-v2-fallback-calc";
/// Tag marking a hybrid request served by the calculation leg alone.
pub const HYBRID_FALLBACK_VERSION: &str = "hybrid-v2-fallback-calc";

/// A resolved score plus whether it was served from cache.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredOutcome {
    pub result: ScoreResult,
    pub from_cache: bool,
}

/// Error raised by the scoring orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("unknown opportunity {0}")]
    UnknownOpportunity(String),
    #[error("unknown profile {0}")]
    UnknownProfile(String),
    #[error("organization {0} has no default profile")]
    MissingDefaultProfile(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("scoring cancelled before completion")]
    Cancelled,
}

/// Side-effect seam invoked after a computation resolves, keeping billing
/// and audit concerns out of the scoring core.
pub trait PostScoreHook: Send + Sync {
    fn on_scored(&self, request: &ScoreRequest, outcome: &ScoredOutcome);
}

/// Billing hook: one usage event per fresh computation, none for cache hits.
pub struct UsageBillingHook {
    recorder: Arc<dyn UsageRecorder>,
}

impl UsageBillingHook {
    pub fn new(recorder: Arc<dyn UsageRecorder>) -> Self {
        Self { recorder }
    }
}

impl PostScoreHook for UsageBillingHook {
    fn on_scored(&self, request: &ScoreRequest, outcome: &ScoredOutcome) {
        if outcome.from_cache {
            return;
        }
        let event = UsageEvent::match_score(request.organization_id.clone(), 1);
        if let Err(error) = self.recorder.record(event) {
            warn!(%error, "usage event emission failed");
        }
    }
}

/// Selects the computation path, consults the fingerprint cache, and applies
/// cross-method fallback when the generative leg is unavailable.
pub struct ScoringOrchestrator<O, P, C> {
    opportunities: Arc<O>,
    profiles: Arc<P>,
    cache: Arc<C>,
    calculator: ScoreCalculator,
    pipeline: ScoringPipeline,
    config: ScoringConfig,
    single_flight: SingleFlight<ScoredOutcome>,
    hooks: Vec<Arc<dyn PostScoreHook>>,
}

impl<O, P, C> ScoringOrchestrator<O, P, C>
where
    O: OpportunityRepository + 'static,
    P: ProfileRepository + 'static,
    C: ScoreCache + 'static,
{
    pub fn new(
        opportunities: Arc<O>,
        profiles: Arc<P>,
        cache: Arc<C>,
        generation: Arc<dyn TextGeneration>,
        config: ScoringConfig,
    ) -> Self {
        let pipeline = ScoringPipeline::new(generation, &config);
        Self {
            opportunities,
            profiles,
            cache,
            calculator: ScoreCalculator::new(),
            pipeline,
            config,
            single_flight: SingleFlight::new(),
            hooks: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn PostScoreHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score one request and fire the post-score hooks (interactive path).
    pub async fn score_single(&self, request: &ScoreRequest) -> Result<ScoredOutcome, ScoringError> {
        let outcome = self.score(request).await?;
        for hook in &self.hooks {
            hook.on_scored(request, &outcome);
        }
        Ok(outcome)
    }

    /// Score one request without side effects; the batch coordinator uses
    /// this and aggregates billing itself.
    pub async fn score(&self, request: &ScoreRequest) -> Result<ScoredOutcome, ScoringError> {
        self.score_cancellable(request, &CancellationToken::new())
            .await
    }

    pub async fn score_cancellable(
        &self,
        request: &ScoreRequest,
        cancel: &CancellationToken,
    ) -> Result<ScoredOutcome, ScoringError> {
        if cancel.is_cancelled() {
            return Err(ScoringError::Cancelled);
        }

        let profile = self.resolve_profile(request)?;
        let opportunity = self.resolve_opportunity(request)?;
        let key = CacheKey::derive(&profile, &opportunity.opportunity_id, request.method, request.mode);

        match tokio::time::timeout(self.config.cache_timeout(), self.cache.get(&key)).await {
            Ok(Ok(Some(result))) => {
                return Ok(ScoredOutcome {
                    result,
                    from_cache: true,
                })
            }
            Ok(Ok(None)) => {}
            Ok(Err(error)) => {
                // Degraded mode: a dead cache backend must not fail the
                // request, only skip caching.
                warn!(%error, key = %key, "cache read failed, computing uncached");
            }
            Err(_) => {
                warn!(key = %key, "cache read timed out, computing uncached");
            }
        }

        let rendered = key.render();
        let (outcome, computed_here) = self
            .single_flight
            .run(&rendered, || async {
                let result = self
                    .compute_fresh(&opportunity, &profile, request)
                    .await?;

                if cancel.is_cancelled() {
                    // Cancelled mid-flight: discard without a cache write so
                    // no partially-owned entry lands.
                    return Err(ScoringError::Cancelled);
                }

                let upsert = self.cache.put(&key, result.clone(), self.config.cache_ttl());
                match tokio::time::timeout(self.config.cache_timeout(), upsert).await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => {
                        warn!(%error, key = %key, "cache write failed, result served uncached");
                    }
                    Err(_) => {
                        warn!(key = %key, "cache write timed out, result served uncached");
                    }
                }

                Ok(ScoredOutcome {
                    result,
                    from_cache: false,
                })
            })
            .await?;

        // A coalesced waiter did not perform a billable computation; account
        // for it like a cache hit.
        if computed_here {
            Ok(outcome)
        } else {
            Ok(ScoredOutcome {
                from_cache: true,
                ..outcome
            })
        }
    }

    /// Drop cached scores for a profile after its scoring-relevant fields change.
    pub async fn invalidate_profile(&self, profile_id: &super::domain::ProfileId) -> usize {
        match self.cache.invalidate_profile(profile_id).await {
            Ok(removed) => {
                info!(profile = %profile_id.0, removed, "score cache invalidated");
                removed
            }
            Err(error) => {
                warn!(%error, profile = %profile_id.0, "cache invalidation failed");
                0
            }
        }
    }

    fn resolve_profile(&self, request: &ScoreRequest) -> Result<CapabilityProfile, ScoringError> {
        match &request.profile_id {
            Some(profile_id) => self
                .profiles
                .fetch(profile_id)?
                .ok_or_else(|| ScoringError::UnknownProfile(profile_id.0.clone())),
            None => self
                .profiles
                .default_for_organization(&request.organization_id)?
                .ok_or_else(|| {
                    ScoringError::MissingDefaultProfile(request.organization_id.0.clone())
                }),
        }
    }

    fn resolve_opportunity(&self, request: &ScoreRequest) -> Result<Opportunity, ScoringError> {
        self.opportunities
            .fetch(&request.opportunity_id)?
            .ok_or_else(|| ScoringError::UnknownOpportunity(request.opportunity_id.0.clone()))
    }

    async fn compute_fresh(
        &self,
        opportunity: &Opportunity,
        profile: &CapabilityProfile,
        request: &ScoreRequest,
    ) -> Result<ScoreResult, ScoringError> {
        let started = Instant::now();
        let result = match request.method {
            ScoreMethod::Calculation => {
                let mut result = self.calculator.calculate(opportunity, profile);
                result.processing_time_ms = started.elapsed().as_millis() as u64;
                result
            }
            ScoreMethod::Generative => {
                match self.pipeline.score(opportunity, profile, request.mode).await {
                    Ok(result) => result,
                    Err(error) if error.is_outage() => {
                        warn!(%error, opportunity = %opportunity.opportunity_id.0,
                              "generative pipeline outage, falling back to deterministic scoring");
                        let mut result = self.calculator.calculate(opportunity, profile);
                        result.algorithm_version = GENERATIVE_FALLBACK_VERSION.to_string();
                        result.processing_time_ms = started.elapsed().as_millis() as u64;
                        result
                    }
                    Err(error) => return Err(ScoringError::Pipeline(error)),
                }
            }
            ScoreMethod::Hybrid => {
                let calculation = self.calculator.calculate(opportunity, profile);
                match self.pipeline.score(opportunity, profile, request.mode).await {
                    Ok(generative) => blend_hybrid(
                        generative,
                        &calculation,
                        self.config.hybrid_generative_weight,
                    ),
                    Err(error) => {
                        warn!(%error, opportunity = %opportunity.opportunity_id.0,
                              "hybrid generative leg failed, returning calculation result");
                        let mut result = calculation;
                        result.algorithm_version = HYBRID_FALLBACK_VERSION.to_string();
                        result.processing_time_ms = started.elapsed().as_millis() as u64;
                        result
                    }
                }
            }
        };

        info!(
            opportunity = %opportunity.opportunity_id.0,
            profile = %profile.profile_id.0,
            method = request.method.label(),
            mode = request.mode.label(),
            score = result.overall_score,
            version = %result.algorithm_version,
            "score computed"
        );
        Ok(result)
    }
}

/// Blend the generative and calculation legs at the configured ratio. The
/// generative result carries the richer structure; the calculation factor
/// breakdown is merged alongside it.
fn blend_hybrid(
    mut generative: ScoreResult,
    calculation: &ScoreResult,
    generative_weight: f64,
) -> ScoreResult {
    let blended = generative_weight * f64::from(generative.overall_score)
        + (1.0 - generative_weight) * f64::from(calculation.overall_score);
    generative.overall_score = clamp_score(blended);
    generative.algorithm_version = HYBRID_VERSION.to_string();

    for (name, category) in &calculation.categories {
        generative
            .categories
            .entry(name.clone())
            .or_insert_with(|| category.clone());
    }

    generative
}
