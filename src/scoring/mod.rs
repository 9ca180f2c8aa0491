//! Match-scoring engine: deterministic calculation, the generative scoring
//! pipeline, fingerprint-keyed caching, and batch/background coordination.

pub mod batch;
pub mod cache;
pub mod calculator;
pub mod cancel;
pub mod dispatch;
pub mod domain;
pub mod fingerprint;
pub mod generation;
pub mod orchestrator;
pub mod pipeline;
pub mod repository;
pub mod routes;

#[cfg(test)]
mod tests;

pub use batch::{BatchCoordinator, BatchEntry, BatchError, BatchOutcome};
pub use cache::{CacheError, InMemoryScoreCache, ScoreCache, SingleFlight};
pub use calculator::{ScoreCalculator, CALCULATION_VERSION};
pub use cancel::CancellationToken;
pub use dispatch::{BackgroundDispatcher, PublishError, ScoreEventPublisher, ScoreJobEvent};
pub use domain::{
    CapabilityProfile, CategoryScore, CertificationKind, ClearanceLevel, CriticalGap, GapSeverity,
    Opportunity, OpportunityId, OrganizationId, PastPerformanceRecord, ProfileId, ScoreMethod,
    ScoreMode, ScoreRequest, ScoreResult, SemanticAnalysis, SetAsideType, StrategicInsights,
    UsageEvent,
};
pub use fingerprint::{CacheKey, ProfileFingerprint};
pub use generation::{
    CostEntry, CostLedger, GenerationError, GenerationOutput, GenerationRequest, TextGeneration,
};
pub use orchestrator::{
    PostScoreHook, ScoredOutcome, ScoringError, ScoringOrchestrator, UsageBillingHook,
    GENERATIVE_FALLBACK_VERSION, HYBRID_FALLBACK_VERSION, HYBRID_VERSION,
};
pub use pipeline::{PipelineError, ScoringPipeline, GENERATIVE_VERSION};
pub use repository::{
    OpportunityRepository, ProfileRepository, RepositoryError, UsageError, UsageRecorder,
};
pub use routes::{scoring_router, ScoringState};
