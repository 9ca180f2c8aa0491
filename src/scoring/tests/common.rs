use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;

use crate::config::ScoringConfig;
use crate::infra::{
    InMemoryOpportunityRepository, InMemoryProfileRepository, InMemoryUsageRecorder,
};
use crate::scoring::domain::{
    CapabilityProfile, CertificationKind, ClearanceLevel, Opportunity, OpportunityId,
    OrganizationId, PastPerformanceRecord, ProfileId, ScoreMethod, ScoreMode, ScoreRequest,
    SetAsideType,
};
use crate::scoring::dispatch::{PublishError, ScoreEventPublisher, ScoreJobEvent};
use crate::scoring::generation::{GenerationError, GenerationOutput, GenerationRequest, TextGeneration};
use crate::scoring::{InMemoryScoreCache, ScoringOrchestrator};

pub(super) fn profile() -> CapabilityProfile {
    CapabilityProfile {
        profile_id: ProfileId("prof-1".to_string()),
        organization_id: OrganizationId("org-1".to_string()),
        primary_naics: Some("541512".to_string()),
        secondary_naics: vec!["541519".to_string()],
        certifications: vec![CertificationKind::SmallBusiness],
        past_performance: vec![PastPerformanceRecord {
            agency: "DHS".to_string(),
            naics_code: "541512".to_string(),
            contract_value: 3_000_000,
            performance_rating: Some(90),
        }],
        geographic_preferences: vec!["VA".to_string(), "MD".to_string()],
        clearance: ClearanceLevel::Secret,
        capabilities: vec!["Security operations".to_string()],
        contact_email: Some("bd@contractor.example".to_string()),
        updated_at: Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
    }
}

pub(super) fn matching_opportunity() -> Opportunity {
    Opportunity {
        opportunity_id: OpportunityId("opp-1".to_string()),
        title: "Security Operations Support".to_string(),
        agency: "DHS".to_string(),
        naics_code: Some("541512".to_string()),
        estimated_value: Some(2_500_000),
        set_aside: Some(SetAsideType::SmallBusiness),
        required_clearance: ClearanceLevel::Secret,
        place_of_performance: Some("VA".to_string()),
        response_deadline: None,
        description: "SOC staffing and engineering".to_string(),
    }
}

pub(super) fn mismatched_opportunity() -> Opportunity {
    Opportunity {
        opportunity_id: OpportunityId("opp-2".to_string()),
        title: "Shipyard Welding Services".to_string(),
        agency: "Navy".to_string(),
        naics_code: Some("336611".to_string()),
        estimated_value: Some(40_000_000),
        set_aside: Some(SetAsideType::Wosb),
        required_clearance: ClearanceLevel::TopSecret,
        place_of_performance: Some("HI".to_string()),
        response_deadline: None,
        description: "Hull repair and welding".to_string(),
    }
}

pub(super) fn score_request(opportunity_id: &str, method: ScoreMethod, mode: ScoreMode) -> ScoreRequest {
    ScoreRequest {
        opportunity_id: OpportunityId(opportunity_id.to_string()),
        profile_id: Some(ProfileId("prof-1".to_string())),
        method,
        mode,
        organization_id: OrganizationId("org-1".to_string()),
        user_id: "tester".to_string(),
    }
}

/// Generation double that replays a scripted sequence of responses.
pub(super) struct ScriptedGeneration {
    responses: Mutex<VecDeque<Result<GenerationOutput, GenerationError>>>,
}

impl ScriptedGeneration {
    pub(super) fn new(responses: Vec<Result<GenerationOutput, GenerationError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }

    pub(super) fn outage() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl TextGeneration for ScriptedGeneration {
    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        self.responses
            .lock()
            .expect("script mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Outage("script exhausted".to_string())))
    }
}

pub(super) fn output(text: String) -> GenerationOutput {
    GenerationOutput {
        text,
        cost_units: 1.25,
        latency_ms: 40,
    }
}

pub(super) fn reasoning_response() -> GenerationOutput {
    output(
        json!({
            "analysis": "Strong alignment on security operations.",
            "explicit_requirements": ["Secret clearance", "24x7 SOC staffing"],
            "implicit_preferences": ["Incumbent-scale past performance"],
            "steps": [{
                "statement": "Clearance requirement is met",
                "confidence": 90,
                "evidence": ["Profile holds Secret clearance"]
            }]
        })
        .to_string(),
    )
}

pub(super) fn detailed_response(overall: u8) -> GenerationOutput {
    let category = |score: u8| {
        json!({
            "score": score,
            "strengths": ["DHS SOC contract delivered at 92 CPARS"],
            "weaknesses": [],
            "opportunities": ["Expand into adjacent task orders"],
            "threats": ["Incumbent advantage"]
        })
    };
    output(
        json!({
            "overall_score": overall,
            "reasoning": "Category assessment grounded in past performance.",
            "categories": {
                "past_performance": category(overall),
                "technical_capability": category(overall),
                "strategic_fit": category(overall),
                "credibility": category(overall)
            }
        })
        .to_string(),
    )
}

pub(super) fn verification_response(confidence: u8) -> GenerationOutput {
    output(
        json!({
            "verification_notes": ["Scores cohere across categories"],
            "adjustments": [],
            "confidence": confidence
        })
        .to_string(),
    )
}

pub(super) fn insight_response(win: u8) -> GenerationOutput {
    output(
        json!({
            "win_probability": win,
            "win_probability_low": win.saturating_sub(10),
            "win_probability_high": win + 10,
            "competitive_advantages": ["Incumbent-adjacent DHS experience"],
            "critical_gaps": [{"description": "No prime facility clearance", "severity": "moderate"}],
            "teaming_recommendations": ["Team with a cleared-facility prime"],
            "proposal_themes": ["Proven SOC delivery"]
        })
        .to_string(),
    )
}

/// Publisher double collecting dispatched job events.
#[derive(Default)]
pub(super) struct CollectingPublisher {
    events: Mutex<Vec<ScoreJobEvent>>,
}

impl CollectingPublisher {
    pub(super) fn events(&self) -> Vec<ScoreJobEvent> {
        self.events.lock().expect("publisher mutex poisoned").clone()
    }
}

impl ScoreEventPublisher for CollectingPublisher {
    fn publish(&self, event: ScoreJobEvent) -> Result<(), PublishError> {
        self.events
            .lock()
            .expect("publisher mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) type TestOrchestrator = ScoringOrchestrator<
    InMemoryOpportunityRepository,
    InMemoryProfileRepository,
    InMemoryScoreCache,
>;

pub(super) struct TestHarness {
    pub(super) orchestrator: Arc<TestOrchestrator>,
    pub(super) cache: Arc<InMemoryScoreCache>,
    pub(super) usage: Arc<InMemoryUsageRecorder>,
    pub(super) profiles: InMemoryProfileRepository,
}

/// Build an orchestrator over in-memory adapters with the given generation
/// double and billing hook attached.
pub(super) fn harness(generation: Arc<dyn TextGeneration>) -> TestHarness {
    let opportunities = InMemoryOpportunityRepository::with_opportunities(vec![
        matching_opportunity(),
        mismatched_opportunity(),
    ]);
    let profiles = InMemoryProfileRepository::with_profiles(vec![profile()]);
    let cache = Arc::new(InMemoryScoreCache::new());
    let usage = Arc::new(InMemoryUsageRecorder::default());

    let orchestrator = ScoringOrchestrator::new(
        Arc::new(opportunities),
        Arc::new(profiles.clone()),
        cache.clone(),
        generation,
        ScoringConfig::default(),
    )
    .with_hook(Arc::new(crate::scoring::UsageBillingHook::new(
        usage.clone(),
    )));

    TestHarness {
        orchestrator: Arc::new(orchestrator),
        cache,
        usage,
        profiles,
    }
}
