//! In-memory adapters wired by the server binary and the CLI demo.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::scoring::{
    CapabilityProfile, CertificationKind, ClearanceLevel, GenerationError, GenerationOutput,
    GenerationRequest, Opportunity, OpportunityId, OpportunityRepository, OrganizationId,
    PastPerformanceRecord, ProfileId, ProfileRepository, PublishError, RepositoryError,
    ScoreEventPublisher, ScoreJobEvent, SetAsideType, TextGeneration, UsageError, UsageEvent,
    UsageRecorder,
};

#[derive(Default, Clone)]
pub struct InMemoryOpportunityRepository {
    records: Arc<Mutex<HashMap<OpportunityId, Opportunity>>>,
}

impl InMemoryOpportunityRepository {
    pub fn with_opportunities(opportunities: Vec<Opportunity>) -> Self {
        let repository = Self::default();
        {
            let mut guard = repository
                .records
                .lock()
                .expect("opportunity mutex poisoned");
            for opportunity in opportunities {
                guard.insert(opportunity.opportunity_id.clone(), opportunity);
            }
        }
        repository
    }

    pub fn insert(&self, opportunity: Opportunity) {
        self.records
            .lock()
            .expect("opportunity mutex poisoned")
            .insert(opportunity.opportunity_id.clone(), opportunity);
    }
}

impl OpportunityRepository for InMemoryOpportunityRepository {
    fn fetch(&self, id: &OpportunityId) -> Result<Option<Opportunity>, RepositoryError> {
        let guard = self.records.lock().expect("opportunity mutex poisoned");
        Ok(guard.get(id).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryProfileRepository {
    records: Arc<Mutex<HashMap<ProfileId, CapabilityProfile>>>,
}

impl InMemoryProfileRepository {
    pub fn with_profiles(profiles: Vec<CapabilityProfile>) -> Self {
        let repository = Self::default();
        {
            let mut guard = repository.records.lock().expect("profile mutex poisoned");
            for profile in profiles {
                guard.insert(profile.profile_id.clone(), profile);
            }
        }
        repository
    }

    pub fn insert(&self, profile: CapabilityProfile) {
        self.records
            .lock()
            .expect("profile mutex poisoned")
            .insert(profile.profile_id.clone(), profile);
    }
}

impl ProfileRepository for InMemoryProfileRepository {
    fn fetch(&self, id: &ProfileId) -> Result<Option<CapabilityProfile>, RepositoryError> {
        let guard = self.records.lock().expect("profile mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn default_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Option<CapabilityProfile>, RepositoryError> {
        let guard = self.records.lock().expect("profile mutex poisoned");
        Ok(guard
            .values()
            .find(|profile| &profile.organization_id == organization_id)
            .cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryUsageRecorder {
    events: Arc<Mutex<Vec<UsageEvent>>>,
}

impl InMemoryUsageRecorder {
    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().expect("usage mutex poisoned").clone()
    }
}

impl UsageRecorder for InMemoryUsageRecorder {
    fn record(&self, event: UsageEvent) -> Result<(), UsageError> {
        let mut guard = self.events.lock().expect("usage mutex poisoned");
        guard.push(event);
        Ok(())
    }
}

/// Logs completion events in place of a real queue transport.
#[derive(Default, Clone)]
pub struct LoggingEventPublisher;

impl ScoreEventPublisher for LoggingEventPublisher {
    fn publish(&self, event: ScoreJobEvent) -> Result<(), PublishError> {
        info!(?event, "score job event");
        Ok(())
    }
}

/// Placeholder generation capability used until a real backend is attached.
///
/// Always reports an outage, so generative and hybrid requests degrade to
/// the deterministic fallback path with a visible algorithm-version tag.
#[derive(Default, Clone, Copy)]
pub struct UnconfiguredGeneration;

#[async_trait]
impl TextGeneration for UnconfiguredGeneration {
    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        Err(GenerationError::Outage(
            "no text generation backend configured".to_string(),
        ))
    }
}

/// Seed data for the CLI demo and local development server.
pub fn demo_fixtures() -> (Vec<Opportunity>, Vec<CapabilityProfile>) {
    let opportunities = vec![
        Opportunity {
            opportunity_id: OpportunityId("opp-cyber-001".to_string()),
            title: "Enterprise Security Operations Support".to_string(),
            agency: "Department of Homeland Security".to_string(),
            naics_code: Some("541512".to_string()),
            estimated_value: Some(4_500_000),
            set_aside: Some(SetAsideType::SmallBusiness),
            required_clearance: ClearanceLevel::Secret,
            place_of_performance: Some("VA".to_string()),
            response_deadline: NaiveDate::from_ymd_opt(2026, 10, 15),
            description: "24x7 security operations center staffing and engineering.".to_string(),
        },
        Opportunity {
            opportunity_id: OpportunityId("opp-logistics-002".to_string()),
            title: "Regional Warehouse Modernization".to_string(),
            agency: "Defense Logistics Agency".to_string(),
            naics_code: Some("493110".to_string()),
            estimated_value: Some(12_000_000),
            set_aside: None,
            required_clearance: ClearanceLevel::None,
            place_of_performance: Some("TX".to_string()),
            response_deadline: NaiveDate::from_ymd_opt(2026, 11, 1),
            description: "Warehouse automation and inventory system overhaul.".to_string(),
        },
    ];

    let profiles = vec![CapabilityProfile {
        profile_id: ProfileId("prof-demo".to_string()),
        organization_id: OrganizationId("org-demo".to_string()),
        primary_naics: Some("541512".to_string()),
        secondary_naics: vec!["541519".to_string()],
        certifications: vec![CertificationKind::SmallBusiness, CertificationKind::Sdvosb],
        past_performance: vec![
            PastPerformanceRecord {
                agency: "Department of Homeland Security".to_string(),
                naics_code: "541512".to_string(),
                contract_value: 3_200_000,
                performance_rating: Some(92),
            },
            PastPerformanceRecord {
                agency: "General Services Administration".to_string(),
                naics_code: "541519".to_string(),
                contract_value: 1_100_000,
                performance_rating: Some(88),
            },
        ],
        geographic_preferences: vec!["VA".to_string(), "MD".to_string(), "DC".to_string()],
        clearance: ClearanceLevel::TopSecret,
        capabilities: vec![
            "Security operations".to_string(),
            "Cloud migration".to_string(),
            "Zero trust architecture".to_string(),
        ],
        contact_email: Some("bd@demo-contractor.example".to_string()),
        updated_at: Utc::now(),
    }];

    (opportunities, profiles)
}
