use super::domain::{CapabilityProfile, Opportunity, OpportunityId, OrganizationId, ProfileId, UsageEvent};

/// Storage abstraction for solicitation records so scoring can be exercised in isolation.
pub trait OpportunityRepository: Send + Sync {
    fn fetch(&self, id: &OpportunityId) -> Result<Option<Opportunity>, RepositoryError>;
}

/// Storage abstraction for capability profiles.
pub trait ProfileRepository: Send + Sync {
    fn fetch(&self, id: &ProfileId) -> Result<Option<CapabilityProfile>, RepositoryError>;

    /// Resolve the default profile for an organization when a request omits one.
    fn default_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Option<CapabilityProfile>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound billing seam; one event per fresh computation.
pub trait UsageRecorder: Send + Sync {
    fn record(&self, event: UsageEvent) -> Result<(), UsageError>;
}

/// Usage emission error.
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("usage sink unavailable: {0}")]
    Unavailable(String),
}
