use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for solicitation records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpportunityId(pub String);

/// Identifier wrapper for contractor capability profiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub String);

/// Identifier wrapper for the organization that owns a profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrganizationId(pub String);

/// Set-aside programs a solicitation can be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetAsideType {
    SmallBusiness,
    EightA,
    HubZone,
    Wosb,
    Sdvosb,
}

/// Certifications a contractor can hold; mirrors the set-aside programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationKind {
    SmallBusiness,
    EightA,
    HubZone,
    Wosb,
    Sdvosb,
}

impl CertificationKind {
    /// The set-aside program this certification satisfies.
    pub fn satisfies(self, set_aside: SetAsideType) -> bool {
        matches!(
            (self, set_aside),
            (CertificationKind::SmallBusiness, SetAsideType::SmallBusiness)
                | (CertificationKind::EightA, SetAsideType::EightA)
                | (CertificationKind::HubZone, SetAsideType::HubZone)
                | (CertificationKind::Wosb, SetAsideType::Wosb)
                | (CertificationKind::Sdvosb, SetAsideType::Sdvosb)
        )
    }
}

/// Security clearance levels ordered from none to top secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearanceLevel {
    None,
    PublicTrust,
    Secret,
    TopSecret,
}

/// Completed contract used as past-performance evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastPerformanceRecord {
    pub agency: String,
    pub naics_code: String,
    pub contract_value: u64,
    pub performance_rating: Option<u8>,
}

/// Contractor attributes relevant to scoring, plus contact metadata that is not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    pub profile_id: ProfileId,
    pub organization_id: OrganizationId,
    pub primary_naics: Option<String>,
    pub secondary_naics: Vec<String>,
    pub certifications: Vec<CertificationKind>,
    pub past_performance: Vec<PastPerformanceRecord>,
    pub geographic_preferences: Vec<String>,
    pub clearance: ClearanceLevel,
    pub capabilities: Vec<String>,
    pub contact_email: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Solicitation record treated as read-only input to scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub opportunity_id: OpportunityId,
    pub title: String,
    pub agency: String,
    pub naics_code: Option<String>,
    pub estimated_value: Option<u64>,
    pub set_aside: Option<SetAsideType>,
    pub required_clearance: ClearanceLevel,
    pub place_of_performance: Option<String>,
    pub response_deadline: Option<NaiveDate>,
    pub description: String,
}

/// Selects the computation strategy for a score request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMethod {
    Calculation,
    Generative,
    Hybrid,
}

impl ScoreMethod {
    pub fn label(&self) -> &'static str {
        match self {
            ScoreMethod::Calculation => "calculation",
            ScoreMethod::Generative => "generative",
            ScoreMethod::Hybrid => "hybrid",
        }
    }
}

/// Selects whether the generative pipeline runs its full four-stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMode {
    Fast,
    Advanced,
}

impl ScoreMode {
    pub fn label(&self) -> &'static str {
        match self {
            ScoreMode::Fast => "fast",
            ScoreMode::Advanced => "advanced",
        }
    }
}

/// A single scoring request; method and mode fully determine the computation path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub opportunity_id: OpportunityId,
    pub profile_id: Option<ProfileId>,
    pub method: ScoreMethod,
    pub mode: ScoreMode,
    pub organization_id: OrganizationId,
    pub user_id: String,
}

/// Per-category breakdown inside a score result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub score: u8,
    pub weight: u8,
    pub contribution: f64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub opportunities: Vec<String>,
    pub threats: Vec<String>,
}

impl CategoryScore {
    /// Neutral category used when no comparable data exists or parsing failed.
    pub fn neutral(weight: u8, note: &str) -> Self {
        Self {
            score: 50,
            weight,
            contribution: 50.0 * f64::from(weight) / 100.0,
            strengths: Vec::new(),
            weaknesses: vec![note.to_string()],
            opportunities: Vec::new(),
            threats: Vec::new(),
        }
    }
}

/// Narrative analysis produced by the reasoning stage, carried on advanced results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticAnalysis {
    pub narrative: String,
    pub explicit_requirements: Vec<String>,
    pub implicit_preferences: Vec<String>,
    pub verification_notes: Vec<String>,
}

/// Severity classification for a capability gap against an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapSeverity {
    Minor,
    Moderate,
    Critical,
}

/// A named capability gap with its severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalGap {
    pub description: String,
    pub severity: GapSeverity,
}

/// Strategic output from the insight stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategicInsights {
    pub win_probability: u8,
    pub win_probability_range: (u8, u8),
    pub competitive_advantages: Vec<String>,
    pub critical_gaps: Vec<CriticalGap>,
    pub teaming_recommendations: Vec<String>,
    pub proposal_themes: Vec<String>,
}

impl StrategicInsights {
    /// Conservative placeholder returned when the insight stage fails.
    pub fn conservative(overall_score: u8) -> Self {
        let win = overall_score / 2 + 10;
        Self {
            win_probability: win.min(100),
            win_probability_range: (win.saturating_sub(15), (win + 15).min(100)),
            competitive_advantages: Vec::new(),
            critical_gaps: Vec::new(),
            teaming_recommendations: Vec::new(),
            proposal_themes: Vec::new(),
        }
    }

    /// Heuristic used by fast mode: win probability tracks the overall score.
    pub fn heuristic(overall_score: u8) -> Self {
        let win = ((f64::from(overall_score) * 0.8) + 5.0).round() as u8;
        Self {
            win_probability: win.min(100),
            win_probability_range: (win.saturating_sub(10), (win + 10).min(100)),
            competitive_advantages: Vec::new(),
            critical_gaps: Vec::new(),
            teaming_recommendations: Vec::new(),
            proposal_themes: Vec::new(),
        }
    }
}

/// Structured fitness score returned for every (opportunity, profile) pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub overall_score: u8,
    pub confidence: u8,
    pub algorithm_version: String,
    pub categories: BTreeMap<String, CategoryScore>,
    pub semantic_analysis: Option<SemanticAnalysis>,
    pub strategic_insights: Option<StrategicInsights>,
    pub recommendations: Vec<String>,
    pub cost_units: f64,
    pub processing_time_ms: u64,
}

/// Billable usage record emitted once per fresh computation, never for cache hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub organization_id: OrganizationId,
    pub quantity: u32,
    pub resource_type: String,
    pub occurred_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

impl UsageEvent {
    pub const MATCH_SCORE_RESOURCE: &'static str = "match_score_calculation";

    pub fn match_score(organization_id: OrganizationId, quantity: u32) -> Self {
        Self {
            organization_id,
            quantity,
            resource_type: Self::MATCH_SCORE_RESOURCE.to_string(),
            occurred_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Clamp an arbitrary float into the 0-100 integer score range.
pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_finite() {
        raw.round().clamp(0.0, 100.0) as u8
    } else {
        50
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_score_handles_out_of_range_and_non_finite_input() {
        assert_eq!(clamp_score(112.4), 100);
        assert_eq!(clamp_score(-3.0), 0);
        assert_eq!(clamp_score(61.5), 62);
        assert_eq!(clamp_score(f64::NAN), 50);
        assert_eq!(clamp_score(f64::INFINITY), 50);
    }

    #[test]
    fn certification_satisfies_matching_set_aside_only() {
        assert!(CertificationKind::HubZone.satisfies(SetAsideType::HubZone));
        assert!(!CertificationKind::HubZone.satisfies(SetAsideType::Wosb));
    }

    #[test]
    fn clearance_levels_are_ordered() {
        assert!(ClearanceLevel::TopSecret > ClearanceLevel::Secret);
        assert!(ClearanceLevel::Secret > ClearanceLevel::None);
    }

    #[test]
    fn neutral_category_contributes_midpoint_share() {
        let category = CategoryScore::neutral(35, "no data");
        assert_eq!(category.score, 50);
        assert!((category.contribution - 17.5).abs() < f64::EPSILON);
    }
}
