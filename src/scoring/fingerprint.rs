use std::fmt;
use std::fmt::Write as _;

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::domain::{
    CapabilityProfile, CertificationKind, ClearanceLevel, OpportunityId, ProfileId, ScoreMethod,
    ScoreMode,
};

/// Hex length the digest is truncated to; stable across process restarts.
const FINGERPRINT_LEN: usize = 16;

/// Scoring-relevant subset of a profile, canonicalized before hashing so
/// unrelated edits (contact details, timestamps) never move the digest.
#[derive(Serialize)]
struct FingerprintFields<'a> {
    primary_naics: &'a Option<String>,
    secondary_naics: Vec<&'a str>,
    certifications: Vec<CertificationKind>,
    past_performance: Vec<(&'a str, &'a str, u64, Option<u8>)>,
    geographic_preferences: Vec<&'a str>,
    clearance: ClearanceLevel,
    capabilities: Vec<&'a str>,
}

/// Short deterministic digest of a profile's scoring-relevant fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileFingerprint(String);

impl ProfileFingerprint {
    pub fn of(profile: &CapabilityProfile) -> Self {
        let mut secondary_naics: Vec<&str> =
            profile.secondary_naics.iter().map(String::as_str).collect();
        secondary_naics.sort_unstable();

        let mut certifications = profile.certifications.clone();
        certifications.sort();

        let mut past_performance: Vec<(&str, &str, u64, Option<u8>)> = profile
            .past_performance
            .iter()
            .map(|record| {
                (
                    record.agency.as_str(),
                    record.naics_code.as_str(),
                    record.contract_value,
                    record.performance_rating,
                )
            })
            .collect();
        past_performance.sort_unstable();

        let mut geographic_preferences: Vec<&str> = profile
            .geographic_preferences
            .iter()
            .map(String::as_str)
            .collect();
        geographic_preferences.sort_unstable();

        let mut capabilities: Vec<&str> =
            profile.capabilities.iter().map(String::as_str).collect();
        capabilities.sort_unstable();

        let fields = FingerprintFields {
            primary_naics: &profile.primary_naics,
            secondary_naics,
            certifications,
            past_performance,
            geographic_preferences,
            clearance: profile.clearance,
            capabilities,
        };

        let canonical =
            serde_json::to_string(&fields).unwrap_or_else(|_| String::from("unserializable"));
        let digest = Sha256::digest(canonical.as_bytes());

        let mut hex = String::with_capacity(FINGERPRINT_LEN);
        for byte in digest.iter().take(FINGERPRINT_LEN / 2) {
            let _ = write!(&mut hex, "{byte:02x}");
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sole lookup key into the score cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub profile_id: ProfileId,
    pub fingerprint: ProfileFingerprint,
    pub opportunity_id: OpportunityId,
    pub method: ScoreMethod,
    pub mode: ScoreMode,
}

impl CacheKey {
    pub fn derive(
        profile: &CapabilityProfile,
        opportunity_id: &OpportunityId,
        method: ScoreMethod,
        mode: ScoreMode,
    ) -> Self {
        Self {
            profile_id: profile.profile_id.clone(),
            fingerprint: ProfileFingerprint::of(profile),
            opportunity_id: opportunity_id.clone(),
            method,
            mode,
        }
    }

    /// Render into the canonical `profile:fingerprint:opportunity:method:mode` form.
    pub fn render(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.profile_id.0,
            self.fingerprint,
            self.opportunity_id.0,
            self.method.label(),
            self.mode.label()
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
