use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Prompt payload handed to the text-generation capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub structured: bool,
}

impl GenerationRequest {
    pub fn structured(prompt: String, max_tokens: u32) -> Self {
        Self {
            prompt,
            max_tokens,
            structured: true,
        }
    }

    pub fn freeform(prompt: String, max_tokens: u32) -> Self {
        Self {
            prompt,
            max_tokens,
            structured: false,
        }
    }
}

/// Response from the text-generation capability with its billing footprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub text: String,
    pub cost_units: f64,
    pub latency_ms: u64,
}

/// Failure taxonomy for generation calls. Outages are recoverable via the
/// deterministic fallback; the orchestrator decides that policy, not the stage.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation provider outage: {0}")]
    Outage(String),
    #[error("generation call exceeded {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("generation returned an empty response")]
    Empty,
}

impl GenerationError {
    /// Whether this failure warrants falling back to deterministic scoring.
    pub fn is_outage(&self) -> bool {
        matches!(self, GenerationError::Outage(_) | GenerationError::Timeout { .. })
    }
}

/// Abstract text-generation capability. The concrete backend (provider
/// selection, model routing) lives outside this crate.
#[async_trait]
pub trait TextGeneration: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, GenerationError>;
}

/// Explicit cost record threaded through each stage and merged by the
/// pipeline compiler, so spend is auditable per stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostLedger {
    entries: Vec<CostEntry>,
}

/// One stage's spend and latency.
#[derive(Debug, Clone, PartialEq)]
pub struct CostEntry {
    pub stage: &'static str,
    pub cost_units: f64,
    pub latency_ms: u64,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(stage: &'static str, output: &GenerationOutput) -> Self {
        let mut ledger = Self::new();
        ledger.charge(stage, output.cost_units, output.latency_ms);
        ledger
    }

    pub fn charge(&mut self, stage: &'static str, cost_units: f64, latency_ms: u64) {
        self.entries.push(CostEntry {
            stage,
            cost_units,
            latency_ms,
        });
    }

    pub fn merge(&mut self, other: CostLedger) {
        self.entries.extend(other.entries);
    }

    pub fn total_cost(&self) -> f64 {
        self.entries.iter().map(|entry| entry.cost_units).sum()
    }

    pub fn total_latency_ms(&self) -> u64 {
        self.entries.iter().map(|entry| entry.latency_ms).sum()
    }

    pub fn entries(&self) -> &[CostEntry] {
        &self.entries
    }
}
