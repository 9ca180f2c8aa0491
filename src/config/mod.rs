use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub scoring: ScoringConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let mut scoring = ScoringConfig::default();
        if let Ok(raw) = env::var("SCORE_CACHE_TTL_SECS") {
            scoring.cache_ttl_secs = parse_scoring_value("SCORE_CACHE_TTL_SECS", &raw)?;
        }
        if let Ok(raw) = env::var("SCORE_MAX_BATCH") {
            scoring.max_batch_size = parse_scoring_value("SCORE_MAX_BATCH", &raw)?;
        }
        if let Ok(raw) = env::var("SCORE_GENERATION_TIMEOUT_MS") {
            scoring.generation_timeout_ms = parse_scoring_value("SCORE_GENERATION_TIMEOUT_MS", &raw)?;
        }
        scoring.validate()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            scoring,
        })
    }
}

fn parse_scoring_value<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidScoringValue { name })
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Weights for the four fixed generative scoring categories. Configurable
/// per deployment; the platform default mirrors 35/35/15/15.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub past_performance: u8,
    pub technical_capability: u8,
    pub strategic_fit: u8,
    pub credibility: u8,
}

impl CategoryWeights {
    pub fn total(&self) -> u16 {
        u16::from(self.past_performance)
            + u16::from(self.technical_capability)
            + u16::from(self.strategic_fit)
            + u16::from(self.credibility)
    }
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            past_performance: 35,
            technical_capability: 35,
            strategic_fit: 15,
            credibility: 15,
        }
    }
}

/// Tunable surface for the match-scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Generative share of a hybrid blend; the calculation share is the remainder.
    pub hybrid_generative_weight: f64,
    pub category_weights: CategoryWeights,
    pub cache_ttl_secs: u64,
    pub max_batch_size: usize,
    pub generation_timeout_ms: u64,
    pub cache_timeout_ms: u64,
    pub generation_max_tokens: u32,
    pub dispatcher_concurrency: usize,
    pub dispatcher_max_retries: u32,
}

impl ScoringConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    pub fn hybrid_calculation_weight(&self) -> f64 {
        1.0 - self.hybrid_generative_weight
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.hybrid_generative_weight) {
            return Err(ConfigError::InvalidScoringValue {
                name: "hybrid_generative_weight",
            });
        }
        if self.category_weights.total() != 100 {
            return Err(ConfigError::InvalidCategoryWeights {
                total: self.category_weights.total(),
            });
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::InvalidScoringValue {
                name: "max_batch_size",
            });
        }
        Ok(())
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            hybrid_generative_weight: 0.7,
            category_weights: CategoryWeights::default(),
            cache_ttl_secs: 3600,
            max_batch_size: 50,
            generation_timeout_ms: 60_000,
            cache_timeout_ms: 30_000,
            generation_max_tokens: 2048,
            dispatcher_concurrency: 4,
            dispatcher_max_retries: 2,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidScoringValue { name: &'static str },
    InvalidCategoryWeights { total: u16 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidScoringValue { name } => {
                write!(f, "{name} must be a valid non-negative number")
            }
            ConfigError::InvalidCategoryWeights { total } => {
                write!(f, "category weights must sum to 100, got {total}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
