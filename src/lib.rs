pub mod config;
pub mod error;
pub mod infra;
pub mod scoring;
pub mod telemetry;
