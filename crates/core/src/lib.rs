pub mod config;
pub mod database;
pub mod error;
pub mod metrics;
pub mod security;
pub mod types;

pub use config::{AnomalyConfig, BusConfig, Config, CorsConfig};
pub use database::DatabasePool;
pub use error::{Error, ErrorCode, ErrorContext, ErrorMetrics, Result};
pub use metrics::{MetricsRegistry, MetricsService};
pub use types::*;

#[cfg(test)]
mod tests;

// Re-export commonly used types from dependencies
pub use uuid::Uuid;
pub use chrono::{DateTime, Utc};