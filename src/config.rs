//! Engine configuration loaded from the environment.

use crate::error::{EngineError, Result};

/// Runtime configuration for the event engine.
///
/// Hosts construct this once at startup and hand it to
/// [`crate::events::EventBusBuilder::config`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Connection string for the Postgres-backed event store.
    pub database_url: String,
    /// Whether the built-in metrics aggregator is registered at bootstrap.
    pub metrics_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/fleetops_development".to_string(),
            metrics_enabled: true,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(metrics) = std::env::var("FLEETOPS_METRICS_ENABLED") {
            config.metrics_enabled = metrics.parse().map_err(|e| {
                EngineError::Configuration(format!("Invalid FLEETOPS_METRICS_ENABLED: {e}"))
            })?;
        }

        Ok(config)
    }
}
