//! # Structured Logging
//!
//! Environment-aware tracing initialization for hosts embedding the engine.
//! The engine itself only emits `tracing` events; installing a subscriber is
//! the host's call, and this helper is the batteries-included way to do it.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process.
///
/// Respects `RUST_LOG` when set; otherwise derives a default level from
/// `FLEETOPS_ENV`. Set `FLEETOPS_LOG_FORMAT=json` for line-delimited JSON
/// output. Safe to call repeatedly, and a no-op when the host has already
/// installed a global subscriber.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_log_level(&environment)));

        let json_output = std::env::var("FLEETOPS_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        // Use try_init to avoid panicking if a global subscriber already exists
        let result = if json_output {
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .json()
                .try_init()
        } else {
            fmt().with_env_filter(filter).with_target(true).try_init()
        };

        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        } else {
            tracing::info!(
                environment = %environment,
                json = json_output,
                "📣 EVENT_ENGINE: structured logging initialized"
            );
        }
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("FLEETOPS_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get default log level based on environment
fn default_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        "test" => "debug".to_string(),
        _ => "debug".to_string(),
    }
}
