//! Crate-level error types for the dispatch engine.

use crate::store::StoreError;

/// Errors surfaced to emitters by the dispatch engine.
///
/// Handler failures never appear here: they are isolated per handler and
/// recorded on the event itself (see [`crate::events::HandlerFailure`]).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The operation identifier is not part of the operation catalog.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// The event store rejected or failed a persistence call.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
