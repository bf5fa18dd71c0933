//! Per-event execution context handed to every handler in a chain.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::events::types::{BusinessEvent, HandlerFailure};

/// Immutable view of one event plus the shared sinks a handler may write to.
///
/// The event snapshot never changes during a chain. Failures recorded by
/// earlier handlers are visible to later ones (the metrics aggregator relies
/// on this), and metadata set here is persisted on the event at
/// finalization. Cloning is cheap; all interior state is shared.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    event: Arc<BusinessEvent>,
    failures: Arc<RwLock<Vec<HandlerFailure>>>,
    metadata: Arc<RwLock<Map<String, Value>>>,
}

impl HandlerContext {
    pub fn new(event: BusinessEvent) -> Self {
        Self {
            event: Arc::new(event),
            failures: Arc::new(RwLock::new(Vec::new())),
            metadata: Arc::new(RwLock::new(Map::new())),
        }
    }

    /// The event being dispatched, as persisted at creation
    pub fn event(&self) -> &BusinessEvent {
        &self.event
    }

    pub fn event_id(&self) -> Uuid {
        self.event.id
    }

    pub fn operation_id(&self) -> &str {
        &self.event.operation_id
    }

    pub fn entity_type(&self) -> &str {
        &self.event.entity_type
    }

    pub fn entity_id(&self) -> &str {
        &self.event.entity_id
    }

    pub fn payload(&self) -> &Value {
        &self.event.payload
    }

    /// Deserialize the payload into a typed shape (usually one of
    /// [`crate::constants::payloads`])
    pub fn payload_as<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.event.payload.clone())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.event.user_id.as_deref()
    }

    pub fn parent_event_id(&self) -> Option<Uuid> {
        self.event.parent_event_id
    }

    /// Record one handler's unrecovered failure
    pub fn record_failure(&self, handler: &str, message: impl Into<String>) {
        self.failures.write().push(HandlerFailure {
            handler: handler.to_string(),
            message: message.into(),
        });
    }

    /// Whether any earlier handler failed without recovery
    pub fn has_failures(&self) -> bool {
        !self.failures.read().is_empty()
    }

    /// Snapshot of the failures recorded so far
    pub fn failures(&self) -> Vec<HandlerFailure> {
        self.failures.read().clone()
    }

    /// Attach a metadata entry to the event; last writer wins per key
    pub fn set_metadata(&self, key: impl Into<String>, value: Value) {
        self.metadata.write().insert(key.into(), value);
    }

    /// Metadata accumulated by the chain, `None` when nothing was set
    pub fn metadata_snapshot(&self) -> Option<Value> {
        let metadata = self.metadata.read();
        if metadata.is_empty() {
            None
        } else {
            Some(Value::Object(metadata.clone()))
        }
    }
}
