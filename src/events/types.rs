//! Core event types: the persisted [`BusinessEvent`], its status state
//! machine, and the [`EmitRequest`] builder used at emit sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::constants::payloads::OperationPayload;
use crate::error::Result;

/// Event dispatch lifecycle states
///
/// `Pending -> Processing -> {Completed | Failed}`. Terminal states are
/// final; the store rejects any transition out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Persisted, handlers not yet running
    Pending,
    /// Handler chain is executing
    Processing,
    /// Every handler succeeded (or none matched)
    Completed,
    /// At least one handler failure went unrecovered
    Failed,
}

impl EventStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if this is an active state (dispatch work in flight)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Storage representation, matching the serde encoding
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid event status: {s}")),
        }
    }
}

/// Default state for newly created events
impl Default for EventStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// One handler's unrecovered error, recorded on the event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerFailure {
    /// Name of the handler that failed
    pub handler: String,
    /// Failure message; prefixed with `failed after retry: ` when the
    /// retry attempt also failed
    pub message: String,
}

/// A persisted business event and its dispatch outcome.
///
/// Created once, updated at most twice (to `Processing`, then to a terminal
/// status), never deleted by the engine. The payload and metadata are opaque
/// JSON the engine stores but never inspects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessEvent {
    /// Store-assigned identifier
    pub id: Uuid,
    /// Catalog identifier (see [`crate::constants::operations`])
    pub operation_id: String,
    /// Logical entity reference, not an enforced foreign key
    pub entity_type: String,
    pub entity_id: String,
    /// Opaque JSON supplied by the emitter
    pub payload: serde_json::Value,
    /// Opaque JSON set by handlers through the execution context
    pub metadata: Option<serde_json::Value>,
    /// Acting user, when the operation was user-initiated
    pub user_id: Option<String>,
    /// Causal back-reference to the event whose handler emitted this one
    pub parent_event_id: Option<Uuid>,
    pub status: EventStatus,
    /// Handler failures from a failed run; `None` on success
    pub error: Option<Vec<HandlerFailure>>,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, at finalization
    pub processed_at: Option<DateTime<Utc>>,
}

impl BusinessEvent {
    /// Whether dispatch has reached a final status
    pub fn is_settled(&self) -> bool {
        self.status.is_terminal()
    }

    /// Handler failures recorded on a failed run
    pub fn failures(&self) -> &[HandlerFailure] {
        self.error.as_deref().unwrap_or(&[])
    }
}

/// Creation shape handed to the store; the store assigns id, status and
/// `created_at`.
#[derive(Debug, Clone)]
pub struct NewBusinessEvent {
    pub operation_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
    pub metadata: Option<serde_json::Value>,
    pub user_id: Option<String>,
    pub parent_event_id: Option<Uuid>,
}

/// Builder for an event emission.
///
/// ```
/// use fleetops_core::constants::operations;
/// use fleetops_core::events::EmitRequest;
/// use serde_json::json;
///
/// let request = EmitRequest::new(operations::PAYMENT_APPROVE, "payment", "pay-81")
///     .with_payload(json!({"amount_cents": 12_500}))
///     .with_user_id("ops-4");
/// assert_eq!(request.operation_id, "payment.approve");
/// ```
#[derive(Debug, Clone)]
pub struct EmitRequest {
    pub operation_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
    pub user_id: Option<String>,
    pub parent_event_id: Option<Uuid>,
}

impl EmitRequest {
    pub fn new(
        operation_id: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            payload: serde_json::Value::Object(serde_json::Map::new()),
            user_id: None,
            parent_event_id: None,
        }
    }

    /// Build a request from a catalog payload type; the operation id comes
    /// from the payload's schema, so the two cannot drift apart.
    pub fn from_payload<P: OperationPayload>(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        payload: &P,
    ) -> Result<Self> {
        Ok(Self {
            operation_id: P::OPERATION_ID.to_string(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            payload: serde_json::to_value(payload)?,
            user_id: None,
            parent_event_id: None,
        })
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the causal parent for events emitted from inside a handler.
    ///
    /// Chains can nest arbitrarily deep; the engine does not detect cycles,
    /// so a handler that re-emits its own triggering operation will loop.
    pub fn with_parent_event(mut self, parent_event_id: Uuid) -> Self {
        self.parent_event_id = Some(parent_event_id);
        self
    }

    pub(crate) fn into_new_event(self) -> NewBusinessEvent {
        NewBusinessEvent {
            operation_id: self.operation_id,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            payload: self.payload,
            metadata: None,
            user_id: self.user_id,
            parent_event_id: self.parent_event_id,
        }
    }
}
