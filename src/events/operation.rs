//! Operation wrapper: run a business action, emit its event only on success.
//!
//! Call sites that mutate state and then announce it share one shape:
//! perform the mutation, and if and only if it succeeded, emit the
//! corresponding business event. [`EventBus::with_operation`] captures
//! that ordering so failed actions never produce phantom events.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fleetops_core::events::{Derived, EventBus, Operation};
//! use fleetops_core::store::MemoryEventStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = EventBus::new(Arc::new(MemoryEventStore::new()));
//!
//! let completed = bus
//!     .with_operation(
//!         Operation::new("payment.approve", "payment").with_user_id("ops-7"),
//!         || async { approve_payment("pay-42").await },
//!         |payment_id: &String| Derived::new(
//!             payment_id.clone(),
//!             serde_json::json!({ "paymentId": payment_id }),
//!         ),
//!     )
//!     .await?;
//! println!("approved {}", completed.output);
//! # Ok(())
//! # }
//! # async fn approve_payment(id: &str) -> Result<String, String> { Ok(id.to_string()) }
//! ```

use std::future::Future;
use tracing::debug;
use uuid::Uuid;

use crate::error::EngineError;
use crate::events::bus::EventBus;
use crate::events::types::{BusinessEvent, EmitRequest};

/// How the event for a completed action is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Fire-and-forget on a tracked background task
    #[default]
    Background,
    /// Await the handler chain; the wrapper returns the finalized event
    Blocking,
}

/// Description of the business operation a wrapped action performs
#[derive(Debug, Clone)]
pub struct Operation {
    operation_id: String,
    entity_type: String,
    user_id: Option<String>,
    parent_event_id: Option<Uuid>,
    delivery: Delivery,
}

impl Operation {
    pub fn new(operation_id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            entity_type: entity_type.into(),
            user_id: None,
            parent_event_id: None,
            delivery: Delivery::Background,
        }
    }

    /// Dispatch the event inline instead of on a background task
    pub fn blocking(mut self) -> Self {
        self.delivery = Delivery::Blocking;
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_parent_event(mut self, parent_event_id: Uuid) -> Self {
        self.parent_event_id = Some(parent_event_id);
        self
    }
}

/// Event fields only known once the action has produced its output
#[derive(Debug, Clone)]
pub struct Derived {
    pub entity_id: String,
    pub payload: serde_json::Value,
}

impl Derived {
    pub fn new(entity_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            entity_id: entity_id.into(),
            payload,
        }
    }
}

/// A successfully wrapped action: the action's output plus the emitted
/// event snapshot (`pending` for background delivery, finalized for
/// blocking delivery)
#[derive(Debug)]
pub struct CompletedOperation<T> {
    pub output: T,
    pub event: BusinessEvent,
}

/// Failure of a wrapped operation
#[derive(Debug, thiserror::Error)]
pub enum OperationError<E>
where
    E: std::fmt::Display + std::fmt::Debug,
{
    /// The action itself failed; no event was persisted or dispatched
    #[error("Operation action failed: {0}")]
    Action(E),

    /// The action succeeded but emission failed. The action's side
    /// effects stand; callers needing atomicity must wrap both in one
    /// transaction of their own.
    #[error(transparent)]
    Emit(#[from] EngineError),
}

impl EventBus {
    /// Run `action`, and on success derive and emit the matching event.
    ///
    /// `derive` maps the action's output to the event fields that only
    /// exist once the action ran, such as a created record's id. A failed
    /// action short-circuits with [`OperationError::Action`] and leaves
    /// no trace in the event store.
    pub async fn with_operation<T, E, A, Fut, D>(
        &self,
        operation: Operation,
        action: A,
        derive: D,
    ) -> std::result::Result<CompletedOperation<T>, OperationError<E>>
    where
        E: std::fmt::Display + std::fmt::Debug,
        A: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        D: FnOnce(&T) -> Derived,
    {
        let output = action().await.map_err(OperationError::Action)?;
        let derived = derive(&output);

        let mut request = EmitRequest::new(
            operation.operation_id,
            operation.entity_type,
            derived.entity_id,
        )
        .with_payload(derived.payload);
        if let Some(user_id) = operation.user_id {
            request = request.with_user_id(user_id);
        }
        if let Some(parent_event_id) = operation.parent_event_id {
            request = request.with_parent_event(parent_event_id);
        }

        let event = match operation.delivery {
            Delivery::Background => self.emit(request).await?,
            Delivery::Blocking => self.emit_sync(request).await?,
        };
        debug!(
            event_id = %event.id,
            operation_id = %event.operation_id,
            delivery = ?operation.delivery,
            "Operation completed and event emitted"
        );

        Ok(CompletedOperation { output, event })
    }
}
