//! Business-event dispatch: persisted events, handler context, the bus,
//! metrics aggregation and the operation wrapper.

pub mod bus;
pub mod context;
pub mod metrics;
pub mod operation;
pub mod pattern;
pub mod types;

// Re-export key types for convenience
pub use bus::{EventBus, EventBusBuilder};
pub use context::HandlerContext;
pub use metrics::{MetricsHandler, METRICS_HANDLER_NAME};
pub use operation::{CompletedOperation, Delivery, Derived, Operation, OperationError};
pub use types::{BusinessEvent, EmitRequest, EventStatus, HandlerFailure, NewBusinessEvent};
