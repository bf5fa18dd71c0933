#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # FleetOps Core
//!
//! Business-event dispatch engine for the FleetOps rental, fleet and
//! accounting platform.
//!
//! ## Overview
//!
//! Admin actions across the platform (approving a payment, activating a
//! rental contract, registering a moto, closing an accounting period)
//! share one announcement path: the mutation runs, and on success a
//! business event is persisted and dispatched to every handler whose
//! pattern matches the operation id. The stored event doubles as an
//! audit record; it is never deleted, and its status tells whether the
//! side-effect chain ran clean.
//!
//! ## Architecture
//!
//! - A **closed operation catalog** ([`constants::operations`]) names every
//!   operation the platform can announce; unknown ids are rejected before
//!   anything is persisted.
//! - The **handler registry** ([`registry`]) maps operation patterns
//!   (exact, `domain.*` prefix, universal `*`) to prioritized handlers.
//! - The **event store** ([`store`]) persists each event before dispatch
//!   and finalizes it afterwards; Postgres in production, in-memory for
//!   tests and embedded use.
//! - The **event bus** ([`events::EventBus`]) runs matching handlers
//!   strictly in priority order with per-handler fault isolation, either
//!   on a tracked background task (`emit`) or inline (`emit_sync`).
//! - A built-in **metrics aggregator** ([`events::MetricsHandler`])
//!   observes every event last and maintains hourly and daily counters.
//!
//! ## Key Features
//!
//! - **Persist-first dispatch**: the audit row exists before any handler runs
//! - **Deterministic ordering**: ascending priority, registration order on ties
//! - **Fault isolation**: one handler's error or panic never stops the chain
//! - **Opt-in single retry** per registration, with the original failure kept
//! - **Graceful shutdown**: background dispatches are tracked and drainable
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fleetops_core::events::{EmitRequest, EventBus};
//! use fleetops_core::registry::RegisterOptions;
//! use fleetops_core::store::PgEventStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! fleetops_core::logging::init_logging();
//!
//! let store = Arc::new(PgEventStore::connect("postgresql://localhost/fleetops").await?);
//! let bus = EventBus::builder(store)
//!     .register_fn(
//!         "payment.*",
//!         "ledger_post",
//!         |ctx| async move {
//!             println!("posting {} for {}", ctx.operation_id(), ctx.entity_id());
//!             Ok(())
//!         },
//!         RegisterOptions::default().priority(50),
//!     )
//!     .build();
//!
//! let event = bus
//!     .emit(EmitRequest::new("payment.approve", "payment", "pay-42"))
//!     .await?;
//! println!("event {} persisted as {}", event.id, event.status);
//!
//! bus.drain().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! The suite runs entirely against [`store::MemoryEventStore`]:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod registry;
pub mod store;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use events::{
    BusinessEvent, CompletedOperation, Delivery, Derived, EmitRequest, EventBus, EventBusBuilder,
    EventStatus, HandlerContext, HandlerFailure, Operation, OperationError,
};
pub use registry::{EventHandler, FnHandler, HandlerRegistry, RegisterOptions};
pub use store::{EventStore, MemoryEventStore, PgEventStore, StoreError};
