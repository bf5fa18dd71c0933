//! # Registry Infrastructure
//!
//! The routing table between emitted business events and the reaction
//! modules that consume them.
//!
//! ## Overview
//!
//! Reaction modules (ledger posting, notifications, invoicing, anomaly
//! scans) depend only on this registration interface; the engine never
//! imports them. A host wires everything together once at startup through
//! [`crate::events::EventBusBuilder`], which owns a single
//! [`HandlerRegistry`].

pub mod handler_registry;

// Re-export main types for easy access
pub use handler_registry::{
    EventHandler, FnHandler, HandlerRegistration, HandlerRegistry, RegisterOptions,
};
