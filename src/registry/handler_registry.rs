//! # Handler Registry
//!
//! Priority-ordered routing table from operation patterns to event handlers.
//!
//! ## Overview
//!
//! Each registration pairs a pattern (exact identifier, `domain.*` prefix,
//! or the universal `*`) with a handler, a priority, and a retry flag. The
//! table is kept stably sorted by ascending priority, so dispatch walks it
//! without sorting per event and handlers with equal priority run in
//! registration order.
//!
//! ## Key Features
//!
//! - **Thread-safe registration** behind a `parking_lot` RwLock
//! - **Pattern matching** via [`crate::events::pattern`]
//! - **Deterministic ordering** (ascending priority, stable on ties)
//! - **Duplicate patterns allowed**: registrations are independent
//!
//! ## Usage
//!
//! ```rust
//! use fleetops_core::registry::{HandlerRegistry, RegisterOptions};
//!
//! let registry = HandlerRegistry::new();
//! registry.register_fn(
//!     "payment.*",
//!     "ledger_post",
//!     |_ctx| async { Ok(()) },
//!     RegisterOptions::default().priority(50),
//! );
//! assert_eq!(registry.matching("payment.approve").len(), 1);
//! assert!(registry.matching("contract.activate").is_empty());
//! ```

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::constants::priorities;
use crate::events::pattern;
use crate::events::HandlerContext;

/// Trait for business-event handlers
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event; the outcome is recorded per handler and never
    /// stops the rest of the chain
    async fn handle(&self, ctx: &HandlerContext) -> anyhow::Result<()>;

    /// Handler name used in failure records and logs
    fn name(&self) -> &str {
        "unnamed_handler"
    }
}

/// Adapter turning an async closure into an [`EventHandler`]
pub struct FnHandler {
    name: String,
    func: Box<dyn Fn(HandlerContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>,
}

impl FnHandler {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(move |ctx| func(ctx).boxed()),
        }
    }
}

#[async_trait]
impl EventHandler for FnHandler {
    async fn handle(&self, ctx: &HandlerContext) -> anyhow::Result<()> {
        (self.func)(ctx.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// One routing-table entry
#[derive(Clone)]
pub struct HandlerRegistration {
    /// Operation pattern this handler subscribes to
    pub pattern: String,
    /// Ascending execution order; lower runs first
    pub priority: i32,
    /// Re-invoke once, immediately, after a failure
    pub retry_on_fail: bool,
    pub handler: Arc<dyn EventHandler>,
}

impl std::fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("pattern", &self.pattern)
            .field("priority", &self.priority)
            .field("retry_on_fail", &self.retry_on_fail)
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// Per-registration options
#[derive(Debug, Clone, Copy)]
pub struct RegisterOptions {
    pub priority: i32,
    pub retry_on_fail: bool,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            priority: priorities::DEFAULT_HANDLER_PRIORITY,
            retry_on_fail: false,
        }
    }
}

impl RegisterOptions {
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn retry_on_fail(mut self) -> Self {
        self.retry_on_fail = true;
        self
    }
}

/// Registry of handler registrations, stably sorted by ascending priority
pub struct HandlerRegistry {
    handlers: RwLock<Vec<HandlerRegistration>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register a handler for a pattern.
    ///
    /// Duplicate patterns are allowed and stay independent. Priorities at or
    /// beyond [`priorities::METRICS_HANDLER_PRIORITY`] are accepted but
    /// warned about: such handlers run after metrics aggregation, so their
    /// failures are invisible to the metrics counters.
    pub fn register(
        &self,
        pattern: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        options: RegisterOptions,
    ) {
        let pattern = pattern.into();
        if options.priority >= priorities::METRICS_HANDLER_PRIORITY {
            warn!(
                handler = handler.name(),
                pattern = %pattern,
                priority = options.priority,
                "Handler registered at or beyond the metrics priority and will run after aggregation"
            );
        }
        self.insert(HandlerRegistration {
            pattern,
            priority: options.priority,
            retry_on_fail: options.retry_on_fail,
            handler,
        });
    }

    /// Register an async closure without hand-writing an [`EventHandler`] impl
    pub fn register_fn<F, Fut>(
        &self,
        pattern: impl Into<String>,
        name: impl Into<String>,
        func: F,
        options: RegisterOptions,
    ) where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(pattern, Arc::new(FnHandler::new(name, func)), options);
    }

    pub(crate) fn insert(&self, registration: HandlerRegistration) {
        let mut handlers = self.handlers.write();
        debug!(
            handler = registration.handler.name(),
            pattern = %registration.pattern,
            priority = registration.priority,
            "Registered event handler"
        );
        handlers.push(registration);
        // Vec::sort_by_key is stable, so equal priorities keep registration order
        handlers.sort_by_key(|r| r.priority);
    }

    /// Registrations matching an operation id, in execution order
    pub fn matching(&self, operation_id: &str) -> Vec<HandlerRegistration> {
        self.handlers
            .read()
            .iter()
            .filter(|r| pattern::matches(&r.pattern, operation_id))
            .cloned()
            .collect()
    }

    /// Total number of registrations
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
