//! # Event Bus
//!
//! Central dispatcher for persisted business events.
//!
//! ## Overview
//!
//! Every emission follows the same lifecycle: validate the operation id
//! against the catalog, persist the event as `pending`, resolve matching
//! handlers from the registry, then run them strictly in ascending
//! priority order and finalize the stored record as `completed` or
//! `failed`. [`EventBus::emit`] runs the chain on a tracked background
//! task and returns the pending snapshot immediately;
//! [`EventBus::emit_sync`] awaits the chain and returns the finalized
//! record.
//!
//! ## Key Features
//!
//! - **Persist-first dispatch**: the audit row exists before any handler runs
//! - **Fault isolation**: one handler's error or panic never stops the chain
//! - **Single retry**: opt-in per registration, re-invoked immediately once
//! - **Tracked background tasks**: [`EventBus::drain`] awaits in-flight work
//! - **Built-in metrics**: a universal aggregation handler appended at bootstrap
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fleetops_core::events::{EmitRequest, EventBus};
//! use fleetops_core::registry::RegisterOptions;
//! use fleetops_core::store::MemoryEventStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = EventBus::new(Arc::new(MemoryEventStore::new()));
//!
//! bus.register_fn(
//!     "payment.*",
//!     "ledger_post",
//!     |ctx| async move {
//!         println!("posting {} to the ledger", ctx.operation_id());
//!         Ok(())
//!     },
//!     RegisterOptions::default().priority(50),
//! );
//!
//! let event = bus
//!     .emit_sync(EmitRequest::new("payment.approve", "payment", "pay-42"))
//!     .await?;
//! println!("settled as {}", event.status);
//! # Ok(())
//! # }
//! ```

use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::constants::{operations, priorities};
use crate::error::{EngineError, Result};
use crate::events::metrics::MetricsHandler;
use crate::events::types::{BusinessEvent, EmitRequest, EventStatus};
use crate::events::HandlerContext;
use crate::registry::{EventHandler, FnHandler, HandlerRegistration, HandlerRegistry, RegisterOptions};
use crate::store::{EventOutcome, EventStore, StoreError};

struct BusInner {
    store: Arc<dyn EventStore>,
    registry: Arc<HandlerRegistry>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

/// Business-event dispatcher. Cheap to clone; clones share the store,
/// the registry and the in-flight task list.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.inner.registry.handler_count())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl EventBus {
    /// Bus over the given store with default configuration: metrics
    /// aggregation enabled, no business handlers yet.
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self::builder(store).build()
    }

    /// Start an explicit bootstrap over the given store
    pub fn builder(store: Arc<dyn EventStore>) -> EventBusBuilder {
        EventBusBuilder::new(store)
    }

    /// Register a handler after bootstrap
    pub fn register(
        &self,
        pattern: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        options: RegisterOptions,
    ) {
        self.inner.registry.register(pattern, handler, options);
    }

    /// Register an async closure after bootstrap
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
        self.inner.registry.register_fn(pattern, name, func, options);
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.inner.store
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    /// Persist an event and run its handler chain on a background task.
    ///
    /// Returns the `pending` snapshot as soon as the event is durable.
    /// Unknown operation ids and persistence failures are the only
    /// errors surfaced here; handler failures land on the stored record
    /// instead. The spawned task is tracked and joined by [`Self::drain`].
    pub async fn emit(&self, request: EmitRequest) -> Result<BusinessEvent> {
        let (event, matching) = self.prepare(request).await?;

        if matching.is_empty() {
            return self.finalize_unhandled(event).await;
        }

        let store = self.inner.store.clone();
        let task_event = event.clone();
        let event_id = event.id;
        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(execute_handlers(store, task_event, matching))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(
                        event_id = %event_id,
                        error = %e,
                        "Background dispatch could not persist progress"
                    );
                }
                Err(_) => {
                    error!(event_id = %event_id, "Background dispatch panicked");
                }
            }
        });
        self.track(handle);

        Ok(event)
    }

    /// Persist an event, run its handler chain inline, and return the
    /// finalized record.
    ///
    /// The returned event carries the terminal status, the failure list
    /// and the processing timestamp. Store failures during the run
    /// propagate; handler failures do not, they are visible on
    /// [`BusinessEvent::error`].
    pub async fn emit_sync(&self, request: EmitRequest) -> Result<BusinessEvent> {
        let (event, matching) = self.prepare(request).await?;

        if matching.is_empty() {
            return self.finalize_unhandled(event).await;
        }

        execute_handlers(self.inner.store.clone(), event.clone(), matching).await?;

        let finalized = self
            .inner
            .store
            .get_event(event.id)
            .await?
            .ok_or(StoreError::EventNotFound(event.id))?;
        Ok(finalized)
    }

    /// Number of tracked background dispatches that have not finished
    pub fn in_flight(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Await every tracked background dispatch.
    ///
    /// Loops until the task list stays empty, so chains where one
    /// handler emits follow-up events are drained too. Call this before
    /// shutdown; dropping the bus mid-flight abandons running chains.
    pub async fn drain(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut in_flight = self.inner.in_flight.lock();
                in_flight.drain(..).collect()
            };
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    // Panics are already caught and logged inside the task,
                    // so this only fires for cancellation
                    error!(error = %e, "Background dispatch join failed");
                }
            }
        }
    }

    /// Validate the operation id, persist the event, resolve handlers
    async fn prepare(
        &self,
        request: EmitRequest,
    ) -> Result<(BusinessEvent, Vec<HandlerRegistration>)> {
        if !operations::is_known_operation(&request.operation_id) {
            return Err(EngineError::UnknownOperation(request.operation_id));
        }

        let event = self.inner.store.create_event(request.into_new_event()).await?;
        debug!(
            event_id = %event.id,
            operation_id = %event.operation_id,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            "Business event persisted"
        );

        let matching = self.inner.registry.matching(&event.operation_id);
        Ok((event, matching))
    }

    /// Known operation, zero matching handlers: nothing to run, settle
    /// the record immediately
    async fn finalize_unhandled(&self, mut event: BusinessEvent) -> Result<BusinessEvent> {
        let outcome = EventOutcome::completed();
        let processed_at = outcome.processed_at;
        self.inner.store.finalize_event(event.id, outcome).await?;
        event.status = EventStatus::Completed;
        event.processed_at = Some(processed_at);
        debug!(
            event_id = %event.id,
            operation_id = %event.operation_id,
            "No handlers matched; event completed"
        );
        Ok(event)
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut in_flight = self.inner.in_flight.lock();
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }
}

/// Staged bootstrap for an [`EventBus`].
///
/// Handlers registered here land in the registry in registration order,
/// and the metrics aggregator is appended last (at
/// [`priorities::METRICS_HANDLER_PRIORITY`]) when enabled, so it always
/// observes the full chain's failure list.
pub struct EventBusBuilder {
    store: Arc<dyn EventStore>,
    config: EngineConfig,
    registrations: Vec<(String, Arc<dyn EventHandler>, RegisterOptions)>,
}

impl EventBusBuilder {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            registrations: Vec::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Toggle the built-in metrics aggregation handler
    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.config.metrics_enabled = enabled;
        self
    }

    pub fn register(
        mut self,
        pattern: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        options: RegisterOptions,
    ) -> Self {
        self.registrations.push((pattern.into(), handler, options));
        self
    }

    pub fn register_fn<F, Fut>(
        self,
        pattern: impl Into<String>,
        name: impl Into<String>,
        func: F,
        options: RegisterOptions,
    ) -> Self
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(pattern, Arc::new(FnHandler::new(name, func)), options)
    }

    /// Finish bootstrap and hand out the bus
    pub fn build(self) -> EventBus {
        let registry = Arc::new(HandlerRegistry::new());
        for (pattern, handler, options) in self.registrations {
            registry.register(pattern, handler, options);
        }

        if self.config.metrics_enabled {
            registry.insert(HandlerRegistration {
                pattern: "*".to_string(),
                priority: priorities::METRICS_HANDLER_PRIORITY,
                retry_on_fail: false,
                handler: Arc::new(MetricsHandler::new(self.store.clone())),
            });
        }

        info!(
            handlers = registry.handler_count(),
            metrics_enabled = self.config.metrics_enabled,
            "🚌 EVENT_BUS: Bootstrap complete"
        );

        EventBus {
            inner: Arc::new(BusInner {
                store: self.store,
                registry,
                in_flight: Mutex::new(Vec::new()),
            }),
        }
    }
}

/// Run one event's handler chain strictly in order, then finalize the
/// stored record from the accumulated failure list.
async fn execute_handlers(
    store: Arc<dyn EventStore>,
    event: BusinessEvent,
    handlers: Vec<HandlerRegistration>,
) -> std::result::Result<(), StoreError> {
    store.mark_processing(event.id).await?;

    let event_id = event.id;
    let operation_id = event.operation_id.clone();
    let ctx = HandlerContext::new(event);

    for registration in &handlers {
        invoke_handler(&ctx, registration).await;
    }

    let outcome = EventOutcome::from_failures(ctx.failures(), ctx.metadata_snapshot());
    let status = outcome.status;
    store.finalize_event(event_id, outcome).await?;

    debug!(
        event_id = %event_id,
        operation_id = %operation_id,
        status = %status,
        handlers = handlers.len(),
        "Event dispatch finalized"
    );
    Ok(())
}

/// Invoke one handler with fault isolation and the optional single retry
async fn invoke_handler(ctx: &HandlerContext, registration: &HandlerRegistration) {
    let handler = registration.handler.as_ref();
    let handler_name = handler.name();
    let start_time = Instant::now();

    match run_isolated(handler, ctx).await {
        Ok(()) => {
            debug!(
                event_id = %ctx.event_id(),
                handler_name = %handler_name,
                execution_time_ms = start_time.elapsed().as_millis() as i64,
                "Handler completed"
            );
        }
        Err(first_failure) if registration.retry_on_fail => {
            warn!(
                event_id = %ctx.event_id(),
                handler_name = %handler_name,
                error = %first_failure,
                "Handler failed, retrying once"
            );
            match run_isolated(handler, ctx).await {
                Ok(()) => {
                    debug!(
                        event_id = %ctx.event_id(),
                        handler_name = %handler_name,
                        execution_time_ms = start_time.elapsed().as_millis() as i64,
                        "Handler retry succeeded"
                    );
                }
                Err(retry_failure) => {
                    error!(
                        event_id = %ctx.event_id(),
                        handler_name = %handler_name,
                        error = %retry_failure,
                        execution_time_ms = start_time.elapsed().as_millis() as i64,
                        "Handler retry failed"
                    );
                    // The audit record keeps the first attempt's message
                    ctx.record_failure(handler_name, format!("failed after retry: {first_failure}"));
                }
            }
        }
        Err(failure) => {
            error!(
                event_id = %ctx.event_id(),
                handler_name = %handler_name,
                error = %failure,
                execution_time_ms = start_time.elapsed().as_millis() as i64,
                "Handler failed"
            );
            ctx.record_failure(handler_name, failure);
        }
    }
}

/// Run a handler call, converting errors and panics into a message.
/// A panic in one handler must not take down the chain.
async fn run_isolated(
    handler: &dyn EventHandler,
    ctx: &HandlerContext,
) -> std::result::Result<(), String> {
    match AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(handler_error)) => Err(handler_error.to_string()),
        Err(panic_error) => {
            let panic_msg = if let Some(s) = panic_error.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_error.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            Err(format!("Handler panicked: {panic_msg}"))
        }
    }
}
