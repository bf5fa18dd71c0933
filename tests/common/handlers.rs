use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fleetops_core::events::HandlerContext;
use fleetops_core::registry::EventHandler;

/// One observed handler invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub handler: String,
    pub operation_id: String,
    pub entity_id: String,
}

/// Shared invocation log for asserting execution order across handlers
pub type InvocationLog = Arc<Mutex<Vec<Invocation>>>;

pub fn invocation_log() -> InvocationLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Handler names from a log, in invocation order
pub fn handler_order(log: &InvocationLog) -> Vec<String> {
    log.lock().iter().map(|i| i.handler.clone()).collect()
}

/// Handler that records each invocation into a shared log and succeeds
pub struct RecordingHandler {
    id: String,
    log: InvocationLog,
}

impl RecordingHandler {
    pub fn new(id: &str, log: InvocationLog) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            log,
        })
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, ctx: &HandlerContext) -> anyhow::Result<()> {
        self.log.lock().push(Invocation {
            handler: self.id.clone(),
            operation_id: ctx.operation_id().to_string(),
            entity_id: ctx.entity_id().to_string(),
        });
        Ok(())
    }

    fn name(&self) -> &str {
        &self.id
    }
}

/// Handler that fails its first `failures` attempts with a numbered
/// message, then succeeds. Records attempts like [`RecordingHandler`].
pub struct FailingHandler {
    id: String,
    failures_remaining: AtomicU64,
    attempts: AtomicU64,
    log: InvocationLog,
}

impl FailingHandler {
    pub fn new(id: &str, failures: u64, log: InvocationLog) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            failures_remaining: AtomicU64::new(failures),
            attempts: AtomicU64::new(0),
            log,
        })
    }

    /// Handler that never succeeds
    pub fn always(id: &str, log: InvocationLog) -> Arc<Self> {
        Self::new(id, u64::MAX, log)
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventHandler for FailingHandler {
    async fn handle(&self, ctx: &HandlerContext) -> anyhow::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        self.log.lock().push(Invocation {
            handler: self.id.clone(),
            operation_id: ctx.operation_id().to_string(),
            entity_id: ctx.entity_id().to_string(),
        });
        if self.failures_remaining.load(Ordering::Relaxed) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::Relaxed);
            anyhow::bail!("{} attempt {} failed", self.id, attempt);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.id
    }
}

/// Handler that panics on every invocation
pub struct PanickingHandler {
    id: String,
    message: String,
}

impl PanickingHandler {
    pub fn new(id: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl EventHandler for PanickingHandler {
    async fn handle(&self, _ctx: &HandlerContext) -> anyhow::Result<()> {
        panic!("{}", self.message);
    }

    fn name(&self) -> &str {
        &self.id
    }
}
