//! Built-in metrics aggregation handler.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use crate::events::HandlerContext;
use crate::registry::EventHandler;
use crate::store::{EventStore, MetricGranularity, MetricUpdate};

/// Name the aggregator registers and logs under
pub const METRICS_HANDLER_NAME: &str = "event_metrics";

/// Universal handler maintaining hourly and daily counters per operation.
///
/// Registered last by the bus builder, at
/// [`crate::constants::priorities::METRICS_HANDLER_PRIORITY`], so the
/// failure list it reads covers the whole chain: an event counts as a
/// success only when no earlier handler recorded an unrecovered failure.
/// Store errors are logged and swallowed; metrics can never fail a
/// business event.
pub struct MetricsHandler {
    store: Arc<dyn EventStore>,
}

impl MetricsHandler {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for MetricsHandler {
    async fn handle(&self, ctx: &HandlerContext) -> anyhow::Result<()> {
        let now = Utc::now();
        let success = !ctx.has_failures();
        let latency_ms = (now - ctx.event().created_at).num_milliseconds().max(0);

        for granularity in [MetricGranularity::Hour, MetricGranularity::Day] {
            let update = MetricUpdate {
                period: granularity.bucket_label(now),
                granularity,
                operation_id: ctx.operation_id().to_string(),
                success,
                latency_ms,
            };
            if let Err(e) = self.store.record_metric(update).await {
                warn!(
                    event_id = %ctx.event_id(),
                    operation_id = ctx.operation_id(),
                    granularity = %granularity,
                    error = %e,
                    "Metric update failed; bucket will undercount"
                );
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        METRICS_HANDLER_NAME
    }
}
