use async_trait::async_trait;
use sqlx::Error as SqlxError;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use fleetops_core::events::{BusinessEvent, NewBusinessEvent};
use fleetops_core::store::{
    EventMetric, EventOutcome, EventStore, MemoryEventStore, MetricGranularity, MetricUpdate,
    StoreError,
};

/// In-memory store with switchable fault injection, for exercising the
/// engine's behavior when persistence misbehaves mid-flight.
#[derive(Debug, Default)]
pub struct UnreliableStore {
    inner: MemoryEventStore,
    fail_finalize: AtomicBool,
    fail_record_metric: AtomicBool,
}

impl UnreliableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_finalize(&self, on: bool) {
        self.fail_finalize.store(on, Ordering::Relaxed);
    }

    pub fn fail_record_metric(&self, on: bool) {
        self.fail_record_metric.store(on, Ordering::Relaxed);
    }

    pub fn inner(&self) -> &MemoryEventStore {
        &self.inner
    }

    fn injected_error() -> StoreError {
        StoreError::Database(SqlxError::PoolClosed)
    }
}

#[async_trait]
impl EventStore for UnreliableStore {
    async fn create_event(
        &self,
        new_event: NewBusinessEvent,
    ) -> Result<BusinessEvent, StoreError> {
        self.inner.create_event(new_event).await
    }

    async fn mark_processing(&self, event_id: Uuid) -> Result<(), StoreError> {
        self.inner.mark_processing(event_id).await
    }

    async fn finalize_event(
        &self,
        event_id: Uuid,
        outcome: EventOutcome,
    ) -> Result<(), StoreError> {
        if self.fail_finalize.load(Ordering::Relaxed) {
            return Err(Self::injected_error());
        }
        self.inner.finalize_event(event_id, outcome).await
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<BusinessEvent>, StoreError> {
        self.inner.get_event(event_id).await
    }

    async fn events_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<BusinessEvent>, StoreError> {
        self.inner.events_for_entity(entity_type, entity_id).await
    }

    async fn child_events(&self, parent_event_id: Uuid) -> Result<Vec<BusinessEvent>, StoreError> {
        self.inner.child_events(parent_event_id).await
    }

    async fn record_metric(&self, update: MetricUpdate) -> Result<(), StoreError> {
        if self.fail_record_metric.load(Ordering::Relaxed) {
            return Err(Self::injected_error());
        }
        self.inner.record_metric(update).await
    }

    async fn get_metric(
        &self,
        period: &str,
        granularity: MetricGranularity,
        operation_id: &str,
    ) -> Result<Option<EventMetric>, StoreError> {
        self.inner.get_metric(period, granularity, operation_id).await
    }
}
