//! In-memory event store over dashmap, for tests and embedded hosts.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::events::{BusinessEvent, EventStatus, NewBusinessEvent};
use crate::store::{EventMetric, EventOutcome, EventStore, MetricGranularity, MetricUpdate, StoreError};

type MetricKey = (String, MetricGranularity, String);

/// [`EventStore`] implementation holding everything in process memory.
///
/// Enforces the same lifecycle guards as the Postgres store, so dispatch
/// semantics are identical under test. Sharded maps tolerate concurrent
/// dispatches to different events without a global lock.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: DashMap<Uuid, BusinessEvent>,
    metrics: DashMap<MetricKey, EventMetric>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events ever created (nothing is deleted)
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn create_event(
        &self,
        new_event: NewBusinessEvent,
    ) -> Result<BusinessEvent, StoreError> {
        let event = BusinessEvent {
            id: Uuid::new_v4(),
            operation_id: new_event.operation_id,
            entity_type: new_event.entity_type,
            entity_id: new_event.entity_id,
            payload: new_event.payload,
            metadata: new_event.metadata,
            user_id: new_event.user_id,
            parent_event_id: new_event.parent_event_id,
            status: EventStatus::Pending,
            error: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        self.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn mark_processing(&self, event_id: Uuid) -> Result<(), StoreError> {
        let mut event = self
            .events
            .get_mut(&event_id)
            .ok_or(StoreError::EventNotFound(event_id))?;
        if event.status != EventStatus::Pending {
            return Err(StoreError::InvalidTransition {
                event_id,
                from: event.status,
                to: EventStatus::Processing,
            });
        }
        event.status = EventStatus::Processing;
        Ok(())
    }

    async fn finalize_event(
        &self,
        event_id: Uuid,
        outcome: EventOutcome,
    ) -> Result<(), StoreError> {
        let mut event = self
            .events
            .get_mut(&event_id)
            .ok_or(StoreError::EventNotFound(event_id))?;
        if !outcome.status.is_terminal() || event.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                event_id,
                from: event.status,
                to: outcome.status,
            });
        }
        event.status = outcome.status;
        event.error = outcome.error;
        if outcome.metadata.is_some() {
            event.metadata = outcome.metadata;
        }
        event.processed_at = Some(outcome.processed_at);
        Ok(())
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<BusinessEvent>, StoreError> {
        Ok(self.events.get(&event_id).map(|e| e.clone()))
    }

    async fn events_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<BusinessEvent>, StoreError> {
        let mut events: Vec<BusinessEvent> = self
            .events
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .map(|e| e.clone())
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    async fn child_events(&self, parent_event_id: Uuid) -> Result<Vec<BusinessEvent>, StoreError> {
        let mut events: Vec<BusinessEvent> = self
            .events
            .iter()
            .filter(|e| e.parent_event_id == Some(parent_event_id))
            .map(|e| e.clone())
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(events)
    }

    async fn record_metric(&self, update: MetricUpdate) -> Result<(), StoreError> {
        let key = (
            update.period.clone(),
            update.granularity,
            update.operation_id.clone(),
        );
        let mut metric = self.metrics.entry(key).or_insert_with(|| EventMetric {
            period: update.period.clone(),
            granularity: update.granularity,
            operation_id: update.operation_id.clone(),
            total_events: 0,
            success_count: 0,
            failure_count: 0,
            last_latency_ms: 0,
            updated_at: Utc::now(),
        });
        metric.total_events += 1;
        if update.success {
            metric.success_count += 1;
        } else {
            metric.failure_count += 1;
        }
        metric.last_latency_ms = update.latency_ms;
        metric.updated_at = Utc::now();
        Ok(())
    }

    async fn get_metric(
        &self,
        period: &str,
        granularity: MetricGranularity,
        operation_id: &str,
    ) -> Result<Option<EventMetric>, StoreError> {
        let key = (period.to_string(), granularity, operation_id.to_string());
        Ok(self.metrics.get(&key).map(|m| m.clone()))
    }
}
