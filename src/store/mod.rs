//! # Event Store
//!
//! Persistence seam for the dispatch engine: events are appended once, then
//! mutated in place through a guarded status lifecycle, and metric rows are
//! maintained through windowed counter upserts.
//!
//! Two implementations ship with the crate: [`MemoryEventStore`] (dashmap,
//! for tests and embedded use) and [`PgEventStore`] (sqlx/Postgres, the
//! production store).

pub mod memory;
pub mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::events::{BusinessEvent, EventStatus, HandlerFailure, NewBusinessEvent};

/// Errors from event and metric persistence
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    /// The lifecycle guard rejected a status change. Terminal states are
    /// final and `Processing` can only follow `Pending`.
    #[error("Invalid status transition for event {event_id}: {from} -> {to}")]
    InvalidTransition {
        event_id: Uuid,
        from: EventStatus,
        to: EventStatus,
    },
}

/// Terminal outcome of one dispatch run
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub status: EventStatus,
    /// Failure list when the run failed; `None` on success
    pub error: Option<Vec<HandlerFailure>>,
    /// Metadata the handler chain attached, if any
    pub metadata: Option<Value>,
    pub processed_at: DateTime<Utc>,
}

impl EventOutcome {
    /// Successful outcome with nothing recorded (e.g. zero matching handlers)
    pub fn completed() -> Self {
        Self {
            status: EventStatus::Completed,
            error: None,
            metadata: None,
            processed_at: Utc::now(),
        }
    }

    /// Derive the outcome from a chain's failure list: `Failed` iff any
    /// handler failure went unrecovered
    pub fn from_failures(failures: Vec<HandlerFailure>, metadata: Option<Value>) -> Self {
        let status = if failures.is_empty() {
            EventStatus::Completed
        } else {
            EventStatus::Failed
        };
        Self {
            status,
            error: if failures.is_empty() {
                None
            } else {
                Some(failures)
            },
            metadata,
            processed_at: Utc::now(),
        }
    }
}

/// Metric aggregation window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricGranularity {
    Hour,
    Day,
}

impl MetricGranularity {
    /// Storage representation, matching the serde encoding
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    /// Wall-clock bucket label for a timestamp: `2025-03-14-09` for hours,
    /// `2025-03-14` for days
    pub fn bucket_label(&self, at: DateTime<Utc>) -> String {
        match self {
            Self::Hour => at.format("%Y-%m-%d-%H").to_string(),
            Self::Day => at.format("%Y-%m-%d").to_string(),
        }
    }
}

impl fmt::Display for MetricGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MetricGranularity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            _ => Err(format!("Invalid metric granularity: {s}")),
        }
    }
}

/// One aggregated counter row, keyed by `(period, granularity, operation_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetric {
    pub period: String,
    pub granularity: MetricGranularity,
    pub operation_id: String,
    pub total_events: i64,
    pub success_count: i64,
    pub failure_count: i64,
    /// Latency of the most recent event in the bucket, creation to metrics
    pub last_latency_ms: i64,
    pub updated_at: DateTime<Utc>,
}

/// Counter delta applied by one metrics observation
#[derive(Debug, Clone)]
pub struct MetricUpdate {
    pub period: String,
    pub granularity: MetricGranularity,
    pub operation_id: String,
    pub success: bool,
    pub latency_ms: i64,
}

/// Persistence operations the dispatcher depends on.
///
/// Events are created in `Pending`, moved to `Processing` while their
/// handler chain runs, and finalized exactly once. Implementations enforce
/// the lifecycle and reject anything else with
/// [`StoreError::InvalidTransition`]. Nothing is ever deleted.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new event; the store assigns id, `Pending` status and
    /// `created_at`
    async fn create_event(&self, new_event: NewBusinessEvent)
        -> Result<BusinessEvent, StoreError>;

    /// Guarded transition `Pending -> Processing`
    async fn mark_processing(&self, event_id: Uuid) -> Result<(), StoreError>;

    /// Guarded transition to a terminal status, persisting the failure
    /// list, chain metadata and `processed_at` in the same write
    async fn finalize_event(&self, event_id: Uuid, outcome: EventOutcome)
        -> Result<(), StoreError>;

    async fn get_event(&self, event_id: Uuid) -> Result<Option<BusinessEvent>, StoreError>;

    /// Events referencing an entity, newest first
    async fn events_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<BusinessEvent>, StoreError>;

    /// Direct causal children of an event, oldest first
    async fn child_events(&self, parent_event_id: Uuid) -> Result<Vec<BusinessEvent>, StoreError>;

    /// Apply a windowed counter upsert: first occurrence of the key creates
    /// the row, later ones increment it
    async fn record_metric(&self, update: MetricUpdate) -> Result<(), StoreError>;

    async fn get_metric(
        &self,
        period: &str,
        granularity: MetricGranularity,
        operation_id: &str,
    ) -> Result<Option<EventMetric>, StoreError>;
}
