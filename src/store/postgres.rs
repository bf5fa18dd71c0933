//! Postgres-backed event store over sqlx.
//!
//! Uses the runtime query API with guarded UPDATEs: lifecycle transitions
//! carry their precondition in the WHERE clause, so two dispatchers racing
//! on one event cannot both win, and `rows_affected == 0` distinguishes a
//! lost race from a missing row. Metric rows are maintained with a single
//! `INSERT .. ON CONFLICT DO UPDATE` per observation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::events::{BusinessEvent, EventStatus, NewBusinessEvent};
use crate::store::{
    EventMetric, EventOutcome, EventStore, MetricGranularity, MetricUpdate, StoreError,
};

/// Embedded schema migrations, applied by [`PgEventStore::connect`]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const EVENT_COLUMNS: &str = "id, operation_id, entity_type, entity_id, payload, metadata, \
     user_id, parent_event_id, status, error, created_at, processed_at";

/// [`EventStore`] implementation over a Postgres pool
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Wrap an existing pool; the caller is responsible for migrations
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and apply pending migrations
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Map a zero-row guarded update to the right error
    async fn transition_conflict(&self, event_id: Uuid, to: EventStatus) -> StoreError {
        match self.get_event(event_id).await {
            Ok(Some(event)) => StoreError::InvalidTransition {
                event_id,
                from: event.status,
                to,
            },
            Ok(None) => StoreError::EventNotFound(event_id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
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

        sqlx::query(
            r#"
            INSERT INTO business_events
                (id, operation_id, entity_type, entity_id, payload, metadata,
                 user_id, parent_event_id, status, error, created_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL, $10, NULL)
            "#,
        )
        .bind(event.id)
        .bind(&event.operation_id)
        .bind(&event.entity_type)
        .bind(&event.entity_id)
        .bind(&event.payload)
        .bind(&event.metadata)
        .bind(&event.user_id)
        .bind(event.parent_event_id)
        .bind(event.status.as_str())
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(event)
    }

    async fn mark_processing(&self, event_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE business_events
            SET status = 'processing'
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .transition_conflict(event_id, EventStatus::Processing)
                .await);
        }
        Ok(())
    }

    async fn finalize_event(
        &self,
        event_id: Uuid,
        outcome: EventOutcome,
    ) -> Result<(), StoreError> {
        if !outcome.status.is_terminal() {
            return Err(self.transition_conflict(event_id, outcome.status).await);
        }

        let error_json = outcome.error.as_ref().map(serde_json::to_value).transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE business_events
            SET status = $2,
                error = $3,
                metadata = COALESCE($4, metadata),
                processed_at = $5
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(event_id)
        .bind(outcome.status.as_str())
        .bind(&error_json)
        .bind(&outcome.metadata)
        .bind(outcome.processed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_conflict(event_id, outcome.status).await);
        }
        Ok(())
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<BusinessEvent>, StoreError> {
        let event = sqlx::query_as::<_, BusinessEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM business_events WHERE id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    async fn events_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<BusinessEvent>, StoreError> {
        let events = sqlx::query_as::<_, BusinessEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM business_events \
             WHERE entity_type = $1 AND entity_id = $2 \
             ORDER BY created_at DESC"
        ))
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn child_events(&self, parent_event_id: Uuid) -> Result<Vec<BusinessEvent>, StoreError> {
        let events = sqlx::query_as::<_, BusinessEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM business_events \
             WHERE parent_event_id = $1 \
             ORDER BY created_at ASC"
        ))
        .bind(parent_event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn record_metric(&self, update: MetricUpdate) -> Result<(), StoreError> {
        let (success_delta, failure_delta) = if update.success { (1i64, 0i64) } else { (0, 1) };

        sqlx::query(
            r#"
            INSERT INTO event_metrics
                (period, granularity, operation_id, total_events,
                 success_count, failure_count, last_latency_ms, updated_at)
            VALUES ($1, $2, $3, 1, $4, $5, $6, $7)
            ON CONFLICT (period, granularity, operation_id) DO UPDATE
            SET total_events = event_metrics.total_events + 1,
                success_count = event_metrics.success_count + EXCLUDED.success_count,
                failure_count = event_metrics.failure_count + EXCLUDED.failure_count,
                last_latency_ms = EXCLUDED.last_latency_ms,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&update.period)
        .bind(update.granularity.as_str())
        .bind(&update.operation_id)
        .bind(success_delta)
        .bind(failure_delta)
        .bind(update.latency_ms)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_metric(
        &self,
        period: &str,
        granularity: MetricGranularity,
        operation_id: &str,
    ) -> Result<Option<EventMetric>, StoreError> {
        let metric = sqlx::query_as::<_, EventMetric>(
            r#"
            SELECT period, granularity, operation_id, total_events,
                   success_count, failure_count, last_latency_ms, updated_at
            FROM event_metrics
            WHERE period = $1 AND granularity = $2 AND operation_id = $3
            "#,
        )
        .bind(period)
        .bind(granularity.as_str())
        .bind(operation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(metric)
    }
}

impl<'r> sqlx::FromRow<'r, PgRow> for BusinessEvent {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<EventStatus>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: e.into(),
            })?;

        let error: Option<serde_json::Value> = row.try_get("error")?;
        let error = error
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "error".to_string(),
                source: Box::new(e),
            })?;

        Ok(BusinessEvent {
            id: row.try_get("id")?,
            operation_id: row.try_get("operation_id")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            payload: row.try_get("payload")?,
            metadata: row.try_get("metadata")?,
            user_id: row.try_get("user_id")?,
            parent_event_id: row.try_get("parent_event_id")?,
            status,
            error,
            created_at: row.try_get("created_at")?,
            processed_at: row.try_get("processed_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, PgRow> for EventMetric {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        let granularity: String = row.try_get("granularity")?;
        let granularity =
            granularity
                .parse::<MetricGranularity>()
                .map_err(|e| sqlx::Error::ColumnDecode {
                    index: "granularity".to_string(),
                    source: e.into(),
                })?;

        Ok(EventMetric {
            period: row.try_get("period")?,
            granularity,
            operation_id: row.try_get("operation_id")?,
            total_events: row.try_get("total_events")?,
            success_count: row.try_get("success_count")?,
            failure_count: row.try_get("failure_count")?,
            last_latency_ms: row.try_get("last_latency_ms")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
