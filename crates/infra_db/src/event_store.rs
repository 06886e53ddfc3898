//! PostgreSQL event store
//!
//! One row per event in `events`, keyed by
//! `(tenant_id, aggregate_type, aggregate_id, sequence_number)`. The
//! primary key is the last line of defence for optimistic concurrency: if
//! two writers pass the version check at the same moment, the second
//! insert violates it and the append fails with a conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use core_kernel::{
    DomainPort, EventStore, HealthCheckResult, HealthCheckable, PortError, StoredEvent, TenantId, UserId,
};

use crate::error::port_error;
use crate::pool::probe;

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    tenant_id: Uuid,
    aggregate_id: Uuid,
    aggregate_type: String,
    sequence_number: i64,
    event_type: String,
    payload: serde_json::Value,
    performing_user_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for StoredEvent {
    type Error = PortError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let sequence_number = u64::try_from(row.sequence_number)
            .map_err(|_| PortError::transformation(format!("negative sequence number {}", row.sequence_number)))?;
        Ok(StoredEvent {
            tenant_id: TenantId::from_uuid(row.tenant_id),
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            sequence_number,
            event_type: row.event_type,
            payload: row.payload,
            performing_user_id: row.performing_user_id.map(UserId::from_uuid),
            created_at: row.created_at,
        })
    }
}

fn to_db_sequence(sequence: u64) -> Result<i64, PortError> {
    i64::try_from(sequence).map_err(|_| PortError::validation(format!("sequence number {} out of range", sequence)))
}

/// Event store backed by the `events` table
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PostgresEventStore {}

#[async_trait]
impl HealthCheckable for PostgresEventStore {
    async fn health_check(&self) -> HealthCheckResult {
        probe(&self.pool, "postgres-event-store").await
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn load(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
        aggregate_id: Uuid,
    ) -> Result<Vec<StoredEvent>, PortError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT tenant_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, payload, performing_user_id, created_at
            FROM events
            WHERE tenant_id = $1 AND aggregate_type = $2 AND aggregate_id = $3
            ORDER BY sequence_number
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(aggregate_type)
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;

        debug!(count = rows.len(), "Loaded event stream");
        rows.into_iter().map(StoredEvent::try_from).collect()
    }

    #[instrument(skip(self, events), fields(tenant_id = %tenant_id, count = events.len()))]
    async fn append(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
        aggregate_id: Uuid,
        expected_version: u64,
        events: Vec<StoredEvent>,
    ) -> Result<(), PortError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(port_error)?;

        let current: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM events
            WHERE tenant_id = $1 AND aggregate_type = $2 AND aggregate_id = $3
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(aggregate_type)
        .bind(aggregate_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(port_error)?;

        if current != to_db_sequence(expected_version)? {
            return Err(PortError::conflict(format!(
                "{} {} is at version {}, expected {}",
                aggregate_type, aggregate_id, current, expected_version
            )));
        }

        for (offset, event) in events.iter().enumerate() {
            let expected_sequence = expected_version + offset as u64;
            if event.sequence_number != expected_sequence {
                return Err(PortError::validation(format!(
                    "event sequence {} does not follow {}",
                    event.sequence_number, expected_sequence
                )));
            }

            sqlx::query(
                r#"
                INSERT INTO events (tenant_id, aggregate_type, aggregate_id, sequence_number,
                                    event_type, payload, performing_user_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(tenant_id.as_uuid())
            .bind(aggregate_type)
            .bind(aggregate_id)
            .bind(to_db_sequence(event.sequence_number)?)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.performing_user_id.map(|u| *u.as_uuid()))
            .bind(event.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                let error = port_error(e);
                if error.is_conflict() {
                    warn!(aggregate_id = %aggregate_id, "Concurrent append lost the race");
                }
                error
            })?;
        }

        tx.commit().await.map_err(port_error)?;
        debug!(version = expected_version + events.len() as u64, "Appended events");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(sequence_number: i64) -> EventRow {
        EventRow {
            tenant_id: Uuid::new_v4(),
            aggregate_id: Uuid::new_v4(),
            aggregate_type: "quote".to_string(),
            sequence_number,
            event_type: "QuoteCreated".to_string(),
            payload: serde_json::json!({"QuoteCreated": {}}),
            performing_user_id: Some(Uuid::new_v4()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_converts_to_stored_event() {
        let source = row(3);
        let performer = source.performing_user_id;
        let event = StoredEvent::try_from(source).unwrap();

        assert_eq!(event.sequence_number, 3);
        assert_eq!(event.aggregate_type, "quote");
        assert_eq!(event.performing_user_id.map(|u| *u.as_uuid()), performer);
    }

    #[test]
    fn test_negative_sequence_is_rejected() {
        assert!(matches!(
            StoredEvent::try_from(row(-1)),
            Err(PortError::Transformation { .. })
        ));
    }

    #[test]
    fn test_sequence_beyond_bigint_is_rejected() {
        assert!(to_db_sequence(u64::MAX).is_err());
        assert_eq!(to_db_sequence(7).unwrap(), 7);
    }
}
