//! Event store port and the typed aggregate repository built on it

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::event_sourcing::{DomainEvent, EventEnvelope, EventSourced};
use crate::identifiers::{TenantId, UserId};
use crate::ports::{DomainPort, HealthCheckable, PortError};

/// The serialized form of an event as held by an [`EventStore`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub tenant_id: TenantId,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub sequence_number: u64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub performing_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    pub fn from_envelope<E: DomainEvent>(envelope: &EventEnvelope<E>) -> Result<Self, PortError> {
        Ok(Self {
            tenant_id: envelope.tenant_id,
            aggregate_id: envelope.aggregate_id,
            aggregate_type: envelope.aggregate_type.clone(),
            sequence_number: envelope.sequence_number,
            event_type: envelope.event.event_type().to_string(),
            payload: serde_json::to_value(&envelope.event)?,
            performing_user_id: envelope.performing_user_id,
            created_at: envelope.created_at,
        })
    }

    pub fn into_envelope<E: DomainEvent>(self) -> Result<EventEnvelope<E>, PortError> {
        let event: E = serde_json::from_value(self.payload).map_err(|e| {
            PortError::transformation(format!(
                "cannot deserialize {} #{} ({}): {}",
                self.aggregate_type, self.sequence_number, self.event_type, e
            ))
        })?;
        Ok(EventEnvelope {
            tenant_id: self.tenant_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            sequence_number: self.sequence_number,
            performing_user_id: self.performing_user_id,
            created_at: self.created_at,
            event,
        })
    }
}

/// Append-only storage for aggregate event streams
///
/// Streams are partitioned by tenant. `append` must be atomic: either all
/// events are stored or none, and it fails with [`PortError::Conflict`]
/// when the stored stream length differs from `expected_version`.
#[async_trait]
pub trait EventStore: DomainPort + HealthCheckable {
    /// Loads a stream ordered by sequence number; empty when unknown
    async fn load(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
        aggregate_id: Uuid,
    ) -> Result<Vec<StoredEvent>, PortError>;

    /// Appends events at `expected_version`
    async fn append(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
        aggregate_id: Uuid,
        expected_version: u64,
        events: Vec<StoredEvent>,
    ) -> Result<(), PortError>;
}

/// Loads and saves one aggregate type through an [`EventStore`]
pub struct AggregateRepository<A> {
    store: Arc<dyn EventStore>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> Clone for AggregateRepository<A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _aggregate: PhantomData,
        }
    }
}

impl<A: EventSourced> AggregateRepository<A> {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            _aggregate: PhantomData,
        }
    }

    /// Replays the aggregate, returning `None` when no events exist
    pub async fn find(&self, tenant_id: TenantId, aggregate_id: Uuid) -> Result<Option<A>, PortError> {
        let stored = self
            .store
            .load(tenant_id, A::AGGREGATE_TYPE, aggregate_id)
            .await?;
        if stored.is_empty() {
            return Ok(None);
        }

        let history = stored
            .into_iter()
            .map(StoredEvent::into_envelope::<A::Event>)
            .collect::<Result<Vec<_>, _>>()?;

        let aggregate = A::replay(history).map_err(|e| {
            PortError::internal(format!(
                "replay of {} {} failed: {}",
                A::AGGREGATE_TYPE,
                aggregate_id,
                e
            ))
        })?;
        Ok(Some(aggregate))
    }

    /// Replays the aggregate or fails with `NotFound`
    pub async fn get(&self, tenant_id: TenantId, aggregate_id: Uuid) -> Result<A, PortError> {
        self.find(tenant_id, aggregate_id)
            .await?
            .ok_or_else(|| PortError::not_found(A::AGGREGATE_TYPE, aggregate_id))
    }

    /// Appends uncommitted events; returns how many were written
    pub async fn save(&self, aggregate: &mut A) -> Result<usize, PortError> {
        if !aggregate.stream().has_uncommitted() {
            return Ok(0);
        }

        let expected_version = aggregate.persisted_version();
        let events = aggregate
            .stream()
            .uncommitted()
            .iter()
            .map(StoredEvent::from_envelope)
            .collect::<Result<Vec<_>, _>>()?;
        let count = events.len();

        self.store
            .append(
                aggregate.tenant_id(),
                A::AGGREGATE_TYPE,
                aggregate.aggregate_id(),
                expected_version,
                events,
            )
            .await?;

        aggregate.stream_mut().commit();
        debug!(
            aggregate_type = A::AGGREGATE_TYPE,
            aggregate_id = %aggregate.aggregate_id(),
            version = aggregate.version(),
            count,
            "Appended events"
        );
        Ok(count)
    }
}
