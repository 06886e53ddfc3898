//! In-memory adapters for the kernel ports
//!
//! Used by unit tests across the workspace and by the API host when it runs
//! with the `memory` storage backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::event_store::{EventStore, StoredEvent};
use crate::identifiers::TenantId;
use crate::locking::{AggregateLockGuard, AggregateLockService, LockKey};
use crate::ports::{DomainPort, HealthCheckResult, HealthCheckable, PortError};

type StreamKey = (TenantId, String, Uuid);

/// Event store holding every stream in a map
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events across all streams
    pub async fn event_count(&self) -> usize {
        self.streams.read().await.values().map(Vec::len).sum()
    }
}

impl DomainPort for InMemoryEventStore {}

#[async_trait]
impl HealthCheckable for InMemoryEventStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("memory-event-store")
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn load(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
        aggregate_id: Uuid,
    ) -> Result<Vec<StoredEvent>, PortError> {
        let key = (tenant_id, aggregate_type.to_string(), aggregate_id);
        Ok(self.streams.read().await.get(&key).cloned().unwrap_or_default())
    }

    async fn append(
        &self,
        tenant_id: TenantId,
        aggregate_type: &str,
        aggregate_id: Uuid,
        expected_version: u64,
        events: Vec<StoredEvent>,
    ) -> Result<(), PortError> {
        let key = (tenant_id, aggregate_type.to_string(), aggregate_id);
        let mut streams = self.streams.write().await;
        let stream = streams.entry(key).or_default();

        let current = stream.len() as u64;
        if current != expected_version {
            return Err(PortError::conflict(format!(
                "{} {} is at version {}, expected {}",
                aggregate_type, aggregate_id, current, expected_version
            )));
        }

        for (offset, event) in events.iter().enumerate() {
            let expected_sequence = current + offset as u64;
            if event.sequence_number != expected_sequence {
                return Err(PortError::validation(format!(
                    "event sequence {} does not follow {}",
                    event.sequence_number, expected_sequence
                )));
            }
        }

        stream.extend(events);
        Ok(())
    }
}

/// Process-local aggregate locks built on tokio mutexes
#[derive(Debug, Default)]
pub struct InMemoryAggregateLockService {
    locks: StdMutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl InMemoryAggregateLockService {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, key: &LockKey) -> Result<Arc<Mutex<()>>, PortError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| PortError::internal("lock table poisoned"))?;
        // Drop entries nobody holds or waits on
        locks.retain(|_, m| Arc::strong_count(m) > 1);
        Ok(Arc::clone(locks.entry(key.clone()).or_default()))
    }
}

impl DomainPort for InMemoryAggregateLockService {}

#[async_trait]
impl AggregateLockService for InMemoryAggregateLockService {
    async fn acquire(&self, key: LockKey, timeout: Duration) -> Result<AggregateLockGuard, PortError> {
        let mutex = self.mutex_for(&key)?;
        let guard = tokio::time::timeout(timeout, mutex.lock_owned())
            .await
            .map_err(|_| PortError::Timeout {
                operation: format!("lock {}", key),
                duration_ms: timeout.as_millis() as u64,
            })?;
        Ok(AggregateLockGuard::new(key, Box::new(guard)))
    }
}
