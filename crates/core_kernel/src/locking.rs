//! Aggregate locking
//!
//! Commands that load, mutate and save an aggregate hold a lock on it for
//! the duration so that concurrent commands serialize instead of failing
//! on the optimistic concurrency check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::identifiers::TenantId;
use crate::ports::{DomainPort, PortError};

/// Identifies one aggregate instance for locking purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub tenant_id: TenantId,
    pub aggregate_type: &'static str,
    pub aggregate_id: Uuid,
}

impl LockKey {
    pub fn new(tenant_id: TenantId, aggregate_type: &'static str, aggregate_id: Uuid) -> Self {
        Self {
            tenant_id,
            aggregate_type,
            aggregate_id,
        }
    }

    /// Stable 64-bit key, identical across processes, for database advisory locks
    pub fn as_i64(&self) -> i64 {
        let digest = Sha256::new()
            .chain_update(self.tenant_id.as_uuid().as_bytes())
            .chain_update(self.aggregate_type.as_bytes())
            .chain_update(self.aggregate_id.as_bytes())
            .finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        i64::from_be_bytes(head)
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.aggregate_type, self.aggregate_id)
    }
}

/// Held lock; released when dropped
pub struct AggregateLockGuard {
    key: LockKey,
    acquired_at: DateTime<Utc>,
    _handle: Box<dyn Send>,
}

impl AggregateLockGuard {
    /// Wraps an adapter-specific handle whose drop releases the lock
    pub fn new(key: LockKey, handle: Box<dyn Send>) -> Self {
        Self {
            key,
            acquired_at: Utc::now(),
            _handle: handle,
        }
    }

    pub fn key(&self) -> &LockKey {
        &self.key
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Releases the lock before the guard goes out of scope
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for AggregateLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateLockGuard")
            .field("key", &self.key)
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

/// Port for acquiring exclusive aggregate locks
#[async_trait]
pub trait AggregateLockService: DomainPort {
    /// Waits up to `timeout` for the lock; fails with `PortError::Timeout`
    async fn acquire(&self, key: LockKey, timeout: Duration) -> Result<AggregateLockGuard, PortError>;
}
