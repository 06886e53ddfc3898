//! Aggregate locks on PostgreSQL session advisory locks
//!
//! Each held lock pins one pooled connection, because advisory locks belong
//! to the session that took them. Releasing unlocks on that connection and
//! returns it to the pool; if unlocking fails the connection is closed,
//! which ends the session and frees the lock server-side.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use core_kernel::{AggregateLockGuard, AggregateLockService, DomainPort, LockKey, PortError};

use crate::error::port_error;

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(20);
const MAX_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Lock service using `pg_try_advisory_lock`
#[derive(Debug, Clone)]
pub struct PostgresAggregateLockService {
    pool: PgPool,
}

impl PostgresAggregateLockService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PostgresAggregateLockService {}

#[async_trait]
impl AggregateLockService for PostgresAggregateLockService {
    async fn acquire(&self, key: LockKey, timeout: Duration) -> Result<AggregateLockGuard, PortError> {
        let deadline = Instant::now() + timeout;
        let lock_id = key.as_i64();
        let mut conn = tokio::time::timeout(timeout, self.pool.acquire())
            .await
            .map_err(|_| lock_timeout(&key, timeout))?
            .map_err(port_error)?;

        let mut delay = INITIAL_RETRY_DELAY;
        loop {
            let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
                .bind(lock_id)
                .fetch_one(&mut *conn)
                .await
                .map_err(port_error)?;

            if locked {
                debug!(key = %key, "Acquired advisory lock");
                let handle = AdvisoryLockHandle {
                    conn: Some(conn),
                    lock_id,
                };
                return Ok(AggregateLockGuard::new(key, Box::new(handle)));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(lock_timeout(&key, timeout));
            }
            sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(MAX_RETRY_DELAY);
        }
    }
}

fn lock_timeout(key: &LockKey, timeout: Duration) -> PortError {
    PortError::Timeout {
        operation: format!("lock {}", key),
        duration_ms: timeout.as_millis() as u64,
    }
}

/// Owns the session holding the advisory lock
struct AdvisoryLockHandle {
    conn: Option<PoolConnection<Postgres>>,
    lock_id: i64,
}

impl Drop for AdvisoryLockHandle {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let lock_id = self.lock_id;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let unlocked = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
                        .bind(lock_id)
                        .fetch_one(&mut *conn)
                        .await;
                    match unlocked {
                        Ok(true) => {}
                        Ok(false) => warn!(lock_id, "Advisory lock was not held at release"),
                        Err(e) => {
                            warn!(lock_id, error = %e, "Advisory unlock failed, closing session");
                            let _ = conn.close().await;
                        }
                    }
                });
            }
            // No runtime to unlock on; closing the session frees the lock
            Err(_) => drop(conn.detach()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::TenantId;
    use uuid::Uuid;

    #[test]
    fn test_timeout_error_names_the_aggregate() {
        let key = LockKey::new(TenantId::new(), "quote", Uuid::new_v4());
        let error = lock_timeout(&key, Duration::from_millis(1500));

        assert!(error.is_transient());
        match error {
            PortError::Timeout { operation, duration_ms } => {
                assert!(operation.contains("quote"));
                assert_eq!(duration_ms, 1500);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
