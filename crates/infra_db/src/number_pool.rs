//! PostgreSQL number pool
//!
//! Numbers are handed out in load order. Concurrent consumers skip rows
//! another transaction has already locked, so two binds never receive the
//! same number and neither waits on the other.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use core_kernel::{DomainPort, HealthCheckResult, HealthCheckable, PortError};
use domain_quote::{NumberPool, NumberPoolKey};

use crate::error::port_error;
use crate::pool::probe;

#[derive(Debug, Clone)]
pub struct PostgresNumberPool {
    pool: PgPool,
}

impl PostgresNumberPool {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PostgresNumberPool {}

#[async_trait]
impl HealthCheckable for PostgresNumberPool {
    async fn health_check(&self) -> HealthCheckResult {
        probe(&self.pool, "postgres-number-pool").await
    }
}

#[async_trait]
impl NumberPool for PostgresNumberPool {
    #[instrument(skip(self), fields(kind = %key.kind))]
    async fn consume(&self, key: NumberPoolKey) -> Result<String, PortError> {
        let number: Option<String> = sqlx::query_scalar(
            r#"
            WITH next AS (
                SELECT tenant_id, product_id, environment, kind, number
                FROM number_pool
                WHERE tenant_id = $1 AND product_id = $2 AND environment = $3 AND kind = $4
                  AND consumed_at IS NULL
                ORDER BY position
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE number_pool p
            SET consumed_at = now()
            FROM next
            WHERE p.tenant_id = next.tenant_id AND p.product_id = next.product_id
              AND p.environment = next.environment AND p.kind = next.kind AND p.number = next.number
            RETURNING p.number
            "#,
        )
        .bind(key.tenant_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .bind(key.environment.as_str())
        .bind(key.kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;

        match number {
            Some(number) => {
                debug!(number = %number, "Consumed number");
                Ok(number)
            }
            None => Err(PortError::not_found(
                format!("{} number", key.kind),
                format!("{}/{}", key.product_id, key.environment),
            )),
        }
    }

    #[instrument(skip(self, numbers), fields(kind = %key.kind, offered = numbers.len()))]
    async fn load(&self, key: NumberPoolKey, numbers: Vec<String>) -> Result<usize, PortError> {
        let numbers: Vec<String> = numbers
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();

        // unnest WITH ORDINALITY keeps the caller's order in `position`
        let result = sqlx::query(
            r#"
            INSERT INTO number_pool (tenant_id, product_id, environment, kind, number)
            SELECT $1, $2, $3, $4, n.number
            FROM unnest($5::text[]) WITH ORDINALITY AS n(number, ord)
            ORDER BY n.ord
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(key.tenant_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .bind(key.environment.as_str())
        .bind(key.kind.as_str())
        .bind(&numbers)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;

        let added = result.rows_affected() as usize;
        info!(added, "Loaded numbers");
        Ok(added)
    }

    async fn available(&self, key: NumberPoolKey) -> Result<usize, PortError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM number_pool
            WHERE tenant_id = $1 AND product_id = $2 AND environment = $3 AND kind = $4
              AND consumed_at IS NULL
            "#,
        )
        .bind(key.tenant_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .bind(key.environment.as_str())
        .bind(key.kind.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(count.max(0) as usize)
    }

    /// Clears `consumed_at`; the row keeps its position, so it is next in line
    #[instrument(skip(self), fields(kind = %key.kind))]
    async fn release(&self, key: NumberPoolKey, number: &str) -> Result<(), PortError> {
        let result = sqlx::query(
            r#"
            UPDATE number_pool SET consumed_at = NULL
            WHERE tenant_id = $1 AND product_id = $2 AND environment = $3 AND kind = $4
              AND number = $5 AND consumed_at IS NOT NULL
            "#,
        )
        .bind(key.tenant_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .bind(key.environment.as_str())
        .bind(key.kind.as_str())
        .bind(number)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;

        if result.rows_affected() > 0 {
            info!(number = %number, "Released number");
        }
        Ok(())
    }
}
