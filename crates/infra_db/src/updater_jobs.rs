//! PostgreSQL storage for updater jobs and imported reference data

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use core_kernel::{DomainPort, PortError, UpdaterJobId};
use infra_updater::{DataSetIndexer, DataSetKind, DataSetSink, RowBatch, UpdaterJob, UpdaterJobStore};

use crate::error::port_error;

fn decode_jobs(documents: Vec<serde_json::Value>) -> Result<Vec<UpdaterJob>, PortError> {
    documents
        .into_iter()
        .map(|d| serde_json::from_value(d).map_err(PortError::from))
        .collect()
}

fn to_db_revision(revision: u64) -> Result<i64, PortError> {
    i64::try_from(revision).map_err(|_| PortError::validation(format!("revision {} out of range", revision)))
}

/// Jobs are stored whole as JSONB with state columns for filtering
#[derive(Debug, Clone)]
pub struct PostgresUpdaterJobStore {
    pool: PgPool,
}

impl PostgresUpdaterJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PostgresUpdaterJobStore {}

#[async_trait]
impl UpdaterJobStore for PostgresUpdaterJobStore {
    async fn insert(&self, job: &UpdaterJob) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO updater_jobs (job_id, data_set, state, is_active, revision, created_at, updated_at, document)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.data_set.as_str())
        .bind(job.state.as_str())
        .bind(job.state.is_active())
        .bind(to_db_revision(job.revision)?)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(serde_json::to_value(job)?)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(())
    }

    async fn update(&self, job: &mut UpdaterJob) -> Result<(), PortError> {
        let mut next = job.clone();
        next.revision += 1;

        let result = sqlx::query(
            r#"
            UPDATE updater_jobs
            SET state = $2, is_active = $3, updated_at = $4, document = $5, revision = $6
            WHERE job_id = $1 AND revision = $7
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(next.state.as_str())
        .bind(next.state.is_active())
        .bind(next.updated_at)
        .bind(serde_json::to_value(&next)?)
        .bind(to_db_revision(next.revision)?)
        .bind(to_db_revision(job.revision)?)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;

        if result.rows_affected() == 0 {
            return match self.get(job.id).await? {
                Some(stored) => Err(PortError::conflict(format!(
                    "updater job {} is at revision {}, not {}",
                    job.id, stored.revision, job.revision
                ))),
                None => Err(PortError::not_found("updater job", job.id)),
            };
        }
        job.revision = next.revision;
        Ok(())
    }

    async fn get(&self, id: UpdaterJobId) -> Result<Option<UpdaterJob>, PortError> {
        let document: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT document FROM updater_jobs WHERE job_id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(port_error)?;
        Ok(document.map(serde_json::from_value).transpose()?)
    }

    async fn list(&self, data_set: Option<DataSetKind>) -> Result<Vec<UpdaterJob>, PortError> {
        let documents = sqlx::query_scalar(
            r#"
            SELECT document FROM updater_jobs
            WHERE ($1::text IS NULL OR data_set = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(data_set.map(|d| d.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;
        decode_jobs(documents)
    }

    async fn list_active(&self) -> Result<Vec<UpdaterJob>, PortError> {
        let documents =
            sqlx::query_scalar("SELECT document FROM updater_jobs WHERE is_active ORDER BY created_at")
                .fetch_all(&self.pool)
                .await
                .map_err(port_error)?;
        decode_jobs(documents)
    }
}

/// Staged and live reference rows
///
/// Every row of an import carries the job id. Activation points
/// `live_data_sets` at a job; purging deletes rows of every other job.
#[derive(Debug, Clone)]
pub struct PostgresDataSetStore {
    pool: PgPool,
}

impl PostgresDataSetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Job whose rows are currently served for `data_set`
    pub async fn live_job(&self, data_set: DataSetKind) -> Result<Option<UpdaterJobId>, PortError> {
        let job_id: Option<uuid::Uuid> = sqlx::query_scalar("SELECT job_id FROM live_data_sets WHERE data_set = $1")
            .bind(data_set.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(job_id.map(UpdaterJobId::from_uuid))
    }
}

impl DomainPort for PostgresDataSetStore {}

#[async_trait]
impl DataSetSink for PostgresDataSetStore {
    #[instrument(skip(self, batch), fields(data_set = %data_set, table = %batch.table, rows = batch.rows.len()))]
    async fn write_batch(
        &self,
        data_set: DataSetKind,
        job_id: UpdaterJobId,
        batch: RowBatch,
    ) -> Result<u64, PortError> {
        if batch.rows.is_empty() {
            return Ok(0);
        }
        let columns = serde_json::to_value(&batch.columns)?;
        let rows = batch
            .rows
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        let result = sqlx::query(
            r#"
            INSERT INTO data_set_rows (data_set, job_id, table_name, columns, row_values)
            SELECT $1, $2, $3, $4, r.row_values
            FROM unnest($5::jsonb[]) AS r(row_values)
            "#,
        )
        .bind(data_set.as_str())
        .bind(job_id.as_uuid())
        .bind(&batch.table)
        .bind(columns)
        .bind(rows)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;

        debug!(written = result.rows_affected(), "Wrote batch");
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DataSetIndexer for PostgresDataSetStore {
    async fn activate(&self, data_set: DataSetKind, job_id: UpdaterJobId) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(port_error)?;

        let staged: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM data_set_rows WHERE data_set = $1 AND job_id = $2)",
        )
        .bind(data_set.as_str())
        .bind(job_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(port_error)?;
        if !staged {
            return Err(PortError::not_found("staged import", job_id));
        }

        sqlx::query(
            r#"
            INSERT INTO live_data_sets (data_set, job_id, activated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (data_set) DO UPDATE
            SET job_id = EXCLUDED.job_id, activated_at = EXCLUDED.activated_at
            "#,
        )
        .bind(data_set.as_str())
        .bind(job_id.as_uuid())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(port_error)?;

        tx.commit().await.map_err(port_error)?;
        info!(data_set = %data_set, job_id = %job_id, "Activated import");
        Ok(())
    }

    async fn purge_superseded(&self, data_set: DataSetKind, keep: UpdaterJobId) -> Result<u64, PortError> {
        let result = sqlx::query("DELETE FROM data_set_rows WHERE data_set = $1 AND job_id <> $2")
            .bind(data_set.as_str())
            .bind(keep.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(port_error)?;
        info!(data_set = %data_set, purged = result.rows_affected(), "Purged superseded imports");
        Ok(result.rows_affected())
    }
}
