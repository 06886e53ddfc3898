//! Import and index steps
//!
//! Extracted files are matched against the data set's import plan,
//! parsed with `csv` on the blocking pool and handed to a [`DataSetSink`]
//! in batches. Rows are staged under the job id; the [`DataSetIndexer`]
//! later makes them the live data set.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use core_kernel::{DomainPort, PortError, UpdaterJobId};

use crate::data_set::{DataSetDefinition, DataSetKind, ImportFile};
use crate::error::{UpdaterError, UpdaterResult};
use crate::runner::AbortSignal;

pub const DEFAULT_BATCH_SIZE: usize = 5_000;

/// Parsed rows of one file, ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowBatch {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Destination for imported rows
#[async_trait]
pub trait DataSetSink: DomainPort {
    /// Stages rows under `job_id`; returns the number written
    async fn write_batch(
        &self,
        data_set: DataSetKind,
        job_id: UpdaterJobId,
        batch: RowBatch,
    ) -> Result<u64, PortError>;
}

/// Switches the live data set over to a finished import
#[async_trait]
pub trait DataSetIndexer: DomainPort {
    async fn activate(&self, data_set: DataSetKind, job_id: UpdaterJobId) -> Result<(), PortError>;

    /// Removes rows of every import other than `keep`; returns rows deleted
    async fn purge_superseded(&self, data_set: DataSetKind, keep: UpdaterJobId) -> Result<u64, PortError>;
}

pub struct Importer {
    sink: Arc<dyn DataSetSink>,
    batch_size: usize,
}

impl Importer {
    pub fn new(sink: Arc<dyn DataSetSink>, batch_size: usize) -> Self {
        Self {
            sink,
            batch_size: batch_size.max(1),
        }
    }

    /// Imports every planned file; returns `(table, rows)` per file
    pub async fn import(
        &self,
        job_id: UpdaterJobId,
        definition: &dyn DataSetDefinition,
        files: &[PathBuf],
        abort: &AbortSignal,
    ) -> UpdaterResult<Vec<(String, u64)>> {
        let mut imported = Vec::new();

        for path in files {
            let Some(plan) = file_name(path).and_then(|name| definition.plan_for(name)) else {
                debug!(file = %path.display(), "Not in import plan; skipped");
                continue;
            };
            let table = plan.table.to_string();
            let rows = self
                .import_file(definition.kind(), job_id, path, plan, abort)
                .await?;
            imported.push((table, rows));
        }

        if imported.is_empty() {
            return Err(UpdaterError::Import(format!(
                "no files matched the {} import plan",
                definition.kind()
            )));
        }
        Ok(imported)
    }

    async fn import_file(
        &self,
        data_set: DataSetKind,
        job_id: UpdaterJobId,
        path: &Path,
        plan: ImportFile,
        abort: &AbortSignal,
    ) -> UpdaterResult<u64> {
        let (tx, mut rx) = mpsc::channel::<UpdaterResult<RowBatch>>(2);
        let reader_path = path.to_path_buf();
        let batch_size = self.batch_size;
        let reader = tokio::task::spawn_blocking(move || read_batches(&reader_path, &plan, batch_size, tx));

        let mut written = 0u64;
        loop {
            let Some(batch) = rx.recv().await else {
                break;
            };
            if abort.is_aborted() {
                // Dropping the receiver stops the reader
                drop(rx);
                let _ = reader.await;
                return Err(UpdaterError::Aborted);
            }
            written += self.sink.write_batch(data_set, job_id, batch?).await?;
        }
        reader
            .await
            .map_err(|e| UpdaterError::Import(format!("reader task failed: {}", e)))?;

        info!(file = %path.display(), rows = written, "Imported file");
        Ok(written)
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Reads `path` and sends batches until done or the receiver goes away
fn read_batches(
    path: &Path,
    plan: &ImportFile,
    batch_size: usize,
    tx: mpsc::Sender<UpdaterResult<RowBatch>>,
) {
    let mut reader = match csv::ReaderBuilder::new()
        .delimiter(plan.delimiter)
        .has_headers(plan.has_header)
        .flexible(true)
        .from_path(path)
    {
        Ok(reader) => reader,
        Err(e) => {
            let _ = tx.blocking_send(Err(e.into()));
            return;
        }
    };

    let mut columns: Vec<String> = if plan.has_header {
        match reader.headers() {
            Ok(headers) => headers.iter().map(|h| h.trim().to_ascii_lowercase()).collect(),
            Err(e) => {
                let _ = tx.blocking_send(Err(e.into()));
                return;
            }
        }
    } else {
        Vec::new()
    };

    let mut rows = Vec::with_capacity(batch_size);
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                let _ = tx.blocking_send(Err(e.into()));
                return;
            }
        };
        if columns.is_empty() {
            columns = (1..=record.len()).map(|i| format!("column_{}", i)).collect();
        }
        rows.push(record.iter().map(str::to_string).collect());

        if rows.len() == batch_size {
            let batch = RowBatch {
                table: plan.table.to_string(),
                columns: columns.clone(),
                rows: std::mem::replace(&mut rows, Vec::with_capacity(batch_size)),
            };
            if tx.blocking_send(Ok(batch)).is_err() {
                return;
            }
        }
    }

    if !rows.is_empty() {
        let _ = tx.blocking_send(Ok(RowBatch {
            table: plan.table.to_string(),
            columns,
            rows,
        }));
    }
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    type StagedKey = (DataSetKind, UpdaterJobId);

    /// Holds staged rows and the live import per data set in memory
    #[derive(Debug, Default)]
    pub struct InMemoryDataSetStore {
        staged: RwLock<HashMap<StagedKey, Vec<RowBatch>>>,
        live: RwLock<HashMap<DataSetKind, UpdaterJobId>>,
    }

    impl InMemoryDataSetStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn live_job(&self, data_set: DataSetKind) -> Option<UpdaterJobId> {
            self.live.read().await.get(&data_set).copied()
        }

        /// Rows staged by `job_id` for `table`, across batches
        pub async fn rows(&self, data_set: DataSetKind, job_id: UpdaterJobId, table: &str) -> Vec<Vec<String>> {
            self.staged
                .read()
                .await
                .get(&(data_set, job_id))
                .map(|batches| {
                    batches
                        .iter()
                        .filter(|b| b.table == table)
                        .flat_map(|b| b.rows.iter().cloned())
                        .collect()
                })
                .unwrap_or_default()
        }

        pub async fn batch_count(&self, data_set: DataSetKind, job_id: UpdaterJobId) -> usize {
            self.staged
                .read()
                .await
                .get(&(data_set, job_id))
                .map_or(0, Vec::len)
        }
    }

    impl DomainPort for InMemoryDataSetStore {}

    #[async_trait]
    impl DataSetSink for InMemoryDataSetStore {
        async fn write_batch(
            &self,
            data_set: DataSetKind,
            job_id: UpdaterJobId,
            batch: RowBatch,
        ) -> Result<u64, PortError> {
            let count = batch.rows.len() as u64;
            self.staged
                .write()
                .await
                .entry((data_set, job_id))
                .or_default()
                .push(batch);
            Ok(count)
        }
    }

    #[async_trait]
    impl DataSetIndexer for InMemoryDataSetStore {
        async fn activate(&self, data_set: DataSetKind, job_id: UpdaterJobId) -> Result<(), PortError> {
            if !self.staged.read().await.contains_key(&(data_set, job_id)) {
                return Err(PortError::not_found("staged import", job_id));
            }
            self.live.write().await.insert(data_set, job_id);
            Ok(())
        }

        async fn purge_superseded(&self, data_set: DataSetKind, keep: UpdaterJobId) -> Result<u64, PortError> {
            let mut staged = self.staged.write().await;
            let mut purged = 0u64;
            staged.retain(|(kind, job_id), batches| {
                if *kind != data_set || *job_id == keep {
                    return true;
                }
                purged += batches.iter().map(|b| b.rows.len() as u64).sum::<u64>();
                false
            });
            Ok(purged)
        }
    }
}
