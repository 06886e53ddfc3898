//! Runs one updater job through its steps
//!
//! Every transition is persisted before the next step starts, so a crash
//! leaves the job in the state of the step that was running. Abort
//! requests are honoured between steps and between import batches.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use core_kernel::{PortError, UpdaterJobId};

const UPDATE_ATTEMPTS: usize = 5;

use crate::data_set::DataSetDefinition;
use crate::download::Downloader;
use crate::error::{UpdaterError, UpdaterResult};
use crate::extract::extract_archive;
use crate::import::{DataSetIndexer, Importer};
use crate::job::UpdaterJob;
use crate::queue::QueuedJobHandler;
use crate::state_machine::{UpdaterJobState, UpdaterJobTrigger};
use crate::store::UpdaterJobStore;

/// Cooperative cancellation flag shared with a running job
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Abort signals of the jobs running in this process
#[derive(Debug, Default)]
pub struct AbortRegistry {
    signals: Mutex<HashMap<UpdaterJobId, AbortSignal>>,
}

impl AbortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, job_id: UpdaterJobId) -> AbortSignal {
        self.signals.lock().await.entry(job_id).or_default().clone()
    }

    /// Signals a running job; false if it is not running here
    pub async fn signal(&self, job_id: UpdaterJobId) -> bool {
        match self.signals.lock().await.get(&job_id) {
            Some(signal) => {
                signal.abort();
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, job_id: UpdaterJobId) {
        self.signals.lock().await.remove(&job_id);
    }
}

pub struct UpdaterJobRunner {
    store: Arc<dyn UpdaterJobStore>,
    downloader: Downloader,
    importer: Importer,
    indexer: Arc<dyn DataSetIndexer>,
    work_dir: PathBuf,
    aborts: Arc<AbortRegistry>,
}

impl UpdaterJobRunner {
    pub fn new(
        store: Arc<dyn UpdaterJobStore>,
        downloader: Downloader,
        importer: Importer,
        indexer: Arc<dyn DataSetIndexer>,
        work_dir: impl Into<PathBuf>,
        aborts: Arc<AbortRegistry>,
    ) -> Self {
        Self {
            store,
            downloader,
            importer,
            indexer,
            work_dir: work_dir.into(),
            aborts,
        }
    }

    /// Runs a queued job to a terminal state
    ///
    /// Step failures end the job as Failed and are not returned as errors;
    /// only failures to load or persist the job are.
    pub async fn run(&self, job_id: UpdaterJobId) -> UpdaterResult<UpdaterJob> {
        let signal = self.aborts.register(job_id).await;
        let outcome = self.run_registered(job_id, &signal).await;
        self.aborts.remove(job_id).await;
        outcome
    }

    async fn run_registered(&self, job_id: UpdaterJobId, signal: &AbortSignal) -> UpdaterResult<UpdaterJob> {
        let mut job = self
            .store
            .get(job_id)
            .await?
            .ok_or(UpdaterError::JobNotFound(job_id))?;
        if job.state != UpdaterJobState::Queued {
            warn!(job_id = %job_id, state = %job.state, "Job is no longer queued; not running it");
            return Ok(job);
        }

        let work = self.work_dir.join(job_id.to_string());
        let result = self.execute(&mut job, signal, &work).await;

        match result {
            Ok(()) => info!(
                job_id = %job.id,
                data_set = %job.data_set,
                rows = job.statistics.total_rows(),
                "Updater job completed"
            ),
            Err(UpdaterError::Aborted) => {
                self.settle(&mut job, UpdaterJobTrigger::Abort).await?;
                info!(job_id = %job.id, state = %job.state, "Updater job aborted");
            }
            Err(e) => {
                error!(job_id = %job.id, data_set = %job.data_set, error = %e, "Updater job failed");
                self.settle(&mut job, UpdaterJobTrigger::Fail(e.to_string()))
                    .await?;
            }
        }

        if let Err(e) = tokio::fs::remove_dir_all(&work).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %work.display(), error = %e, "Could not remove work directory");
            }
        }
        Ok(job)
    }

    async fn execute(&self, job: &mut UpdaterJob, signal: &AbortSignal, work: &Path) -> UpdaterResult<()> {
        let definition: &dyn DataSetDefinition = job.data_set.definition();

        self.transition(job, UpdaterJobTrigger::Start).await?;
        let archive = work.join(definition.archive_name());
        let download = self.downloader.download(&job.source_url, &archive).await?;
        job.statistics.bytes_downloaded = download.bytes;
        job.statistics.archive_sha256 = Some(download.sha256);
        self.checkpoint(job, signal).await?;
        self.transition(job, UpdaterJobTrigger::DownloadCompleted).await?;

        let extract_dir = work.join("extracted");
        let archive_path = download.path;
        let files = tokio::task::spawn_blocking(move || extract_archive(&archive_path, &extract_dir))
            .await
            .map_err(|e| UpdaterError::Extract(format!("extraction task failed: {}", e)))??;
        job.statistics.files_extracted = files.len() as u64;
        self.checkpoint(job, signal).await?;
        self.transition(job, UpdaterJobTrigger::ExtractCompleted).await?;

        let imported = self.importer.import(job.id, definition, &files, signal).await?;
        for (table, rows) in imported {
            *job.statistics.rows_imported.entry(table).or_default() += rows;
        }
        self.checkpoint(job, signal).await?;
        self.transition(job, UpdaterJobTrigger::ImportCompleted).await?;

        self.indexer
            .activate(job.data_set, job.id)
            .await
            .map_err(|e| UpdaterError::Index(e.to_string()))?;
        let purged = self
            .indexer
            .purge_superseded(job.data_set, job.id)
            .await
            .map_err(|e| UpdaterError::Index(e.to_string()))?;
        info!(job_id = %job.id, purged, "Activated imported data set");
        self.transition(job, UpdaterJobTrigger::IndexCompleted).await
    }

    /// Fails with `Aborted` if an abort was requested here or through the store
    async fn checkpoint(&self, job: &mut UpdaterJob, signal: &AbortSignal) -> UpdaterResult<()> {
        if !signal.is_aborted() {
            if let Some(stored) = self.store.get(job.id).await? {
                job.abort_requested |= stored.abort_requested;
            }
        }
        if signal.is_aborted() || job.abort_requested {
            return Err(UpdaterError::Aborted);
        }
        Ok(())
    }

    /// Persists a transition against the job's revision
    ///
    /// A conflicting write by the manager is merged: a raised abort flag is
    /// kept, and a job the manager already ended is taken as stored and
    /// reported as `Aborted`.
    async fn transition(&self, job: &mut UpdaterJob, trigger: UpdaterJobTrigger) -> UpdaterResult<()> {
        let from = job.state;
        job.fire(trigger, Utc::now())?;
        for _ in 0..UPDATE_ATTEMPTS {
            match self.store.update(job).await {
                Ok(()) => {
                    info!(job_id = %job.id, data_set = %job.data_set, from = %from, to = %job.state, "Updater job transitioned");
                    return Ok(());
                }
                Err(e) if e.is_conflict() => {
                    let stored = self
                        .store
                        .get(job.id)
                        .await?
                        .ok_or(UpdaterError::JobNotFound(job.id))?;
                    if stored.is_terminal() {
                        warn!(job_id = %job.id, state = %stored.state, "Updater job was ended elsewhere");
                        *job = stored;
                        return Err(UpdaterError::Aborted);
                    }
                    job.revision = stored.revision;
                    job.abort_requested |= stored.abort_requested;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(PortError::conflict(format!("updater job {} kept changing during {}", job.id, job.state)).into())
    }

    /// Ends the job unless it was already ended elsewhere
    async fn settle(&self, job: &mut UpdaterJob, trigger: UpdaterJobTrigger) -> UpdaterResult<()> {
        if job.is_terminal() {
            return Ok(());
        }
        match self.transition(job, trigger).await {
            Err(UpdaterError::Aborted) if job.is_terminal() => Ok(()),
            other => other,
        }
    }
}

#[async_trait]
impl QueuedJobHandler for UpdaterJobRunner {
    async fn handle(&self, job_id: UpdaterJobId) {
        if let Err(e) = self.run(job_id).await {
            error!(job_id = %job_id, error = %e, "Updater job could not be run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::data_set::DataSetKind;
    use crate::import::mock::InMemoryDataSetStore;
    use crate::store::mock::{InMemoryUpdaterJobStore, InterleavedUpdaterJobStore};

    fn runner(store: Arc<dyn UpdaterJobStore>, work: &Path) -> UpdaterJobRunner {
        let data = Arc::new(InMemoryDataSetStore::new());
        UpdaterJobRunner::new(
            store,
            Downloader::new(Duration::from_secs(5)).unwrap(),
            Importer::new(data.clone(), 2),
            data,
            work,
            Arc::new(AbortRegistry::new()),
        )
    }

    #[tokio::test]
    async fn test_abort_of_queued_job_wins_over_start() {
        let work = tempfile::tempdir().unwrap();
        let inner = Arc::new(InMemoryUpdaterJobStore::new());
        let job = UpdaterJob::new(DataSetKind::Gnaf, "/no/such/archive.zip");
        inner.insert(&job).await.unwrap();

        // The manager aborts the queued job just before the runner saves its start
        let store = Arc::new(InterleavedUpdaterJobStore::new(inner.clone(), |job| {
            job.fire(UpdaterJobTrigger::Abort, Utc::now()).unwrap();
            job.abort_requested = true;
        }));

        let finished = runner(store, work.path()).run(job.id).await.unwrap();
        assert_eq!(finished.state, UpdaterJobState::Aborted);

        let stored = inner.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, UpdaterJobState::Aborted);
        assert_eq!(stored.history.len(), 1);
        assert!(stored.failure_reason.is_none());
    }

    #[tokio::test]
    async fn test_abort_flag_survives_a_concurrent_transition() {
        let work = tempfile::tempdir().unwrap();
        let inner = Arc::new(InMemoryUpdaterJobStore::new());
        let job = UpdaterJob::new(DataSetKind::Gnaf, "/no/such/archive.zip");
        inner.insert(&job).await.unwrap();

        // An abort request is written while the runner saves its start
        let store = Arc::new(InterleavedUpdaterJobStore::new(inner.clone(), |job| {
            job.abort_requested = true;
        }));

        runner(store, work.path()).run(job.id).await.unwrap();

        let stored = inner.get(job.id).await.unwrap().unwrap();
        assert!(stored.abort_requested);
        assert!(stored.is_terminal());
        let states: Vec<UpdaterJobState> = stored.history.iter().map(|c| c.to).collect();
        assert_eq!(states[0], UpdaterJobState::Downloading);
    }
}
