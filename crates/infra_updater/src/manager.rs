//! Updater job manager
//!
//! Entry point for starting, aborting and inspecting updater jobs. At most
//! one job per data set is active (queued or running) at a time.

use std::collections::HashMap;
use std::sync::Arc;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use core_kernel::{PortError, UpdaterJobId};

use crate::data_set::DataSetKind;
use crate::error::{UpdaterError, UpdaterResult};
use crate::job::UpdaterJob;
use crate::queue::BackgroundJobQueue;
use crate::runner::AbortRegistry;
use crate::state_machine::{UpdaterJobState, UpdaterJobTrigger};
use crate::store::UpdaterJobStore;

/// Failure reason given to jobs found active at startup
pub const INTERRUPTED: &str = "interrupted";

const ABORT_ATTEMPTS: usize = 5;

pub struct UpdaterJobManager {
    store: Arc<dyn UpdaterJobStore>,
    queue: Arc<BackgroundJobQueue>,
    aborts: Arc<AbortRegistry>,
    sources: HashMap<DataSetKind, String>,
    start_lock: Mutex<()>,
}

impl UpdaterJobManager {
    pub fn new(
        store: Arc<dyn UpdaterJobStore>,
        queue: Arc<BackgroundJobQueue>,
        aborts: Arc<AbortRegistry>,
        sources: HashMap<DataSetKind, String>,
    ) -> Self {
        Self {
            store,
            queue,
            aborts,
            sources,
            start_lock: Mutex::new(()),
        }
    }

    /// Creates and queues a job, using the configured source unless one is given
    pub async fn start_job(
        &self,
        data_set: DataSetKind,
        source_url: Option<String>,
    ) -> UpdaterResult<UpdaterJob> {
        let _guard = self.start_lock.lock().await;

        if let Some(active) = self
            .store
            .list_active()
            .await?
            .into_iter()
            .find(|job| job.data_set == data_set)
        {
            return Err(UpdaterError::JobAlreadyActive {
                data_set,
                job_id: active.id,
            });
        }

        let source = source_url
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.sources.get(&data_set).cloned())
            .ok_or(UpdaterError::NoSource(data_set))?;

        let mut job = UpdaterJob::new(data_set, source);
        self.store.insert(&job).await?;

        if let Err(e) = self.queue.enqueue(job.id).await {
            job.fire(UpdaterJobTrigger::Fail(format!("could not be queued: {}", e)), Utc::now())?;
            self.store.update(&mut job).await?;
            return Err(e);
        }

        info!(job_id = %job.id, data_set = %data_set, source = %job.source_url, "Updater job queued");
        Ok(job)
    }

    /// Aborts a queued job at once, or asks a running one to stop
    ///
    /// The abort is written against the revision it read; when the runner
    /// moves the job on in between, the job is reloaded and the abort retried.
    pub async fn abort_job(&self, job_id: UpdaterJobId) -> UpdaterResult<UpdaterJob> {
        for _ in 0..ABORT_ATTEMPTS {
            let mut job = self.get_job(job_id).await?;
            if job.is_terminal() {
                return Err(UpdaterError::InvalidTransition {
                    trigger: UpdaterJobTrigger::Abort.name().to_string(),
                    from: job.state,
                });
            }

            if job.state == UpdaterJobState::Queued {
                job.fire(UpdaterJobTrigger::Abort, Utc::now())?;
            }
            job.abort_requested = true;
            match self.store.update(&mut job).await {
                Ok(()) => {
                    let signalled = self.aborts.signal(job_id).await;
                    info!(job_id = %job_id, state = %job.state, signalled, "Abort requested");
                    return Ok(job);
                }
                Err(e) if e.is_conflict() => {
                    debug!(job_id = %job_id, "Updater job changed while aborting; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(PortError::conflict(format!("updater job {} kept changing while being aborted", job_id)).into())
    }

    pub async fn get_job(&self, job_id: UpdaterJobId) -> UpdaterResult<UpdaterJob> {
        self.store
            .get(job_id)
            .await?
            .ok_or(UpdaterError::JobNotFound(job_id))
    }

    pub async fn list_jobs(&self, data_set: Option<DataSetKind>) -> UpdaterResult<Vec<UpdaterJob>> {
        Ok(self.store.list(data_set).await?)
    }

    /// Fails every job left active by a previous process
    ///
    /// Call once at startup, before the queue receives work.
    pub async fn recover_interrupted(&self) -> UpdaterResult<Vec<UpdaterJobId>> {
        let mut recovered = Vec::new();
        for mut job in self.store.list_active().await? {
            warn!(job_id = %job.id, state = %job.state, "Failing interrupted updater job");
            job.fire(UpdaterJobTrigger::Fail(INTERRUPTED.to_string()), Utc::now())?;
            self.store.update(&mut job).await?;
            recovered.push(job.id);
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use crate::download::Downloader;
    use crate::import::mock::InMemoryDataSetStore;
    use crate::import::Importer;
    use crate::queue::{QueueConfig, QueuedJobHandler};
    use crate::runner::UpdaterJobRunner;
    use crate::store::mock::{InMemoryUpdaterJobStore, InterleavedUpdaterJobStore};

    struct Harness {
        manager: UpdaterJobManager,
        data: Arc<InMemoryDataSetStore>,
        _work: tempfile::TempDir,
    }

    fn harness(sources: HashMap<DataSetKind, String>) -> Harness {
        let work = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryUpdaterJobStore::new());
        let data = Arc::new(InMemoryDataSetStore::new());
        let aborts = Arc::new(AbortRegistry::new());
        let runner = Arc::new(UpdaterJobRunner::new(
            store.clone(),
            Downloader::new(Duration::from_secs(5)).unwrap(),
            Importer::new(data.clone(), 2),
            data.clone(),
            work.path(),
            aborts.clone(),
        ));
        let queue = Arc::new(BackgroundJobQueue::start(runner, QueueConfig::default()));
        Harness {
            manager: UpdaterJobManager::new(store, queue, aborts, sources),
            data,
            _work: work,
        }
    }

    /// Leaves every job queued
    struct Idle;

    #[async_trait]
    impl QueuedJobHandler for Idle {
        async fn handle(&self, _job_id: UpdaterJobId) {}
    }

    fn idle_manager() -> (UpdaterJobManager, Arc<InMemoryUpdaterJobStore>) {
        let store = Arc::new(InMemoryUpdaterJobStore::new());
        let queue = Arc::new(BackgroundJobQueue::start(Arc::new(Idle), QueueConfig::default()));
        let mut sources = HashMap::new();
        sources.insert(DataSetKind::RedBook, "https://data.example.com/redbook.zip".to_string());
        let manager = UpdaterJobManager::new(store.clone(), queue, Arc::new(AbortRegistry::new()), sources);
        (manager, store)
    }

    fn gnaf_archive(dir: &Path) -> String {
        let path = dir.join("G-NAF_release.zip");
        let mut writer = ZipWriter::new(File::create(&path).unwrap());
        let files = [
            (
                "G-NAF/Standard/NSW_LOCALITY_psv.psv",
                "LOCALITY_PID|LOCALITY_NAME\nloc1|SYDNEY\nloc2|MANLY\nloc3|BONDI\n",
            ),
            ("G-NAF/Standard/NSW_STATE_psv.psv", "STATE_PID|STATE_NAME\n1|NEW SOUTH WALES\n"),
            ("G-NAF/README.txt", "release notes"),
        ];
        for (name, content) in files {
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        format!("file://{}", path.display())
    }

    async fn wait_until_terminal(manager: &UpdaterJobManager, job_id: UpdaterJobId) -> UpdaterJob {
        for _ in 0..400 {
            let job = manager.get_job(job_id).await.unwrap();
            if job.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {job_id} did not finish");
    }

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        let source_dir = tempfile::tempdir().unwrap();
        let source = gnaf_archive(source_dir.path());
        let h = harness(HashMap::new());

        let job = h.manager.start_job(DataSetKind::Gnaf, Some(source)).await.unwrap();
        assert_eq!(job.state, UpdaterJobState::Queued);

        let job = wait_until_terminal(&h.manager, job.id).await;
        assert_eq!(job.state, UpdaterJobState::Completed, "failure: {:?}", job.failure_reason);

        let states: Vec<UpdaterJobState> = job.history.iter().map(|c| c.to).collect();
        assert_eq!(
            states,
            vec![
                UpdaterJobState::Downloading,
                UpdaterJobState::Extracting,
                UpdaterJobState::Importing,
                UpdaterJobState::Indexing,
                UpdaterJobState::Completed,
            ]
        );
        assert_eq!(job.statistics.files_extracted, 3);
        assert_eq!(job.statistics.rows_imported.get("gnaf_locality"), Some(&3));
        assert_eq!(job.statistics.rows_imported.get("gnaf_state"), Some(&1));
        assert!(job.statistics.archive_sha256.is_some());
        assert_eq!(h.data.live_job(DataSetKind::Gnaf).await, Some(job.id));
    }

    #[tokio::test]
    async fn test_missing_source_fails_the_job() {
        let h = harness(HashMap::new());
        let job = h
            .manager
            .start_job(DataSetKind::Gnaf, Some("/no/such/archive.zip".to_string()))
            .await
            .unwrap();

        let job = wait_until_terminal(&h.manager, job.id).await;
        assert_eq!(job.state, UpdaterJobState::Failed);
        assert!(job.failure_reason.unwrap().contains("Download failed"));
        assert!(h.data.live_job(DataSetKind::Gnaf).await.is_none());
    }

    #[tokio::test]
    async fn test_one_active_job_per_data_set() {
        let (manager, _store) = idle_manager();

        let first = manager.start_job(DataSetKind::RedBook, None).await.unwrap();
        assert_eq!(first.source_url, "https://data.example.com/redbook.zip");

        let err = manager.start_job(DataSetKind::RedBook, None).await.unwrap_err();
        assert!(matches!(err, UpdaterError::JobAlreadyActive { job_id, .. } if job_id == first.id));

        // Other data sets are independent
        manager
            .start_job(DataSetKind::Gnaf, Some("https://data.example.com/gnaf.zip".into()))
            .await
            .unwrap();

        let aborted = manager.abort_job(first.id).await.unwrap();
        assert_eq!(aborted.state, UpdaterJobState::Aborted);
        assert!(manager.start_job(DataSetKind::RedBook, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_start_without_source() {
        let (manager, _store) = idle_manager();
        let err = manager.start_job(DataSetKind::GlassGuide, None).await.unwrap_err();
        assert!(matches!(err, UpdaterError::NoSource(DataSetKind::GlassGuide)));
    }

    #[tokio::test]
    async fn test_abort_of_finished_job_rejected() {
        let (manager, _store) = idle_manager();
        let job = manager.start_job(DataSetKind::RedBook, None).await.unwrap();
        manager.abort_job(job.id).await.unwrap();

        assert!(matches!(
            manager.abort_job(job.id).await,
            Err(UpdaterError::InvalidTransition { .. })
        ));
        assert!(matches!(
            manager.abort_job(UpdaterJobId::new()).await,
            Err(UpdaterError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_abort_does_not_undo_a_concurrent_start() {
        let inner = Arc::new(InMemoryUpdaterJobStore::new());
        let job = UpdaterJob::new(DataSetKind::Gnaf, "https://data.example.com/gnaf.zip");
        inner.insert(&job).await.unwrap();

        // The runner starts the job between the abort's read and its write
        let store = Arc::new(InterleavedUpdaterJobStore::new(inner.clone(), |job| {
            job.fire(UpdaterJobTrigger::Start, Utc::now()).unwrap();
        }));
        let queue = Arc::new(BackgroundJobQueue::start(Arc::new(Idle), QueueConfig::default()));
        let manager = UpdaterJobManager::new(store, queue, Arc::new(AbortRegistry::new()), HashMap::new());

        let aborted = manager.abort_job(job.id).await.unwrap();
        assert_eq!(aborted.state, UpdaterJobState::Downloading);
        assert!(aborted.abort_requested);

        let stored = inner.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, UpdaterJobState::Downloading);
        assert!(stored.abort_requested);
        assert_eq!(stored.revision, 2);
    }

    #[tokio::test]
    async fn test_recover_interrupted_jobs() {
        let (manager, store) = idle_manager();
        let mut running = UpdaterJob::new(DataSetKind::Gnaf, "https://data.example.com/gnaf.zip");
        running.fire(UpdaterJobTrigger::Start, Utc::now()).unwrap();
        running.fire(UpdaterJobTrigger::DownloadCompleted, Utc::now()).unwrap();
        store.insert(&running).await.unwrap();

        let mut done = UpdaterJob::new(DataSetKind::RedBook, "https://data.example.com/rb.zip");
        done.fire(UpdaterJobTrigger::Abort, Utc::now()).unwrap();
        store.insert(&done).await.unwrap();

        let recovered = manager.recover_interrupted().await.unwrap();
        assert_eq!(recovered, vec![running.id]);

        let job = manager.get_job(running.id).await.unwrap();
        assert_eq!(job.state, UpdaterJobState::Failed);
        assert_eq!(job.failure_reason.as_deref(), Some(INTERRUPTED));
        assert_eq!(manager.get_job(done.id).await.unwrap().state, UpdaterJobState::Aborted);
    }

    #[tokio::test]
    async fn test_list_jobs_filters_by_data_set() {
        let (manager, _store) = idle_manager();
        manager.start_job(DataSetKind::RedBook, None).await.unwrap();
        manager
            .start_job(DataSetKind::Gnaf, Some("https://data.example.com/gnaf.zip".into()))
            .await
            .unwrap();

        assert_eq!(manager.list_jobs(None).await.unwrap().len(), 2);
        let gnaf = manager.list_jobs(Some(DataSetKind::Gnaf)).await.unwrap();
        assert_eq!(gnaf.len(), 1);
        assert_eq!(gnaf[0].data_set, DataSetKind::Gnaf);
    }
}
