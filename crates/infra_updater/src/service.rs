//! Wiring of the updater components

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::data_set::DataSetKind;
use crate::download::Downloader;
use crate::error::UpdaterResult;
use crate::import::{DataSetIndexer, DataSetSink, Importer, DEFAULT_BATCH_SIZE};
use crate::manager::UpdaterJobManager;
use crate::queue::{BackgroundJobQueue, QueueConfig};
use crate::runner::{AbortRegistry, UpdaterJobRunner};
use crate::scheduler::{RecurringScheduler, ScheduledUpdate};
use crate::store::UpdaterJobStore;

#[derive(Debug, Clone)]
pub struct UpdaterSettings {
    /// Jobs download and extract into `<work_dir>/<job id>`
    pub work_dir: PathBuf,
    pub queue: QueueConfig,
    pub import_batch_size: usize,
    pub download_timeout: Duration,
    pub sources: HashMap<DataSetKind, String>,
    pub schedules: Vec<ScheduledUpdate>,
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("ubind-updater"),
            queue: QueueConfig::default(),
            import_batch_size: DEFAULT_BATCH_SIZE,
            download_timeout: Duration::from_secs(30 * 60),
            sources: HashMap::new(),
            schedules: Vec::new(),
        }
    }
}

/// Running updater: manager, workers and scheduler
pub struct UpdaterService {
    pub manager: Arc<UpdaterJobManager>,
    queue: Arc<BackgroundJobQueue>,
    scheduler: Option<JoinHandle<()>>,
}

impl UpdaterService {
    /// Recovers interrupted jobs, then starts workers and the scheduler
    pub async fn start(
        settings: UpdaterSettings,
        store: Arc<dyn UpdaterJobStore>,
        sink: Arc<dyn DataSetSink>,
        indexer: Arc<dyn DataSetIndexer>,
        shutdown: watch::Receiver<bool>,
    ) -> UpdaterResult<Self> {
        let aborts = Arc::new(AbortRegistry::new());
        let runner = Arc::new(UpdaterJobRunner::new(
            Arc::clone(&store),
            Downloader::new(settings.download_timeout)?,
            Importer::new(sink, settings.import_batch_size),
            indexer,
            settings.work_dir.clone(),
            Arc::clone(&aborts),
        ));
        let queue = Arc::new(BackgroundJobQueue::start(runner, settings.queue.clone()));
        let manager = Arc::new(UpdaterJobManager::new(
            store,
            Arc::clone(&queue),
            aborts,
            settings.sources.clone(),
        ));

        let recovered = manager.recover_interrupted().await?;
        if !recovered.is_empty() {
            info!(count = recovered.len(), "Failed interrupted updater jobs");
        }

        let scheduler = RecurringScheduler::new(Arc::clone(&manager), settings.schedules).spawn(shutdown);

        Ok(Self {
            manager,
            queue,
            scheduler: Some(scheduler),
        })
    }

    /// Waits for the scheduler to stop and queued jobs to finish
    pub async fn shutdown(mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            let _ = scheduler.await;
        }
        self.queue.shutdown().await;
    }
}
