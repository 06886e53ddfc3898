//! Background job queue
//!
//! A bounded tokio channel of job ids drained by a fixed set of worker
//! tasks. Workers share the receiver; a panicking job is logged and does
//! not take its worker down.

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use core_kernel::UpdaterJobId;

use crate::error::{UpdaterError, UpdaterResult};

#[async_trait]
pub trait QueuedJobHandler: Send + Sync {
    async fn handle(&self, job_id: UpdaterJobId);
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub capacity: usize,
    pub worker_count: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            worker_count: 2,
        }
    }
}

pub struct BackgroundJobQueue {
    sender: RwLock<Option<mpsc::Sender<UpdaterJobId>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundJobQueue {
    /// Spawns the workers; must be called inside a tokio runtime
    pub fn start(handler: Arc<dyn QueuedJobHandler>, config: QueueConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..config.worker_count.max(1))
            .map(|worker_id| {
                let handler = Arc::clone(&handler);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(worker_loop(worker_id, handler, receiver))
            })
            .collect();

        info!(
            workers = config.worker_count,
            capacity = config.capacity,
            "Started background job queue"
        );
        Self {
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// Queues a job without waiting for capacity
    pub async fn enqueue(&self, job_id: UpdaterJobId) -> UpdaterResult<()> {
        let sender = self.sender.read().await;
        let sender = sender.as_ref().ok_or(UpdaterError::QueueClosed)?;
        sender.try_send(job_id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => UpdaterError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => UpdaterError::QueueClosed,
        })?;
        debug!(job_id = %job_id, "Queued updater job");
        Ok(())
    }

    /// Stops accepting jobs and waits for queued ones to finish
    pub async fn shutdown(&self) {
        self.sender.write().await.take();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for (index, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                error!(worker = index, error = %e, "Worker did not shut down cleanly");
            }
        }
        info!("Background job queue stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    handler: Arc<dyn QueuedJobHandler>,
    receiver: Arc<Mutex<mpsc::Receiver<UpdaterJobId>>>,
) {
    debug!(worker_id, "Worker started");
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(job_id) = next else {
            break;
        };

        debug!(worker_id, job_id = %job_id, "Worker picked up job");
        if AssertUnwindSafe(handler.handle(job_id))
            .catch_unwind()
            .await
            .is_err()
        {
            error!(worker_id, job_id = %job_id, "Job handler panicked");
        }
    }
    debug!(worker_id, "Worker stopped");
}
