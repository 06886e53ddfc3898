//! Updater Jobs
//!
//! Keeps reference data sets (GNAF addresses, RedBook and Glass's Guide
//! vehicles) current. Each update is an [`UpdaterJob`] moving through a
//! fixed state machine:
//!
//! ```text
//! Queued -> Downloading -> Extracting -> Importing -> Indexing -> Completed
//!                 (any non-terminal state) -> Aborted | Failed
//! ```
//!
//! - [`UpdaterJobManager`] starts, aborts and lists jobs
//! - [`BackgroundJobQueue`] runs queued jobs on a pool of tokio workers
//! - [`RecurringScheduler`] starts jobs on daily, weekly or interval
//!   schedules
//! - [`DataSetSink`] and [`DataSetIndexer`] are the storage ports imports
//!   are written through

pub mod data_set;
pub mod download;
pub mod error;
pub mod extract;
pub mod import;
pub mod job;
pub mod manager;
pub mod queue;
pub mod runner;
pub mod scheduler;
pub mod service;
pub mod state_machine;
pub mod store;

pub use data_set::{DataSetDefinition, DataSetKind, ImportFile};
pub use download::{DownloadOutcome, Downloader};
pub use error::{UpdaterError, UpdaterResult};
pub use import::{DataSetIndexer, DataSetSink, Importer, RowBatch};
pub use job::{JobStatistics, UpdaterJob};
pub use manager::UpdaterJobManager;
pub use queue::{BackgroundJobQueue, QueueConfig, QueuedJobHandler};
pub use runner::{AbortRegistry, AbortSignal, UpdaterJobRunner};
pub use scheduler::{RecurringScheduler, Schedule, ScheduledUpdate};
pub use service::{UpdaterService, UpdaterSettings};
pub use state_machine::{StateChange, UpdaterJobState, UpdaterJobTrigger};
pub use store::UpdaterJobStore;
