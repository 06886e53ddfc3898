//! Updater job errors

use thiserror::Error;

use core_kernel::{PortError, UpdaterJobId};

use crate::data_set::DataSetKind;
use crate::state_machine::UpdaterJobState;

#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("Cannot {trigger} an updater job in state {from}")]
    InvalidTransition {
        trigger: String,
        from: UpdaterJobState,
    },

    #[error("Updater job not found: {0}")]
    JobNotFound(UpdaterJobId),

    #[error("An update of {data_set} is already running as job {job_id}")]
    JobAlreadyActive {
        data_set: DataSetKind,
        job_id: UpdaterJobId,
    },

    #[error("Unknown updater job state: {0}")]
    UnknownState(String),

    #[error("Unknown data set: {0}")]
    UnknownDataSet(String),

    #[error("No source configured for {0}")]
    NoSource(DataSetKind),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Extraction failed: {0}")]
    Extract(String),

    #[error("Import failed: {0}")]
    Import(String),

    #[error("Indexing failed: {0}")]
    Index(String),

    #[error("Invalid schedule '{0}'")]
    InvalidSchedule(String),

    /// The job was aborted while a step was running
    #[error("Job was aborted")]
    Aborted,

    #[error("Job queue is full")]
    QueueFull,

    #[error("Job queue is shut down")]
    QueueClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Port(#[from] PortError),
}

impl From<reqwest::Error> for UpdaterError {
    fn from(err: reqwest::Error) -> Self {
        UpdaterError::Download(err.to_string())
    }
}

impl From<zip::result::ZipError> for UpdaterError {
    fn from(err: zip::result::ZipError) -> Self {
        UpdaterError::Extract(err.to_string())
    }
}

impl From<csv::Error> for UpdaterError {
    fn from(err: csv::Error) -> Self {
        UpdaterError::Import(err.to_string())
    }
}

pub type UpdaterResult<T> = Result<T, UpdaterError>;
