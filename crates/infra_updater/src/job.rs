//! Updater job record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::UpdaterJobId;

use crate::data_set::DataSetKind;
use crate::error::UpdaterError;
use crate::state_machine::{StateChange, UpdaterJobState, UpdaterJobTrigger};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatistics {
    pub bytes_downloaded: u64,
    /// Hex sha-256 of the downloaded archive
    pub archive_sha256: Option<String>,
    pub files_extracted: u64,
    /// Rows imported per target table
    pub rows_imported: BTreeMap<String, u64>,
}

impl JobStatistics {
    pub fn total_rows(&self) -> u64 {
        self.rows_imported.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterJob {
    pub id: UpdaterJobId,
    pub data_set: DataSetKind,
    pub source_url: String,
    pub state: UpdaterJobState,
    pub history: Vec<StateChange>,
    pub statistics: JobStatistics,
    pub failure_reason: Option<String>,
    pub abort_requested: bool,
    /// Store revision, bumped by every successful update
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UpdaterJob {
    pub fn new(data_set: DataSetKind, source_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: UpdaterJobId::new_v7(),
            data_set,
            source_url: source_url.into(),
            state: UpdaterJobState::Queued,
            history: Vec::new(),
            statistics: JobStatistics::default(),
            failure_reason: None,
            abort_requested: false,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies `trigger`, recording the transition
    pub fn fire(&mut self, trigger: UpdaterJobTrigger, at: DateTime<Utc>) -> Result<(), UpdaterError> {
        let to = self.state.fire(&trigger)?;
        if let UpdaterJobTrigger::Fail(reason) = &trigger {
            self.failure_reason = Some(reason.clone());
        }
        self.history.push(StateChange {
            from: self.state,
            to,
            trigger: trigger.name().to_string(),
            at,
        });
        self.state = to;
        self.updated_at = at;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Time from the first transition to the last, once finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        if !self.is_terminal() {
            return None;
        }
        let first = self.history.first()?;
        let last = self.history.last()?;
        Some(last.at - first.at)
    }
}
