//! Updater job state machine
//!
//! ```text
//! Queued ─Start─▶ Downloading ─DownloadCompleted─▶ Extracting
//!        ─ExtractCompleted─▶ Importing ─ImportCompleted─▶ Indexing
//!        ─IndexCompleted─▶ Completed
//!
//! any non-terminal ─Abort─▶ Aborted
//! any non-terminal ─Fail──▶ Failed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::UpdaterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdaterJobState {
    Queued,
    Downloading,
    Extracting,
    Importing,
    Indexing,
    Completed,
    Aborted,
    Failed,
}

impl UpdaterJobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpdaterJobState::Completed | UpdaterJobState::Aborted | UpdaterJobState::Failed
        )
    }

    /// Queued or running
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdaterJobState::Queued => "Queued",
            UpdaterJobState::Downloading => "Downloading",
            UpdaterJobState::Extracting => "Extracting",
            UpdaterJobState::Importing => "Importing",
            UpdaterJobState::Indexing => "Indexing",
            UpdaterJobState::Completed => "Completed",
            UpdaterJobState::Aborted => "Aborted",
            UpdaterJobState::Failed => "Failed",
        }
    }

    /// Target state for `trigger`, if permitted from this state
    pub fn fire(self, trigger: &UpdaterJobTrigger) -> Result<UpdaterJobState, UpdaterError> {
        use UpdaterJobState::*;

        let next = match (self, trigger) {
            (from, _) if from.is_terminal() => None,
            (Queued, UpdaterJobTrigger::Start) => Some(Downloading),
            (Downloading, UpdaterJobTrigger::DownloadCompleted) => Some(Extracting),
            (Extracting, UpdaterJobTrigger::ExtractCompleted) => Some(Importing),
            (Importing, UpdaterJobTrigger::ImportCompleted) => Some(Indexing),
            (Indexing, UpdaterJobTrigger::IndexCompleted) => Some(Completed),
            (_, UpdaterJobTrigger::Abort) => Some(Aborted),
            (_, UpdaterJobTrigger::Fail(_)) => Some(Failed),
            _ => None,
        };

        next.ok_or_else(|| UpdaterError::InvalidTransition {
            trigger: trigger.name().to_string(),
            from: self,
        })
    }
}

impl fmt::Display for UpdaterJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdaterJobState {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            UpdaterJobState::Queued,
            UpdaterJobState::Downloading,
            UpdaterJobState::Extracting,
            UpdaterJobState::Importing,
            UpdaterJobState::Indexing,
            UpdaterJobState::Completed,
            UpdaterJobState::Aborted,
            UpdaterJobState::Failed,
        ]
        .into_iter()
        .find(|state| state.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| UpdaterError::UnknownState(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdaterJobTrigger {
    Start,
    DownloadCompleted,
    ExtractCompleted,
    ImportCompleted,
    IndexCompleted,
    Abort,
    Fail(String),
}

impl UpdaterJobTrigger {
    pub fn name(&self) -> &'static str {
        match self {
            UpdaterJobTrigger::Start => "Start",
            UpdaterJobTrigger::DownloadCompleted => "DownloadCompleted",
            UpdaterJobTrigger::ExtractCompleted => "ExtractCompleted",
            UpdaterJobTrigger::ImportCompleted => "ImportCompleted",
            UpdaterJobTrigger::IndexCompleted => "IndexCompleted",
            UpdaterJobTrigger::Abort => "Abort",
            UpdaterJobTrigger::Fail(_) => "Fail",
        }
    }
}

/// One recorded transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: UpdaterJobState,
    pub to: UpdaterJobState,
    pub trigger: String,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_happy_path() {
        let mut state = UpdaterJobState::Queued;
        for trigger in [
            UpdaterJobTrigger::Start,
            UpdaterJobTrigger::DownloadCompleted,
            UpdaterJobTrigger::ExtractCompleted,
            UpdaterJobTrigger::ImportCompleted,
            UpdaterJobTrigger::IndexCompleted,
        ] {
            state = state.fire(&trigger).unwrap();
        }
        assert_eq!(state, UpdaterJobState::Completed);
    }

    #[test]
    fn test_steps_cannot_be_skipped() {
        assert!(UpdaterJobState::Queued
            .fire(&UpdaterJobTrigger::ExtractCompleted)
            .is_err());
        assert!(UpdaterJobState::Downloading
            .fire(&UpdaterJobTrigger::ImportCompleted)
            .is_err());
    }

    #[test]
    fn test_abort_and_fail_from_running_states() {
        assert_eq!(
            UpdaterJobState::Queued.fire(&UpdaterJobTrigger::Abort).unwrap(),
            UpdaterJobState::Aborted
        );
        assert_eq!(
            UpdaterJobState::Importing
                .fire(&UpdaterJobTrigger::Fail("bad row".into()))
                .unwrap(),
            UpdaterJobState::Failed
        );
    }

    #[test]
    fn test_parse_state() {
        assert_eq!("importing".parse::<UpdaterJobState>().unwrap(), UpdaterJobState::Importing);
        assert!("Paused".parse::<UpdaterJobState>().is_err());
    }

    fn any_state() -> impl Strategy<Value = UpdaterJobState> {
        prop_oneof![
            Just(UpdaterJobState::Queued),
            Just(UpdaterJobState::Downloading),
            Just(UpdaterJobState::Extracting),
            Just(UpdaterJobState::Importing),
            Just(UpdaterJobState::Indexing),
            Just(UpdaterJobState::Completed),
            Just(UpdaterJobState::Aborted),
            Just(UpdaterJobState::Failed),
        ]
    }

    fn any_trigger() -> impl Strategy<Value = UpdaterJobTrigger> {
        prop_oneof![
            Just(UpdaterJobTrigger::Start),
            Just(UpdaterJobTrigger::DownloadCompleted),
            Just(UpdaterJobTrigger::ExtractCompleted),
            Just(UpdaterJobTrigger::ImportCompleted),
            Just(UpdaterJobTrigger::IndexCompleted),
            Just(UpdaterJobTrigger::Abort),
            "[a-z ]{0,12}".prop_map(UpdaterJobTrigger::Fail),
        ]
    }

    proptest! {
        #[test]
        fn terminal_states_reject_every_trigger(state in any_state(), trigger in any_trigger()) {
            prop_assume!(state.is_terminal());
            prop_assert!(state.fire(&trigger).is_err());
        }

        #[test]
        fn active_states_can_always_abort_or_fail(state in any_state()) {
            prop_assume!(state.is_active());
            prop_assert_eq!(state.fire(&UpdaterJobTrigger::Abort).unwrap(), UpdaterJobState::Aborted);
            prop_assert_eq!(
                state.fire(&UpdaterJobTrigger::Fail("x".into())).unwrap(),
                UpdaterJobState::Failed
            );
        }
    }
}
