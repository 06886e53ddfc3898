//! Quote workflow
//!
//! The workflow is a fixed state machine. Each action lists the states it
//! may be performed from and the single state it leads to:
//!
//! ```text
//! Nascent ──Actualise──▶ Incomplete ──ReviewReferral──▶ Review
//!                           │  │  ╲                       │
//!                           │  │   EndorsementReferral ◀──┘
//!                           │  │          │
//!              AutoApproval │  │          ▼
//!                           ▼  │      Endorsement
//!                       Approved ◀──ReviewApproval / EndorsementApproval
//!                           │  │
//!                    Policy │  └──Return──▶ Incomplete
//!                           ▼
//!                        Complete
//!
//! Decline: Incomplete | Review | Endorsement | Approved ──▶ Declined
//! Policy:  Approved | Incomplete ──▶ Complete
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QuoteError;

/// Workflow state of a single quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteState {
    Nascent,
    Incomplete,
    Review,
    Endorsement,
    Approved,
    Declined,
    Complete,
}

impl QuoteState {
    /// Complete and Declined quotes never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, QuoteState::Complete | QuoteState::Declined)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteState::Nascent => "Nascent",
            QuoteState::Incomplete => "Incomplete",
            QuoteState::Review => "Review",
            QuoteState::Endorsement => "Endorsement",
            QuoteState::Approved => "Approved",
            QuoteState::Declined => "Declined",
            QuoteState::Complete => "Complete",
        }
    }

    /// Returns the state `action` leads to from here
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` when the action is not permitted
    /// from this state.
    pub fn transition(self, action: QuoteAction) -> Result<QuoteState, QuoteError> {
        if action.permitted_from().contains(&self) {
            Ok(action.target())
        } else {
            Err(QuoteError::InvalidStateTransition {
                action: action.to_string(),
                from: self.to_string(),
            })
        }
    }
}

impl fmt::Display for QuoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteState {
    type Err = QuoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nascent" => Ok(QuoteState::Nascent),
            "incomplete" => Ok(QuoteState::Incomplete),
            "review" => Ok(QuoteState::Review),
            "endorsement" => Ok(QuoteState::Endorsement),
            "approved" => Ok(QuoteState::Approved),
            "declined" => Ok(QuoteState::Declined),
            "complete" => Ok(QuoteState::Complete),
            other => Err(QuoteError::validation(format!("unknown quote state '{}'", other))),
        }
    }
}

/// Workflow actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteAction {
    Actualise,
    ReviewReferral,
    EndorsementReferral,
    AutoApproval,
    ReviewApproval,
    EndorsementApproval,
    Return,
    Decline,
    Policy,
}

impl QuoteAction {
    pub const ALL: [QuoteAction; 9] = [
        QuoteAction::Actualise,
        QuoteAction::ReviewReferral,
        QuoteAction::EndorsementReferral,
        QuoteAction::AutoApproval,
        QuoteAction::ReviewApproval,
        QuoteAction::EndorsementApproval,
        QuoteAction::Return,
        QuoteAction::Decline,
        QuoteAction::Policy,
    ];

    /// States this action may be performed from
    pub fn permitted_from(&self) -> &'static [QuoteState] {
        use QuoteState::*;
        match self {
            QuoteAction::Actualise => &[Nascent],
            QuoteAction::ReviewReferral => &[Incomplete],
            QuoteAction::EndorsementReferral => &[Incomplete, Review],
            QuoteAction::AutoApproval => &[Incomplete],
            QuoteAction::ReviewApproval => &[Review],
            QuoteAction::EndorsementApproval => &[Endorsement],
            QuoteAction::Return => &[Review, Endorsement, Approved],
            QuoteAction::Decline => &[Incomplete, Review, Endorsement, Approved],
            QuoteAction::Policy => &[Approved, Incomplete],
        }
    }

    /// The state this action leads to
    pub fn target(&self) -> QuoteState {
        match self {
            QuoteAction::Actualise | QuoteAction::Return => QuoteState::Incomplete,
            QuoteAction::ReviewReferral => QuoteState::Review,
            QuoteAction::EndorsementReferral => QuoteState::Endorsement,
            QuoteAction::AutoApproval
            | QuoteAction::ReviewApproval
            | QuoteAction::EndorsementApproval => QuoteState::Approved,
            QuoteAction::Decline => QuoteState::Declined,
            QuoteAction::Policy => QuoteState::Complete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteAction::Actualise => "Actualise",
            QuoteAction::ReviewReferral => "ReviewReferral",
            QuoteAction::EndorsementReferral => "EndorsementReferral",
            QuoteAction::AutoApproval => "AutoApproval",
            QuoteAction::ReviewApproval => "ReviewApproval",
            QuoteAction::EndorsementApproval => "EndorsementApproval",
            QuoteAction::Return => "Return",
            QuoteAction::Decline => "Decline",
            QuoteAction::Policy => "Policy",
        }
    }
}

impl fmt::Display for QuoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteAction {
    type Err = QuoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuoteAction::ALL
            .iter()
            .copied()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| QuoteError::validation(format!("unknown quote action '{}'", s)))
    }
}
