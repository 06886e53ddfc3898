//! Quote domain errors

use chrono::{DateTime, Utc};
use thiserror::Error;

use core_kernel::{AggregateError, MoneyError, QuoteId};

/// Errors that can occur in the quote domain
#[derive(Debug, Error)]
pub enum QuoteError {
    /// The workflow does not permit the action from the current state
    #[error("Cannot perform {action} on a quote in state {from}")]
    InvalidStateTransition { action: String, from: String },

    /// No quote with this id exists in the aggregate
    #[error("Quote not found: {0}")]
    QuoteNotFound(QuoteId),

    /// The quote is discarded, expired, complete or declined
    #[error("Quote {quote_id} can no longer be changed: {reason}")]
    QuoteNotMutable { quote_id: QuoteId, reason: String },

    #[error("Quote {0} has already been submitted")]
    AlreadySubmitted(QuoteId),

    #[error("Quote {0} already has a quote number")]
    QuoteNumberAlreadyAssigned(QuoteId),

    /// Binding preconditions are not met
    #[error("Quote cannot be bound: {0}")]
    NotBindable(String),

    #[error("A policy has already been issued for this aggregate")]
    PolicyAlreadyIssued,

    #[error("No policy has been issued for this aggregate")]
    NoPolicy,

    #[error("Policy cannot be changed while {status}")]
    PolicyNotModifiable { status: String },

    #[error("Policy is not yet in its renewal window, which opens at {opens_at}")]
    NotInRenewalWindow { opens_at: DateTime<Utc> },

    /// Another adjustment, renewal or cancellation is still open
    #[error("Quote {0} is still in progress")]
    QuoteInProgress(QuoteId),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Financial error: {0}")]
    Financial(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl QuoteError {
    pub fn validation(message: impl Into<String>) -> Self {
        QuoteError::Validation(message.into())
    }

    pub fn not_bindable(reason: impl Into<String>) -> Self {
        QuoteError::NotBindable(reason.into())
    }

    pub fn not_mutable(quote_id: QuoteId, reason: impl Into<String>) -> Self {
        QuoteError::QuoteNotMutable {
            quote_id,
            reason: reason.into(),
        }
    }

    pub fn invalid_date(message: impl Into<String>) -> Self {
        QuoteError::InvalidDate(message.into())
    }
}

impl From<MoneyError> for QuoteError {
    fn from(err: MoneyError) -> Self {
        QuoteError::Financial(err.to_string())
    }
}
