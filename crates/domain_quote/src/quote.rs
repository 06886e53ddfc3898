//! Quote entity
//!
//! Quotes live inside a [`QuoteAggregate`](crate::aggregate::QuoteAggregate)
//! and are only changed through its events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use core_kernel::{QuoteId, QuoteVersionId};

use crate::calculation::CalculationResult;
use crate::error::QuoteError;
use crate::workflow::QuoteState;

/// Why a quote was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteType {
    NewBusiness,
    Adjustment,
    Renewal,
    Cancellation,
}

impl fmt::Display for QuoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuoteType::NewBusiness => "NewBusiness",
            QuoteType::Adjustment => "Adjustment",
            QuoteType::Renewal => "Renewal",
            QuoteType::Cancellation => "Cancellation",
        };
        f.write_str(s)
    }
}

/// Snapshot of a quote taken when a version is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteVersion {
    pub version_id: QuoteVersionId,
    pub version_number: u32,
    pub form_data: Value,
    pub calculation: Option<CalculationResult>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub(crate) id: QuoteId,
    pub(crate) quote_type: QuoteType,
    pub(crate) state: QuoteState,
    pub(crate) quote_number: Option<String>,
    pub(crate) form_data: Value,
    pub(crate) latest_calculation: Option<CalculationResult>,
    pub(crate) submitted: bool,
    pub(crate) expiry: Option<DateTime<Utc>>,
    pub(crate) discarded: bool,
    pub(crate) versions: Vec<QuoteVersion>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) last_modified: DateTime<Utc>,
}

impl Quote {
    pub(crate) fn new(id: QuoteId, quote_type: QuoteType, form_data: Value, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            quote_type,
            state: QuoteState::Nascent,
            quote_number: None,
            form_data,
            latest_calculation: None,
            submitted: false,
            expiry: None,
            discarded: false,
            versions: Vec::new(),
            created_at,
            last_modified: created_at,
        }
    }

    pub fn id(&self) -> QuoteId {
        self.id
    }

    pub fn quote_type(&self) -> QuoteType {
        self.quote_type
    }

    pub fn state(&self) -> QuoteState {
        self.state
    }

    pub fn quote_number(&self) -> Option<&str> {
        self.quote_number.as_deref()
    }

    pub fn form_data(&self) -> &Value {
        &self.form_data
    }

    pub fn latest_calculation(&self) -> Option<&CalculationResult> {
        self.latest_calculation.as_ref()
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    pub fn versions(&self) -> &[QuoteVersion] {
        &self.versions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Expiry is derived from the expiry date; no event marks it
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.state.is_terminal() && self.expiry.is_some_and(|expiry| now >= expiry)
    }

    /// Still open: not finished, declined, discarded or expired
    pub fn is_in_progress(&self, now: DateTime<Utc>) -> bool {
        !self.state.is_terminal() && !self.discarded && !self.is_expired(now)
    }

    /// Fails unless the quote may still be changed
    pub fn ensure_mutable(&self, now: DateTime<Utc>) -> Result<(), QuoteError> {
        let reason = if self.discarded {
            "it has been discarded"
        } else if self.state == QuoteState::Complete {
            "it is complete"
        } else if self.state == QuoteState::Declined {
            "it has been declined"
        } else if self.is_expired(now) {
            "it has expired"
        } else {
            return Ok(());
        };
        Err(QuoteError::not_mutable(self.id, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_expired_quote_is_not_mutable() {
        let now = Utc::now();
        let mut quote = Quote::new(QuoteId::new(), QuoteType::NewBusiness, json!({}), now);
        assert!(quote.ensure_mutable(now).is_ok());

        quote.expiry = Some(now - Duration::minutes(1));
        assert!(quote.is_expired(now));
        assert!(!quote.is_in_progress(now));
        assert!(matches!(
            quote.ensure_mutable(now),
            Err(QuoteError::QuoteNotMutable { .. })
        ));
    }

    #[test]
    fn test_complete_quote_never_expires() {
        let now = Utc::now();
        let mut quote = Quote::new(QuoteId::new(), QuoteType::NewBusiness, json!({}), now);
        quote.state = QuoteState::Complete;
        quote.expiry = Some(now - Duration::days(1));

        assert!(!quote.is_expired(now));
        assert!(quote.ensure_mutable(now).is_err());
    }
}
