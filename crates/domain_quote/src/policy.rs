//! Policy issued from a quote aggregate
//!
//! The policy is a value held inside the quote aggregate. Its status is a
//! function of time: an issued policy becomes active at inception and
//! expires at its expiry date without any event being recorded.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::QuoteError;

/// Policy status at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyStatus {
    /// Issued with a future inception date
    Issued,
    Active,
    Expired,
    Cancelled,
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PolicyStatus::Issued => "Issued",
            PolicyStatus::Active => "Active",
            PolicyStatus::Expired => "Expired",
            PolicyStatus::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    policy_number: String,
    inception: DateTime<Utc>,
    expiry: DateTime<Utc>,
    issued_at: DateTime<Utc>,
    cancellation_effective: Option<DateTime<Utc>>,
    adjustment_count: u32,
    renewal_count: u32,
}

impl Policy {
    /// Creates a newly issued policy
    ///
    /// # Errors
    ///
    /// Returns `InvalidDate` if the expiry is not after inception
    pub fn issue(
        policy_number: impl Into<String>,
        inception: DateTime<Utc>,
        expiry: DateTime<Utc>,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, QuoteError> {
        if expiry <= inception {
            return Err(QuoteError::invalid_date("policy expiry must be after inception"));
        }
        Ok(Self::issued(policy_number.into(), inception, expiry, issued_at))
    }

    /// Rebuilds an issued policy from a recorded event
    pub(crate) fn issued(
        policy_number: String,
        inception: DateTime<Utc>,
        expiry: DateTime<Utc>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            policy_number,
            inception,
            expiry,
            issued_at,
            cancellation_effective: None,
            adjustment_count: 0,
            renewal_count: 0,
        }
    }

    pub fn policy_number(&self) -> &str {
        &self.policy_number
    }

    pub fn inception(&self) -> DateTime<Utc> {
        self.inception
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn cancellation_effective(&self) -> Option<DateTime<Utc>> {
        self.cancellation_effective
    }

    pub fn adjustment_count(&self) -> u32 {
        self.adjustment_count
    }

    pub fn renewal_count(&self) -> u32 {
        self.renewal_count
    }

    /// A recorded cancellation wins over every date-based status
    pub fn status_at(&self, now: DateTime<Utc>) -> PolicyStatus {
        if self.cancellation_effective.is_some() {
            PolicyStatus::Cancelled
        } else if now < self.inception {
            PolicyStatus::Issued
        } else if now >= self.expiry {
            PolicyStatus::Expired
        } else {
            PolicyStatus::Active
        }
    }

    fn ensure_in_force(&self, now: DateTime<Utc>) -> Result<(), QuoteError> {
        match self.status_at(now) {
            PolicyStatus::Issued | PolicyStatus::Active => Ok(()),
            status => Err(QuoteError::PolicyNotModifiable {
                status: status.to_string(),
            }),
        }
    }

    fn ensure_within_term(&self, date: DateTime<Utc>, what: &str) -> Result<(), QuoteError> {
        if date < self.inception || date > self.expiry {
            return Err(QuoteError::invalid_date(format!(
                "{} {} is outside the policy period {} to {}",
                what, date, self.inception, self.expiry
            )));
        }
        Ok(())
    }

    pub fn validate_adjustment(&self, now: DateTime<Utc>) -> Result<(), QuoteError> {
        self.ensure_in_force(now)
    }

    /// Checks an adjustment being bound and its optional new expiry
    pub fn validate_adjustment_binding(
        &self,
        effective: DateTime<Utc>,
        new_expiry: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), QuoteError> {
        self.ensure_in_force(now)?;
        self.ensure_within_term(effective, "adjustment date")?;
        if let Some(expiry) = new_expiry {
            if expiry <= effective {
                return Err(QuoteError::invalid_date("adjusted expiry must be after the adjustment date"));
            }
        }
        Ok(())
    }

    /// Renewal opens `window` before expiry and stays open after it
    pub fn validate_renewal(&self, window: Duration, now: DateTime<Utc>) -> Result<(), QuoteError> {
        if self.cancellation_effective.is_some() {
            return Err(QuoteError::PolicyNotModifiable {
                status: PolicyStatus::Cancelled.to_string(),
            });
        }
        let opens_at = self.expiry - window;
        if now < opens_at {
            return Err(QuoteError::NotInRenewalWindow { opens_at });
        }
        Ok(())
    }

    pub fn validate_renewal_binding(&self, new_expiry: DateTime<Utc>) -> Result<(), QuoteError> {
        if self.cancellation_effective.is_some() {
            return Err(QuoteError::PolicyNotModifiable {
                status: PolicyStatus::Cancelled.to_string(),
            });
        }
        if new_expiry <= self.expiry {
            return Err(QuoteError::invalid_date("renewed expiry must be after the current expiry"));
        }
        Ok(())
    }

    pub fn validate_cancellation(&self, now: DateTime<Utc>) -> Result<(), QuoteError> {
        self.ensure_in_force(now)
    }

    pub fn validate_cancellation_binding(
        &self,
        effective: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), QuoteError> {
        self.ensure_in_force(now)?;
        self.ensure_within_term(effective, "cancellation date")
    }

    pub(crate) fn record_adjustment(&mut self, new_expiry: Option<DateTime<Utc>>) {
        if let Some(expiry) = new_expiry {
            self.expiry = expiry;
        }
        self.adjustment_count += 1;
    }

    pub(crate) fn record_renewal(&mut self, new_expiry: DateTime<Utc>) {
        self.expiry = new_expiry;
        self.renewal_count += 1;
    }

    pub(crate) fn record_cancellation(&mut self, effective: DateTime<Utc>) {
        self.cancellation_effective = Some(effective);
    }
}
