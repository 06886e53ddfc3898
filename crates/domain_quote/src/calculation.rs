//! Calculation results
//!
//! A calculation result is the output of rating a quote's form data: how
//! complete the calculation is, any triggers raised by product rules and,
//! when enough data is present, the price.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{Money, MoneyError, Rate};

/// How far along a calculation is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CalculationState {
    /// Required rating fields are missing
    Incomplete,
    /// Enough data for an indicative price only
    PremiumEstimate,
    /// All fields present but the result is not bindable
    PremiumComplete,
    /// The price may be bound as a policy
    BindingQuote,
}

impl fmt::Display for CalculationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CalculationState::Incomplete => "Incomplete",
            CalculationState::PremiumEstimate => "PremiumEstimate",
            CalculationState::PremiumComplete => "PremiumComplete",
            CalculationState::BindingQuote => "BindingQuote",
        };
        f.write_str(s)
    }
}

/// Category of a rating trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerType {
    Decline,
    Review,
    Endorsement,
    Error,
}

/// A condition raised by product rules during rating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationTrigger {
    pub trigger_type: TriggerType,
    pub name: String,
    pub message: String,
}

impl CalculationTrigger {
    pub fn new(trigger_type: TriggerType, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            trigger_type,
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Premium and the taxes layered on top of it
///
/// GST is charged on base premium plus emergency services levy; stamp duty
/// is charged on all three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base_premium: Money,
    pub esl: Money,
    pub gst: Money,
    pub stamp_duty: Money,
    pub total: Money,
}

impl PriceBreakdown {
    /// Builds a breakdown from the base premium and the applicable rates
    ///
    /// Every component is rounded to the currency's minor unit before the
    /// total is taken so the parts always add up to the total.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError` if components end up in different currencies
    pub fn calculate(
        base_premium: Money,
        esl_rate: Rate,
        gst_rate: Rate,
        stamp_duty_rate: Rate,
    ) -> Result<Self, MoneyError> {
        let base_premium = base_premium.round_to_currency();
        let esl = esl_rate.apply(&base_premium).round_to_currency();

        let gst_base = base_premium.checked_add(&esl)?;
        let gst = gst_rate.apply(&gst_base).round_to_currency();

        let duty_base = gst_base.checked_add(&gst)?;
        let stamp_duty = stamp_duty_rate.apply(&duty_base).round_to_currency();

        let total = duty_base.checked_add(&stamp_duty)?;

        Ok(Self {
            base_premium,
            esl,
            gst,
            stamp_duty,
            total,
        })
    }
}

/// Output of one rating run against a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub state: CalculationState,
    pub triggers: Vec<CalculationTrigger>,
    pub price: Option<PriceBreakdown>,
    pub calculated_at: DateTime<Utc>,
}

impl CalculationResult {
    pub fn new(
        state: CalculationState,
        triggers: Vec<CalculationTrigger>,
        price: Option<PriceBreakdown>,
    ) -> Self {
        Self {
            state,
            triggers,
            price,
            calculated_at: Utc::now(),
        }
    }

    pub fn is_binding(&self) -> bool {
        self.state == CalculationState::BindingQuote
    }

    pub fn has_trigger(&self, trigger_type: TriggerType) -> bool {
        self.triggers.iter().any(|t| t.trigger_type == trigger_type)
    }

    pub fn has_triggers(&self) -> bool {
        !self.triggers.is_empty()
    }

    /// Referral or decline triggers that stop a quote binding without approval
    pub fn has_blocking_triggers(&self) -> bool {
        self.has_trigger(TriggerType::Review)
            || self.has_trigger(TriggerType::Endorsement)
            || self.has_trigger(TriggerType::Decline)
    }

    pub fn total(&self) -> Option<Money> {
        self.price.as_ref().map(|p| p.total)
    }
}
