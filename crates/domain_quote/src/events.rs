//! Domain events of the quote aggregate
//!
//! Every change to a quote aggregate is one of these events. Timestamps and
//! the performing user travel on the
//! [`EventEnvelope`](core_kernel::EventEnvelope), not in the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use core_kernel::{
    CustomerId, DeploymentEnvironment, DomainEvent, Money, OrganisationId, PersonId, ProductId,
    QuoteId, QuoteVersionId, UserId,
};

use crate::calculation::CalculationResult;
use crate::workflow::{QuoteAction, QuoteState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuoteEvent {
    /// Genesis event; opens the new business quote
    QuoteAggregateInitialized {
        organisation_id: OrganisationId,
        product_id: ProductId,
        environment: DeploymentEnvironment,
        is_test_data: bool,
        quote_id: QuoteId,
        form_data: Value,
    },

    AdjustmentQuoteCreated {
        quote_id: QuoteId,
        form_data: Value,
    },

    RenewalQuoteCreated {
        quote_id: QuoteId,
        form_data: Value,
    },

    CancellationQuoteCreated {
        quote_id: QuoteId,
        form_data: Value,
    },

    QuoteNumberAssigned {
        quote_id: QuoteId,
        quote_number: String,
    },

    FormDataUpdated {
        quote_id: QuoteId,
        form_data: Value,
    },

    CalculationResultCreated {
        quote_id: QuoteId,
        calculation: CalculationResult,
    },

    CustomerAssigned {
        customer_id: CustomerId,
        person_id: Option<PersonId>,
    },

    OwnershipAssigned {
        owner_user_id: UserId,
    },

    QuoteStateChanged {
        quote_id: QuoteId,
        action: QuoteAction,
        from: QuoteState,
        to: QuoteState,
    },

    QuoteSubmitted {
        quote_id: QuoteId,
    },

    QuoteVersionCreated {
        quote_id: QuoteId,
        version_id: QuoteVersionId,
        version_number: u32,
    },

    QuoteExpiryDateSet {
        quote_id: QuoteId,
        expiry: DateTime<Utc>,
    },

    QuoteDiscarded {
        quote_id: QuoteId,
    },

    InvoiceIssued {
        quote_id: QuoteId,
        invoice_number: String,
        total: Option<Money>,
    },

    CreditNoteIssued {
        quote_id: QuoteId,
        credit_note_number: String,
        total: Option<Money>,
    },

    PolicyIssued {
        quote_id: QuoteId,
        policy_number: String,
        inception: DateTime<Utc>,
        expiry: DateTime<Utc>,
    },

    PolicyAdjusted {
        quote_id: QuoteId,
        effective: DateTime<Utc>,
        new_expiry: Option<DateTime<Utc>>,
    },

    PolicyRenewed {
        quote_id: QuoteId,
        new_expiry: DateTime<Utc>,
    },

    PolicyCancelled {
        quote_id: QuoteId,
        effective: DateTime<Utc>,
    },

    /// Discards every event after `rollback_to_sequence` on replay
    AggregateRolledBack {
        rollback_to_sequence: u64,
    },
}

impl QuoteEvent {
    /// The quote an event concerns, if it concerns a single quote
    pub fn quote_id(&self) -> Option<QuoteId> {
        match self {
            QuoteEvent::QuoteAggregateInitialized { quote_id, .. }
            | QuoteEvent::AdjustmentQuoteCreated { quote_id, .. }
            | QuoteEvent::RenewalQuoteCreated { quote_id, .. }
            | QuoteEvent::CancellationQuoteCreated { quote_id, .. }
            | QuoteEvent::QuoteNumberAssigned { quote_id, .. }
            | QuoteEvent::FormDataUpdated { quote_id, .. }
            | QuoteEvent::CalculationResultCreated { quote_id, .. }
            | QuoteEvent::QuoteStateChanged { quote_id, .. }
            | QuoteEvent::QuoteSubmitted { quote_id }
            | QuoteEvent::QuoteVersionCreated { quote_id, .. }
            | QuoteEvent::QuoteExpiryDateSet { quote_id, .. }
            | QuoteEvent::QuoteDiscarded { quote_id }
            | QuoteEvent::InvoiceIssued { quote_id, .. }
            | QuoteEvent::CreditNoteIssued { quote_id, .. }
            | QuoteEvent::PolicyIssued { quote_id, .. }
            | QuoteEvent::PolicyAdjusted { quote_id, .. }
            | QuoteEvent::PolicyRenewed { quote_id, .. }
            | QuoteEvent::PolicyCancelled { quote_id, .. } => Some(*quote_id),
            QuoteEvent::CustomerAssigned { .. }
            | QuoteEvent::OwnershipAssigned { .. }
            | QuoteEvent::AggregateRolledBack { .. } => None,
        }
    }
}

impl DomainEvent for QuoteEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QuoteEvent::QuoteAggregateInitialized { .. } => "QuoteAggregateInitialized",
            QuoteEvent::AdjustmentQuoteCreated { .. } => "AdjustmentQuoteCreated",
            QuoteEvent::RenewalQuoteCreated { .. } => "RenewalQuoteCreated",
            QuoteEvent::CancellationQuoteCreated { .. } => "CancellationQuoteCreated",
            QuoteEvent::QuoteNumberAssigned { .. } => "QuoteNumberAssigned",
            QuoteEvent::FormDataUpdated { .. } => "FormDataUpdated",
            QuoteEvent::CalculationResultCreated { .. } => "CalculationResultCreated",
            QuoteEvent::CustomerAssigned { .. } => "CustomerAssigned",
            QuoteEvent::OwnershipAssigned { .. } => "OwnershipAssigned",
            QuoteEvent::QuoteStateChanged { .. } => "QuoteStateChanged",
            QuoteEvent::QuoteSubmitted { .. } => "QuoteSubmitted",
            QuoteEvent::QuoteVersionCreated { .. } => "QuoteVersionCreated",
            QuoteEvent::QuoteExpiryDateSet { .. } => "QuoteExpiryDateSet",
            QuoteEvent::QuoteDiscarded { .. } => "QuoteDiscarded",
            QuoteEvent::InvoiceIssued { .. } => "InvoiceIssued",
            QuoteEvent::CreditNoteIssued { .. } => "CreditNoteIssued",
            QuoteEvent::PolicyIssued { .. } => "PolicyIssued",
            QuoteEvent::PolicyAdjusted { .. } => "PolicyAdjusted",
            QuoteEvent::PolicyRenewed { .. } => "PolicyRenewed",
            QuoteEvent::PolicyCancelled { .. } => "PolicyCancelled",
            QuoteEvent::AggregateRolledBack { .. } => "AggregateRolledBack",
        }
    }

    fn rollback_target(&self) -> Option<u64> {
        match self {
            QuoteEvent::AggregateRolledBack { rollback_to_sequence } => Some(*rollback_to_sequence),
            _ => None,
        }
    }
}
