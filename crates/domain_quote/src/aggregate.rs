//! Quote Aggregate Root
//!
//! One aggregate exists per (potential) policy. It holds the new business
//! quote, every later adjustment, renewal and cancellation quote, the policy
//! once issued and the financial documents issued along the way.
//!
//! # Invariants
//!
//! - Only the genesis event may create the aggregate
//! - A quote that is discarded, expired, complete or declined never changes
//! - At most one adjustment, renewal or cancellation quote is in progress
//! - Binding requires a binding calculation; a Decline trigger always
//!   blocks it, and binding straight from Incomplete also requires no
//!   referral triggers
//! - A policy is issued once; later binds adjust, renew or cancel it

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use core_kernel::{
    AggregateError, CustomerId, DeploymentEnvironment, DomainEvent, EventEnvelope, EventSourced,
    EventStream, Money, OrganisationId, PersonId, ProductId, QuoteAggregateId, QuoteId,
    QuoteVersionId, TenantId, UserId,
};

use crate::calculation::{CalculationResult, TriggerType};
use crate::error::QuoteError;
use crate::events::QuoteEvent;
use crate::policy::Policy;
use crate::quote::{Quote, QuoteType, QuoteVersion};
use crate::workflow::{QuoteAction, QuoteState};

/// Kind of financial document issued when a quote is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    Invoice,
    CreditNote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedDocument {
    pub kind: DocumentKind,
    pub number: String,
    pub quote_id: QuoteId,
    pub total: Option<Money>,
    pub issued_at: DateTime<Utc>,
}

/// Parameters for opening a new quote aggregate
#[derive(Debug, Clone)]
pub struct NewQuoteAggregate {
    pub tenant_id: TenantId,
    pub aggregate_id: QuoteAggregateId,
    pub organisation_id: OrganisationId,
    pub product_id: ProductId,
    pub environment: DeploymentEnvironment,
    pub is_test_data: bool,
    pub quote_id: QuoteId,
    pub form_data: Option<Value>,
}

/// Everything needed to bind a quote besides the quote itself
///
/// Which fields are required depends on the quote type:
///
/// | quote type   | `policy_number` | `effective`          | `expiry`            |
/// |--------------|-----------------|----------------------|---------------------|
/// | NewBusiness  | required        | inception            | required            |
/// | Adjustment   | ignored         | adjustment date      | optional new expiry |
/// | Renewal      | ignored         | ignored              | required            |
/// | Cancellation | ignored         | cancellation date    | ignored             |
///
/// `document_number` is the invoice number, or the credit note number for
/// cancellations.
#[derive(Debug, Clone)]
pub struct Binding {
    pub policy_number: Option<String>,
    pub document_number: String,
    pub effective: DateTime<Utc>,
    pub expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct QuoteAggregate {
    id: QuoteAggregateId,
    tenant_id: TenantId,
    organisation_id: OrganisationId,
    product_id: ProductId,
    environment: DeploymentEnvironment,
    is_test_data: bool,
    customer_id: Option<CustomerId>,
    customer_person_id: Option<PersonId>,
    owner_user_id: Option<UserId>,
    quotes: Vec<Quote>,
    policy: Option<Policy>,
    documents: Vec<IssuedDocument>,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    stream: EventStream<QuoteEvent>,
}

impl QuoteAggregate {
    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> QuoteAggregateId {
        self.id
    }

    pub fn organisation_id(&self) -> OrganisationId {
        self.organisation_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn environment(&self) -> DeploymentEnvironment {
        self.environment
    }

    pub fn is_test_data(&self) -> bool {
        self.is_test_data
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn customer_person_id(&self) -> Option<PersonId> {
        self.customer_person_id
    }

    pub fn owner_user_id(&self) -> Option<UserId> {
        self.owner_user_id
    }

    pub fn quotes(&self) -> &[Quote] {
        &self.quotes
    }

    pub fn policy(&self) -> Option<&Policy> {
        self.policy.as_ref()
    }

    pub fn documents(&self) -> &[IssuedDocument] {
        &self.documents
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Looks up a quote belonging to this aggregate
    pub fn quote(&self, quote_id: QuoteId) -> Result<&Quote, QuoteError> {
        self.quotes
            .iter()
            .find(|q| q.id == quote_id)
            .ok_or(QuoteError::QuoteNotFound(quote_id))
    }

    /// The quote that is not finished, if any
    pub fn quote_in_progress(&self, now: DateTime<Utc>) -> Option<&Quote> {
        self.quotes.iter().find(|q| q.is_in_progress(now))
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Opens a new aggregate with a Nascent new business quote
    pub fn create_new_business(
        params: NewQuoteAggregate,
        performing_user_id: Option<UserId>,
    ) -> Result<Self, QuoteError> {
        let event = QuoteEvent::QuoteAggregateInitialized {
            organisation_id: params.organisation_id,
            product_id: params.product_id,
            environment: params.environment,
            is_test_data: params.is_test_data,
            quote_id: params.quote_id,
            form_data: params.form_data.unwrap_or_else(|| json!({})),
        };
        let aggregate = <Self as EventSourced>::create(
            params.tenant_id,
            *params.aggregate_id.as_uuid(),
            event,
            performing_user_id,
        )?;
        Ok(aggregate)
    }

    /// Gives the quote its human-readable reference; only once
    pub fn assign_quote_number(
        &mut self,
        quote_id: QuoteId,
        quote_number: impl Into<String>,
        performing_user_id: Option<UserId>,
    ) -> Result<(), QuoteError> {
        let quote = self.quote(quote_id)?;
        if quote.quote_number.is_some() {
            return Err(QuoteError::QuoteNumberAlreadyAssigned(quote_id));
        }
        let quote_number = quote_number.into();
        if quote_number.trim().is_empty() {
            return Err(QuoteError::validation("quote number must not be empty"));
        }
        self.record(
            QuoteEvent::QuoteNumberAssigned {
                quote_id,
                quote_number,
            },
            performing_user_id,
        )
    }

    /// Replaces the quote's form data, actualising a Nascent quote
    pub fn update_form_data(
        &mut self,
        quote_id: QuoteId,
        form_data: Value,
        performing_user_id: Option<UserId>,
    ) -> Result<(), QuoteError> {
        let quote = self.mutable_quote(quote_id, Utc::now())?;
        let actualise = quote.state == QuoteState::Nascent;

        self.record(QuoteEvent::FormDataUpdated { quote_id, form_data }, performing_user_id)?;
        if actualise {
            self.change_state(quote_id, QuoteAction::Actualise, performing_user_id)?;
        }
        Ok(())
    }

    /// Stores a new calculation result for the quote
    pub fn record_calculation(
        &mut self,
        quote_id: QuoteId,
        calculation: CalculationResult,
        performing_user_id: Option<UserId>,
    ) -> Result<(), QuoteError> {
        self.mutable_quote(quote_id, Utc::now())?;
        self.record(
            QuoteEvent::CalculationResultCreated {
                quote_id,
                calculation,
            },
            performing_user_id,
        )
    }

    /// Performs a workflow action other than binding
    ///
    /// # Errors
    ///
    /// - `QuoteNotMutable` if the quote is finished
    /// - `InvalidStateTransition` if the action is not allowed from the
    ///   current state, or is `Policy` (use [`QuoteAggregate::bind`])
    /// - `NotBindable` for AutoApproval without a trigger-free binding
    ///   calculation
    pub fn perform_action(
        &mut self,
        quote_id: QuoteId,
        action: QuoteAction,
        performing_user_id: Option<UserId>,
    ) -> Result<QuoteState, QuoteError> {
        let quote = self.mutable_quote(quote_id, Utc::now())?;

        if action == QuoteAction::Policy {
            return Err(QuoteError::InvalidStateTransition {
                action: format!("{} (without binding)", action),
                from: quote.state.to_string(),
            });
        }

        if action == QuoteAction::AutoApproval {
            let approvable = quote
                .latest_calculation
                .as_ref()
                .is_some_and(|c| c.is_binding() && !c.has_triggers());
            if !approvable {
                return Err(QuoteError::not_bindable(
                    "auto approval requires a binding calculation without triggers",
                ));
            }
        }

        self.change_state(quote_id, action, performing_user_id)
    }

    /// Marks the quote as submitted; allowed once from Incomplete or Approved
    pub fn submit(
        &mut self,
        quote_id: QuoteId,
        performing_user_id: Option<UserId>,
    ) -> Result<(), QuoteError> {
        let quote = self.mutable_quote(quote_id, Utc::now())?;
        if quote.submitted {
            return Err(QuoteError::AlreadySubmitted(quote_id));
        }
        if !matches!(quote.state, QuoteState::Incomplete | QuoteState::Approved) {
            return Err(QuoteError::InvalidStateTransition {
                action: "Submit".to_string(),
                from: quote.state.to_string(),
            });
        }
        self.record(QuoteEvent::QuoteSubmitted { quote_id }, performing_user_id)
    }

    /// Snapshots the current form data and calculation as a new version
    pub fn create_version(
        &mut self,
        quote_id: QuoteId,
        performing_user_id: Option<UserId>,
    ) -> Result<QuoteVersionId, QuoteError> {
        let quote = self.mutable_quote(quote_id, Utc::now())?;
        let version_number = quote.versions.len() as u32 + 1;
        let version_id = QuoteVersionId::new();
        self.record(
            QuoteEvent::QuoteVersionCreated {
                quote_id,
                version_id,
                version_number,
            },
            performing_user_id,
        )?;
        Ok(version_id)
    }

    pub fn set_expiry(
        &mut self,
        quote_id: QuoteId,
        expiry: DateTime<Utc>,
        performing_user_id: Option<UserId>,
    ) -> Result<(), QuoteError> {
        self.mutable_quote(quote_id, Utc::now())?;
        self.record(QuoteEvent::QuoteExpiryDateSet { quote_id, expiry }, performing_user_id)
    }

    pub fn discard(&mut self, quote_id: QuoteId, performing_user_id: Option<UserId>) -> Result<(), QuoteError> {
        self.mutable_quote(quote_id, Utc::now())?;
        self.record(QuoteEvent::QuoteDiscarded { quote_id }, performing_user_id)
    }

    pub fn assign_customer(
        &mut self,
        customer_id: CustomerId,
        person_id: Option<PersonId>,
        performing_user_id: Option<UserId>,
    ) -> Result<(), QuoteError> {
        self.record(
            QuoteEvent::CustomerAssigned {
                customer_id,
                person_id,
            },
            performing_user_id,
        )
    }

    pub fn assign_owner(&mut self, owner_user_id: UserId, performing_user_id: Option<UserId>) -> Result<(), QuoteError> {
        self.record(QuoteEvent::OwnershipAssigned { owner_user_id }, performing_user_id)
    }

    /// Opens an adjustment quote against an issued or active policy
    pub fn create_adjustment_quote(
        &mut self,
        quote_id: QuoteId,
        now: DateTime<Utc>,
        performing_user_id: Option<UserId>,
    ) -> Result<(), QuoteError> {
        self.policy_transaction_allowed(now)?.validate_adjustment(now)?;
        let form_data = self.latest_policy_form_data();
        self.record(QuoteEvent::AdjustmentQuoteCreated { quote_id, form_data }, performing_user_id)
    }

    /// Opens a renewal quote once the renewal window has opened
    pub fn create_renewal_quote(
        &mut self,
        quote_id: QuoteId,
        renewal_window: Duration,
        now: DateTime<Utc>,
        performing_user_id: Option<UserId>,
    ) -> Result<(), QuoteError> {
        self.policy_transaction_allowed(now)?
            .validate_renewal(renewal_window, now)?;
        let form_data = self.latest_policy_form_data();
        self.record(QuoteEvent::RenewalQuoteCreated { quote_id, form_data }, performing_user_id)
    }

    /// Opens a cancellation quote against an issued or active policy
    pub fn create_cancellation_quote(
        &mut self,
        quote_id: QuoteId,
        now: DateTime<Utc>,
        performing_user_id: Option<UserId>,
    ) -> Result<(), QuoteError> {
        self.policy_transaction_allowed(now)?.validate_cancellation(now)?;
        let form_data = self.latest_policy_form_data();
        self.record(QuoteEvent::CancellationQuoteCreated { quote_id, form_data }, performing_user_id)
    }

    /// Binds a quote: completes it, issues or changes the policy and issues
    /// an invoice (a credit note for cancellations)
    ///
    /// # Errors
    ///
    /// - `QuoteNotMutable` / `InvalidStateTransition` from the workflow
    /// - `NotBindable` when the calculation does not permit binding
    /// - `PolicyAlreadyIssued`, `NoPolicy`, `PolicyNotModifiable` or
    ///   `InvalidDate` when the policy change is not possible
    pub fn bind(
        &mut self,
        quote_id: QuoteId,
        binding: Binding,
        now: DateTime<Utc>,
        performing_user_id: Option<UserId>,
    ) -> Result<(), QuoteError> {
        let quote = self.mutable_quote(quote_id, now)?;
        quote.state.transition(QuoteAction::Policy)?;

        let calculation = quote
            .latest_calculation
            .as_ref()
            .filter(|c| c.is_binding())
            .ok_or_else(|| QuoteError::not_bindable("the quote has no binding calculation"))?;
        if calculation.has_trigger(TriggerType::Decline) {
            return Err(QuoteError::not_bindable("the calculation has a decline trigger"));
        }
        if quote.state == QuoteState::Incomplete && calculation.has_blocking_triggers() {
            return Err(QuoteError::not_bindable(
                "the calculation has referral triggers; the quote must be approved first",
            ));
        }
        let total = calculation.total();
        let quote_type = quote.quote_type;

        let (policy_event, document_event) = match quote_type {
            QuoteType::NewBusiness => {
                if self.policy.is_some() {
                    return Err(QuoteError::PolicyAlreadyIssued);
                }
                let policy_number = binding
                    .policy_number
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| QuoteError::validation("a policy number is required"))?;
                let expiry = binding
                    .expiry
                    .ok_or_else(|| QuoteError::invalid_date("an expiry date is required"))?;
                // Validates the policy period
                Policy::issue(policy_number.clone(), binding.effective, expiry, now)?;
                (
                    QuoteEvent::PolicyIssued {
                        quote_id,
                        policy_number,
                        inception: binding.effective,
                        expiry,
                    },
                    self.invoice(quote_id, binding.document_number, total),
                )
            }
            QuoteType::Adjustment => {
                self.existing_policy()?
                    .validate_adjustment_binding(binding.effective, binding.expiry, now)?;
                (
                    QuoteEvent::PolicyAdjusted {
                        quote_id,
                        effective: binding.effective,
                        new_expiry: binding.expiry,
                    },
                    self.invoice(quote_id, binding.document_number, total),
                )
            }
            QuoteType::Renewal => {
                let new_expiry = binding
                    .expiry
                    .ok_or_else(|| QuoteError::invalid_date("a renewed expiry date is required"))?;
                self.existing_policy()?.validate_renewal_binding(new_expiry)?;
                (
                    QuoteEvent::PolicyRenewed { quote_id, new_expiry },
                    self.invoice(quote_id, binding.document_number, total),
                )
            }
            QuoteType::Cancellation => {
                self.existing_policy()?
                    .validate_cancellation_binding(binding.effective, now)?;
                (
                    QuoteEvent::PolicyCancelled {
                        quote_id,
                        effective: binding.effective,
                    },
                    QuoteEvent::CreditNoteIssued {
                        quote_id,
                        credit_note_number: binding.document_number,
                        total,
                    },
                )
            }
        };

        if document_number_of(&document_event).trim().is_empty() {
            return Err(QuoteError::validation("a document number is required"));
        }

        self.change_state(quote_id, QuoteAction::Policy, performing_user_id)?;
        self.record(policy_event, performing_user_id)?;
        self.record(document_event, performing_user_id)
    }

    /// Records a rollback to `sequence`
    ///
    /// Replay discards the events after `sequence`; this instance keeps its
    /// pre-rollback state and must be reloaded after saving.
    pub fn rollback_to(&mut self, sequence: u64, performing_user_id: Option<UserId>) -> Result<(), QuoteError> {
        self.rollback_event_allowed(sequence)?;
        self.record(
            QuoteEvent::AggregateRolledBack {
                rollback_to_sequence: sequence,
            },
            performing_user_id,
        )
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn record(&mut self, event: QuoteEvent, performing_user_id: Option<UserId>) -> Result<(), QuoteError> {
        self.raise(event, performing_user_id)?;
        Ok(())
    }

    fn change_state(
        &mut self,
        quote_id: QuoteId,
        action: QuoteAction,
        performing_user_id: Option<UserId>,
    ) -> Result<QuoteState, QuoteError> {
        let from = self.quote(quote_id)?.state;
        let to = from.transition(action)?;
        self.record(
            QuoteEvent::QuoteStateChanged {
                quote_id,
                action,
                from,
                to,
            },
            performing_user_id,
        )?;
        Ok(to)
    }

    fn mutable_quote(&self, quote_id: QuoteId, now: DateTime<Utc>) -> Result<&Quote, QuoteError> {
        let quote = self.quote(quote_id)?;
        quote.ensure_mutable(now)?;
        Ok(quote)
    }

    fn existing_policy(&self) -> Result<&Policy, QuoteError> {
        self.policy.as_ref().ok_or(QuoteError::NoPolicy)
    }

    /// A policy exists and no other quote is open
    fn policy_transaction_allowed(&self, now: DateTime<Utc>) -> Result<&Policy, QuoteError> {
        let policy = self.existing_policy()?;
        if let Some(open) = self.quote_in_progress(now) {
            return Err(QuoteError::QuoteInProgress(open.id));
        }
        Ok(policy)
    }

    /// Form data of the most recently bound quote
    fn latest_policy_form_data(&self) -> Value {
        self.quotes
            .iter()
            .rev()
            .find(|q| q.state == QuoteState::Complete)
            .map(|q| q.form_data.clone())
            .unwrap_or_else(|| json!({}))
    }

    fn invoice(&self, quote_id: QuoteId, invoice_number: String, total: Option<Money>) -> QuoteEvent {
        QuoteEvent::InvoiceIssued {
            quote_id,
            invoice_number,
            total,
        }
    }

    fn quote_mut(&mut self, quote_id: QuoteId, event_type: &'static str) -> Result<&mut Quote, AggregateError> {
        self.quotes
            .iter_mut()
            .find(|q| q.id == quote_id)
            .ok_or_else(|| AggregateError::UnknownEntity {
                event_type,
                entity_id: quote_id.to_string(),
            })
    }

    fn policy_mut(&mut self, event_type: &'static str) -> Result<&mut Policy, AggregateError> {
        let aggregate_id = self.id;
        self.policy.as_mut().ok_or_else(|| AggregateError::UnknownEntity {
            event_type,
            entity_id: format!("policy of {}", aggregate_id),
        })
    }
}

fn document_number_of(event: &QuoteEvent) -> &str {
    match event {
        QuoteEvent::InvoiceIssued { invoice_number, .. } => invoice_number,
        QuoteEvent::CreditNoteIssued {
            credit_note_number, ..
        } => credit_note_number,
        _ => "",
    }
}

impl EventSourced for QuoteAggregate {
    type Event = QuoteEvent;
    const AGGREGATE_TYPE: &'static str = "quote";

    fn originate(envelope: &EventEnvelope<QuoteEvent>) -> Result<Self, AggregateError> {
        match &envelope.event {
            QuoteEvent::QuoteAggregateInitialized {
                organisation_id,
                product_id,
                environment,
                is_test_data,
                quote_id,
                form_data,
            } => Ok(Self {
                id: QuoteAggregateId::from_uuid(envelope.aggregate_id),
                tenant_id: envelope.tenant_id,
                organisation_id: *organisation_id,
                product_id: *product_id,
                environment: *environment,
                is_test_data: *is_test_data,
                customer_id: None,
                customer_person_id: None,
                owner_user_id: None,
                quotes: vec![Quote::new(
                    *quote_id,
                    QuoteType::NewBusiness,
                    form_data.clone(),
                    envelope.created_at,
                )],
                policy: None,
                documents: Vec::new(),
                created_at: envelope.created_at,
                last_modified: envelope.created_at,
                stream: EventStream::new(),
            }),
            other => Err(AggregateError::NotAGenesisEvent {
                aggregate_type: Self::AGGREGATE_TYPE,
                event_type: other.event_type(),
            }),
        }
    }

    fn evolve(&mut self, envelope: &EventEnvelope<QuoteEvent>) -> Result<(), AggregateError> {
        let at = envelope.created_at;
        let event_type = envelope.event.event_type();

        match &envelope.event {
            QuoteEvent::QuoteAggregateInitialized { .. } => {
                return Err(AggregateError::UnexpectedGenesis {
                    aggregate_type: Self::AGGREGATE_TYPE,
                    event_type,
                });
            }
            QuoteEvent::AdjustmentQuoteCreated { quote_id, form_data } => {
                self.quotes
                    .push(Quote::new(*quote_id, QuoteType::Adjustment, form_data.clone(), at));
            }
            QuoteEvent::RenewalQuoteCreated { quote_id, form_data } => {
                self.quotes
                    .push(Quote::new(*quote_id, QuoteType::Renewal, form_data.clone(), at));
            }
            QuoteEvent::CancellationQuoteCreated { quote_id, form_data } => {
                self.quotes
                    .push(Quote::new(*quote_id, QuoteType::Cancellation, form_data.clone(), at));
            }
            QuoteEvent::QuoteNumberAssigned {
                quote_id,
                quote_number,
            } => {
                self.quote_mut(*quote_id, event_type)?.quote_number = Some(quote_number.clone());
            }
            QuoteEvent::FormDataUpdated { quote_id, form_data } => {
                self.quote_mut(*quote_id, event_type)?.form_data = form_data.clone();
            }
            QuoteEvent::CalculationResultCreated {
                quote_id,
                calculation,
            } => {
                self.quote_mut(*quote_id, event_type)?.latest_calculation = Some(calculation.clone());
            }
            QuoteEvent::CustomerAssigned {
                customer_id,
                person_id,
            } => {
                self.customer_id = Some(*customer_id);
                self.customer_person_id = *person_id;
            }
            QuoteEvent::OwnershipAssigned { owner_user_id } => {
                self.owner_user_id = Some(*owner_user_id);
            }
            QuoteEvent::QuoteStateChanged { quote_id, to, .. } => {
                self.quote_mut(*quote_id, event_type)?.state = *to;
            }
            QuoteEvent::QuoteSubmitted { quote_id } => {
                self.quote_mut(*quote_id, event_type)?.submitted = true;
            }
            QuoteEvent::QuoteVersionCreated {
                quote_id,
                version_id,
                version_number,
            } => {
                let quote = self.quote_mut(*quote_id, event_type)?;
                let version = QuoteVersion {
                    version_id: *version_id,
                    version_number: *version_number,
                    form_data: quote.form_data.clone(),
                    calculation: quote.latest_calculation.clone(),
                    created_at: at,
                };
                quote.versions.push(version);
            }
            QuoteEvent::QuoteExpiryDateSet { quote_id, expiry } => {
                self.quote_mut(*quote_id, event_type)?.expiry = Some(*expiry);
            }
            QuoteEvent::QuoteDiscarded { quote_id } => {
                self.quote_mut(*quote_id, event_type)?.discarded = true;
            }
            QuoteEvent::InvoiceIssued {
                quote_id,
                invoice_number,
                total,
            } => {
                self.documents.push(IssuedDocument {
                    kind: DocumentKind::Invoice,
                    number: invoice_number.clone(),
                    quote_id: *quote_id,
                    total: *total,
                    issued_at: at,
                });
            }
            QuoteEvent::CreditNoteIssued {
                quote_id,
                credit_note_number,
                total,
            } => {
                self.documents.push(IssuedDocument {
                    kind: DocumentKind::CreditNote,
                    number: credit_note_number.clone(),
                    quote_id: *quote_id,
                    total: *total,
                    issued_at: at,
                });
            }
            QuoteEvent::PolicyIssued {
                policy_number,
                inception,
                expiry,
                ..
            } => {
                self.policy = Some(Policy::issued(policy_number.clone(), *inception, *expiry, at));
            }
            QuoteEvent::PolicyAdjusted { new_expiry, .. } => {
                self.policy_mut(event_type)?.record_adjustment(*new_expiry);
            }
            QuoteEvent::PolicyRenewed { new_expiry, .. } => {
                self.policy_mut(event_type)?.record_renewal(*new_expiry);
            }
            QuoteEvent::PolicyCancelled { effective, .. } => {
                self.policy_mut(event_type)?.record_cancellation(*effective);
            }
            // Resolved on replay
            QuoteEvent::AggregateRolledBack { .. } => {}
        }

        if let Some(quote_id) = envelope.event.quote_id() {
            if let Some(quote) = self.quotes.iter_mut().find(|q| q.id == quote_id) {
                quote.last_modified = at;
            }
        }
        self.last_modified = at;
        Ok(())
    }

    fn aggregate_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn stream(&self) -> &EventStream<QuoteEvent> {
        &self.stream
    }

    fn stream_mut(&mut self) -> &mut EventStream<QuoteEvent> {
        &mut self.stream
    }
}
