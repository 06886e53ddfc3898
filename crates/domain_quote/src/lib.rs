//! Quote Domain
//!
//! Event-sourced quoting and policy administration for the uBind platform.
//!
//! # Architecture
//!
//! - **Aggregate**: [`QuoteAggregate`], one per policy, holding every quote
//!   raised against it and the policy once bound
//! - **Workflow**: a fixed state machine over [`QuoteState`] driven by
//!   [`QuoteAction`]s
//! - **Rating**: [`RatingEngine`] turns form data into a
//!   [`CalculationResult`] using per-product JSON rules
//! - **Numbering**: quote references are generated; policy, invoice and
//!   credit note numbers come from a [`NumberPool`]
//!
//! # Quote lifecycle
//!
//! ```text
//! Nascent -> Incomplete -> (Review | Endorsement) -> Approved -> Complete
//!                      \-> Declined
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let mut aggregate = QuoteAggregate::create_new_business(params, Some(user_id))?;
//! aggregate.update_form_data(quote_id, form_data, Some(user_id))?;
//! aggregate.record_calculation(quote_id, engine.calculate(product_id, &form_data)?, Some(user_id))?;
//! aggregate.bind(quote_id, binding, Utc::now(), Some(user_id))?;
//! repository.save(&mut aggregate).await?;
//! ```

pub mod aggregate;
pub mod calculation;
pub mod error;
pub mod events;
pub mod numbering;
pub mod policy;
pub mod quote;
pub mod rating;
pub mod workflow;

pub use aggregate::{Binding, DocumentKind, IssuedDocument, NewQuoteAggregate, QuoteAggregate};
pub use calculation::{CalculationResult, CalculationState, CalculationTrigger, PriceBreakdown, TriggerType};
pub use error::QuoteError;
pub use events::QuoteEvent;
pub use numbering::{NumberKind, NumberPool, NumberPoolKey, QuoteReferenceGenerator};
pub use policy::{Policy, PolicyStatus};
pub use quote::{Quote, QuoteType, QuoteVersion};
pub use rating::{ProductRules, RatingEngine, RatingError};
pub use workflow::{QuoteAction, QuoteState};
