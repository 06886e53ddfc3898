//! Quote DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use app_services::QuoteFilter;
use core_kernel::{CustomerId, OrganisationId};
use domain_quote::{NumberKind, QuoteAction, QuoteState};

#[derive(Debug, Deserialize)]
pub struct CreateQuoteRequest {
    pub organisation_id: Uuid,
    pub product_id: Uuid,
    pub form_data: Option<Value>,
    #[serde(default)]
    pub is_test_data: bool,
}

#[derive(Debug, Deserialize)]
pub struct FormDataRequest {
    pub form_data: Value,
}

#[derive(Debug, Deserialize)]
pub struct QuoteActionRequest {
    pub action: QuoteAction,
}

#[derive(Debug, Default, Deserialize)]
pub struct BindRequest {
    pub effective_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ExpiryRequest {
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AssignCustomerRequest {
    pub customer_id: Uuid,
    pub person_id: Option<Uuid>,
}

/// Highest sequence number the event store can hold
pub const MAX_SEQUENCE: u64 = i64::MAX as u64;

#[derive(Debug, Deserialize, Validate)]
pub struct RollbackRequest {
    #[validate(range(max = MAX_SEQUENCE, message = "sequence is out of range"))]
    pub sequence: u64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoadNumbersRequest {
    pub kind: NumberKind,
    #[validate(length(min = 1, max = 10000, message = "must contain between 1 and 10000 numbers"))]
    pub numbers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LoadNumbersResponse {
    pub added: usize,
}

/// Query string of `GET /quotes`
#[derive(Debug, Default, Deserialize)]
pub struct ListQuotesQuery {
    pub state: Option<QuoteState>,
    pub organisation_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub include_discarded: bool,
}

impl From<ListQuotesQuery> for QuoteFilter {
    fn from(query: ListQuotesQuery) -> Self {
        QuoteFilter {
            state: query.state,
            organisation_id: query.organisation_id.map(OrganisationId::from_uuid),
            customer_id: query.customer_id.map(CustomerId::from_uuid),
            include_discarded: query.include_discarded,
        }
    }
}
