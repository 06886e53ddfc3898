//! Quote handlers
//!
//! Routes address a quote by id. Commands also need the owning aggregate,
//! which is looked up from the quote's read model first; a quote never
//! moves between aggregates.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use app_services::quotes::*;
use app_services::{QuoteReadModel, RequestContext};
use core_kernel::{CustomerId, OrganisationId, PersonId, ProductId, QuoteAggregateId, QuoteId};

use crate::auth::{require_role, roles};
use crate::dto::quotes::*;
use crate::error::ApiResult;
use crate::AppState;

async fn locate(state: &AppState, ctx: &RequestContext, quote_id: Uuid) -> ApiResult<(QuoteAggregateId, QuoteId)> {
    let quote_id = QuoteId::from_uuid(quote_id);
    let quote = state.mediator.send(GetQuote { quote_id }, ctx).await?;
    Ok((quote.aggregate_id, quote_id))
}

pub async fn create_quote(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<CreateQuoteRequest>,
) -> ApiResult<(StatusCode, Json<QuoteReadModel>)> {
    let quote = state
        .mediator
        .send(
            CreateQuote {
                organisation_id: OrganisationId::from_uuid(request.organisation_id),
                product_id: ProductId::from_uuid(request.product_id),
                form_data: request.form_data,
                is_test_data: request.is_test_data,
            },
            &ctx,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(quote)))
}

pub async fn list_quotes(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListQuotesQuery>,
) -> ApiResult<Json<Vec<QuoteReadModel>>> {
    let quotes = state.mediator.send(ListQuotes { filter: query.into() }, &ctx).await?;
    Ok(Json(quotes))
}

pub async fn get_quote(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QuoteReadModel>> {
    let quote = state
        .mediator
        .send(GetQuote { quote_id: QuoteId::from_uuid(id) }, &ctx)
        .await?;
    Ok(Json(quote))
}

pub async fn update_form_data(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<FormDataRequest>,
) -> ApiResult<Json<QuoteReadModel>> {
    let (aggregate_id, quote_id) = locate(&state, &ctx, id).await?;
    let quote = state
        .mediator
        .send(
            UpdateQuoteFormData {
                aggregate_id,
                quote_id,
                form_data: request.form_data,
            },
            &ctx,
        )
        .await?;
    Ok(Json(quote))
}

pub async fn calculate(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QuoteReadModel>> {
    let (aggregate_id, quote_id) = locate(&state, &ctx, id).await?;
    let quote = state
        .mediator
        .send(CalculateQuote { aggregate_id, quote_id }, &ctx)
        .await?;
    Ok(Json(quote))
}

pub async fn perform_action(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<QuoteActionRequest>,
) -> ApiResult<Json<QuoteReadModel>> {
    let (aggregate_id, quote_id) = locate(&state, &ctx, id).await?;
    let quote = state
        .mediator
        .send(
            PerformQuoteAction {
                aggregate_id,
                quote_id,
                action: request.action,
            },
            &ctx,
        )
        .await?;
    Ok(Json(quote))
}

pub async fn submit(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QuoteReadModel>> {
    let (aggregate_id, quote_id) = locate(&state, &ctx, id).await?;
    let quote = state.mediator.send(SubmitQuote { aggregate_id, quote_id }, &ctx).await?;
    Ok(Json(quote))
}

pub async fn bind(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<BindRequest>,
) -> ApiResult<Json<QuoteReadModel>> {
    let (aggregate_id, quote_id) = locate(&state, &ctx, id).await?;
    let quote = state
        .mediator
        .send(
            BindQuote {
                aggregate_id,
                quote_id,
                effective_date: request.effective_date,
                expiry_date: request.expiry_date,
            },
            &ctx,
        )
        .await?;
    Ok(Json(quote))
}

pub async fn discard(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<QuoteReadModel>> {
    let (aggregate_id, quote_id) = locate(&state, &ctx, id).await?;
    let quote = state.mediator.send(DiscardQuote { aggregate_id, quote_id }, &ctx).await?;
    Ok(Json(quote))
}

pub async fn set_expiry(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<ExpiryRequest>,
) -> ApiResult<Json<QuoteReadModel>> {
    let (aggregate_id, quote_id) = locate(&state, &ctx, id).await?;
    let quote = state
        .mediator
        .send(
            SetQuoteExpiry {
                aggregate_id,
                quote_id,
                expiry: request.expiry,
            },
            &ctx,
        )
        .await?;
    Ok(Json(quote))
}

/// Assigns the customer to every quote of the aggregate
pub async fn assign_customer(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<AssignCustomerRequest>,
) -> ApiResult<Json<Vec<QuoteReadModel>>> {
    let (aggregate_id, _) = locate(&state, &ctx, id).await?;
    let quotes = state
        .mediator
        .send(
            AssignQuoteCustomer {
                aggregate_id,
                customer_id: CustomerId::from_uuid(request.customer_id),
                person_id: request.person_id.map(PersonId::from_uuid),
            },
            &ctx,
        )
        .await?;
    Ok(Json(quotes))
}

pub async fn create_adjustment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<QuoteReadModel>)> {
    let (aggregate_id, _) = locate(&state, &ctx, id).await?;
    let quote = state.mediator.send(CreateAdjustmentQuote { aggregate_id }, &ctx).await?;
    Ok((StatusCode::CREATED, Json(quote)))
}

pub async fn create_renewal(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<QuoteReadModel>)> {
    let (aggregate_id, _) = locate(&state, &ctx, id).await?;
    let quote = state.mediator.send(CreateRenewalQuote { aggregate_id }, &ctx).await?;
    Ok((StatusCode::CREATED, Json(quote)))
}

pub async fn create_cancellation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<QuoteReadModel>)> {
    let (aggregate_id, _) = locate(&state, &ctx, id).await?;
    let quote = state.mediator.send(CreateCancellationQuote { aggregate_id }, &ctx).await?;
    Ok((StatusCode::CREATED, Json(quote)))
}

pub async fn rollback(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<RollbackRequest>,
) -> ApiResult<Json<Vec<QuoteReadModel>>> {
    require_role(&ctx, roles::ADMIN)?;
    request.validate()?;
    let (aggregate_id, _) = locate(&state, &ctx, id).await?;
    let quotes = state
        .mediator
        .send(
            RollbackQuoteAggregate {
                aggregate_id,
                sequence: request.sequence,
            },
            &ctx,
        )
        .await?;
    Ok(Json(quotes))
}

pub async fn load_numbers(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(product_id): Path<Uuid>,
    Json(request): Json<LoadNumbersRequest>,
) -> ApiResult<Json<LoadNumbersResponse>> {
    require_role(&ctx, roles::ADMIN)?;
    request.validate()?;
    let added = state
        .mediator
        .send(
            LoadNumbers {
                product_id: ProductId::from_uuid(product_id),
                kind: request.kind,
                numbers: request.numbers,
            },
            &ctx,
        )
        .await?;
    Ok(Json(LoadNumbersResponse { added }))
}
