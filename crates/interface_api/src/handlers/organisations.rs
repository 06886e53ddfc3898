//! Organisation handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use app_services::organisations::*;
use app_services::{OrganisationReadModel, RequestContext};
use core_kernel::OrganisationId;

use crate::auth::{require_role, roles};
use crate::dto::organisations::*;
use crate::error::ApiResult;
use crate::AppState;

pub async fn create_organisation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<CreateOrganisationRequest>,
) -> ApiResult<(StatusCode, Json<OrganisationReadModel>)> {
    require_role(&ctx, roles::ADMIN)?;
    request.validate()?;
    let organisation = state
        .mediator
        .send(
            CreateOrganisation {
                name: request.name,
                alias: request.alias,
            },
            &ctx,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(organisation)))
}

pub async fn list_organisations(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListOrganisationsQuery>,
) -> ApiResult<Json<Vec<OrganisationReadModel>>> {
    let organisations = state
        .mediator
        .send(
            ListOrganisations {
                include_deleted: query.include_deleted,
            },
            &ctx,
        )
        .await?;
    Ok(Json(organisations))
}

pub async fn get_organisation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OrganisationReadModel>> {
    let organisation = state
        .mediator
        .send(
            GetOrganisation {
                organisation_id: OrganisationId::from_uuid(id),
            },
            &ctx,
        )
        .await?;
    Ok(Json(organisation))
}

pub async fn get_organisation_by_alias(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(alias): Path<String>,
) -> ApiResult<Json<OrganisationReadModel>> {
    let organisation = state.mediator.send(GetOrganisationByAlias { alias }, &ctx).await?;
    Ok(Json(organisation))
}

pub async fn rename(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<RenameRequest>,
) -> ApiResult<Json<OrganisationReadModel>> {
    require_role(&ctx, roles::ADMIN)?;
    request.validate()?;
    let organisation = state
        .mediator
        .send(
            RenameOrganisation {
                organisation_id: OrganisationId::from_uuid(id),
                name: request.name,
            },
            &ctx,
        )
        .await?;
    Ok(Json(organisation))
}

pub async fn change_alias(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<AliasRequest>,
) -> ApiResult<Json<OrganisationReadModel>> {
    require_role(&ctx, roles::ADMIN)?;
    request.validate()?;
    let organisation = state
        .mediator
        .send(
            ChangeOrganisationAlias {
                organisation_id: OrganisationId::from_uuid(id),
                alias: request.alias,
            },
            &ctx,
        )
        .await?;
    Ok(Json(organisation))
}

pub async fn disable(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OrganisationReadModel>> {
    require_role(&ctx, roles::ADMIN)?;
    let organisation_id = OrganisationId::from_uuid(id);
    let organisation = state.mediator.send(DisableOrganisation { organisation_id }, &ctx).await?;
    Ok(Json(organisation))
}

pub async fn activate(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OrganisationReadModel>> {
    require_role(&ctx, roles::ADMIN)?;
    let organisation_id = OrganisationId::from_uuid(id);
    let organisation = state.mediator.send(ActivateOrganisation { organisation_id }, &ctx).await?;
    Ok(Json(organisation))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OrganisationReadModel>> {
    require_role(&ctx, roles::ADMIN)?;
    let organisation_id = OrganisationId::from_uuid(id);
    let organisation = state.mediator.send(DeleteOrganisation { organisation_id }, &ctx).await?;
    Ok(Json(organisation))
}
