//! User handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use app_services::users::*;
use app_services::{RequestContext, UserReadModel};
use core_kernel::{OrganisationId, PersonId, UserId};
use domain_party::PersonDetails;

use crate::auth::{require_role, roles};
use crate::dto::users::*;
use crate::error::ApiResult;
use crate::AppState;

pub async fn create_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserReadModel>)> {
    require_role(&ctx, roles::ADMIN)?;
    request.validate()?;
    let user = state
        .mediator
        .send(
            CreateUser {
                organisation_id: OrganisationId::from_uuid(request.organisation_id),
                details: request.person_details(),
                login_email: request.login_email,
                roles: request.roles,
            },
            &ctx,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<Vec<UserReadModel>>> {
    let users = state
        .mediator
        .send(
            ListUsers {
                organisation_id: query.organisation_id.map(OrganisationId::from_uuid),
            },
            &ctx,
        )
        .await?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserReadModel>> {
    let user = state
        .mediator
        .send(GetUser { user_id: UserId::from_uuid(id) }, &ctx)
        .await?;
    Ok(Json(user))
}

pub async fn set_login_email(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<LoginEmailRequest>,
) -> ApiResult<Json<UserReadModel>> {
    require_role(&ctx, roles::ADMIN)?;
    request.validate()?;
    let user = state
        .mediator
        .send(
            SetLoginEmail {
                user_id: UserId::from_uuid(id),
                login_email: request.login_email,
            },
            &ctx,
        )
        .await?;
    Ok(Json(user))
}

pub async fn assign_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<RoleRequest>,
) -> ApiResult<Json<UserReadModel>> {
    require_role(&ctx, roles::ADMIN)?;
    request.validate()?;
    let user = state
        .mediator
        .send(
            AssignRole {
                user_id: UserId::from_uuid(id),
                role: request.role,
            },
            &ctx,
        )
        .await?;
    Ok(Json(user))
}

pub async fn retract_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((id, role)): Path<(Uuid, String)>,
) -> ApiResult<Json<UserReadModel>> {
    require_role(&ctx, roles::ADMIN)?;
    let user = state
        .mediator
        .send(
            RetractRole {
                user_id: UserId::from_uuid(id),
                role,
            },
            &ctx,
        )
        .await?;
    Ok(Json(user))
}

pub async fn block_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserReadModel>> {
    require_role(&ctx, roles::ADMIN)?;
    let user = state
        .mediator
        .send(BlockUser { user_id: UserId::from_uuid(id) }, &ctx)
        .await?;
    Ok(Json(user))
}

pub async fn unblock_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserReadModel>> {
    require_role(&ctx, roles::ADMIN)?;
    let user = state
        .mediator
        .send(UnblockUser { user_id: UserId::from_uuid(id) }, &ctx)
        .await?;
    Ok(Json(user))
}

pub async fn create_invitation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<InvitationResponse>)> {
    require_role(&ctx, roles::ADMIN)?;
    let invitation_id = state
        .mediator
        .send(CreateActivationInvitation { user_id: UserId::from_uuid(id) }, &ctx)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(InvitationResponse {
            invitation_id: *invitation_id.as_uuid(),
        }),
    ))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<Json<UserReadModel>> {
    request.validate()?;
    let user = state
        .mediator
        .send(
            ChangePassword {
                user_id: UserId::from_uuid(id),
                current_password: request.current_password,
                new_password: request.new_password,
            },
            &ctx,
        )
        .await?;
    Ok(Json(user))
}

/// Updates a person; responds with the user when the person has a login
pub async fn update_person(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(person_id): Path<Uuid>,
    Json(details): Json<PersonDetails>,
) -> ApiResult<Response> {
    details.validate()?;
    let user = state
        .mediator
        .send(
            UpdatePersonDetails {
                person_id: PersonId::from_uuid(person_id),
                details,
            },
            &ctx,
        )
        .await?;
    Ok(match user {
        Some(user) => Json(user).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}
