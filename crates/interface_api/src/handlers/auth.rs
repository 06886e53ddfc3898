//! Login, activation and password reset
//!
//! Public routes: the context is built from the tenant in the body.

use axum::{extract::State, http::StatusCode, Json};
use tracing::info;
use validator::Validate;

use app_services::users::{ActivateUser, Login, RequestPasswordReset, ResetPassword};
use app_services::{RequestContext, UserReadModel};
use core_kernel::{DeploymentEnvironment, InvitationId, TenantId, UserId};

use crate::auth::{create_token, Claims};
use crate::dto::auth::*;
use crate::error::ApiResult;
use crate::AppState;

fn anonymous(tenant_id: uuid::Uuid, environment: DeploymentEnvironment) -> RequestContext {
    RequestContext::new(TenantId::from_uuid(tenant_id), environment)
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    request.validate()?;
    let ctx = anonymous(request.tenant_id, request.environment);
    let user = state
        .mediator
        .send(
            Login {
                login_email: request.email,
                password: request.password,
            },
            &ctx,
        )
        .await?;

    let expires_in = state.config.jwt_expiration_secs;
    let claims = Claims::for_user(&user, request.environment, expires_in);
    let access_token = create_token(&claims, &state.config.jwt_secret)?;
    info!(user_id = %user.user_id, "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer",
        expires_in,
        user,
    }))
}

pub async fn activate(
    State(state): State<AppState>,
    Json(request): Json<ActivateRequest>,
) -> ApiResult<Json<UserReadModel>> {
    request.validate()?;
    let ctx = anonymous(request.tenant_id, DeploymentEnvironment::default());
    let user = state
        .mediator
        .send(
            ActivateUser {
                user_id: UserId::from_uuid(request.user_id),
                invitation_id: InvitationId::from_uuid(request.invitation_id),
                password: request.password,
            },
            &ctx,
        )
        .await?;
    Ok(Json(user))
}

/// Always accepted, so the response does not reveal which emails exist
///
/// The invitation is delivered out of band; this service only records it.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> ApiResult<StatusCode> {
    request.validate()?;
    let ctx = anonymous(request.tenant_id, DeploymentEnvironment::default());
    if let Some((user_id, invitation_id)) = state
        .mediator
        .send(RequestPasswordReset { login_email: request.email }, &ctx)
        .await?
    {
        info!(user_id = %user_id, invitation_id = %invitation_id, "Password reset invitation created");
    }
    Ok(StatusCode::ACCEPTED)
}

pub async fn complete_password_reset(
    State(state): State<AppState>,
    Json(request): Json<CompletePasswordResetRequest>,
) -> ApiResult<Json<UserReadModel>> {
    request.validate()?;
    let ctx = anonymous(request.tenant_id, DeploymentEnvironment::default());
    let user = state
        .mediator
        .send(
            ResetPassword {
                user_id: UserId::from_uuid(request.user_id),
                invitation_id: InvitationId::from_uuid(request.invitation_id),
                password: request.password,
            },
            &ctx,
        )
        .await?;
    Ok(Json(user))
}
