//! Login, activation and password reset bodies
//!
//! These routes run before the caller holds a token, so each body names
//! the tenant it addresses.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use app_services::UserReadModel;
use core_kernel::DeploymentEnvironment;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    pub tenant_id: Uuid,
    #[serde(default)]
    pub environment: DeploymentEnvironment,
    #[validate(email(message = "is not a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub user: UserReadModel,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ActivateRequest {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub invitation_id: Uuid,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    pub tenant_id: Uuid,
    #[validate(email(message = "is not a valid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompletePasswordResetRequest {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub invitation_id: Uuid,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}
