//! User DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use domain_party::PersonDetails;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    pub organisation_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "must be between 1 and 200 characters"))]
    pub full_name: String,
    pub preferred_name: Option<String>,
    pub mobile_phone: Option<String>,
    #[validate(email(message = "is not a valid email address"))]
    pub login_email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl CreateUserRequest {
    pub fn person_details(&self) -> PersonDetails {
        PersonDetails {
            full_name: self.full_name.clone(),
            preferred_name: self.preferred_name.clone(),
            email: Some(self.login_email.clone()),
            mobile_phone: self.mobile_phone.clone(),
            company: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginEmailRequest {
    #[validate(email(message = "is not a valid email address"))]
    pub login_email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RoleRequest {
    #[validate(length(min = 1, max = 100, message = "must be between 1 and 100 characters"))]
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub invitation_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub current_password: String,
    #[validate(length(min = 1, message = "is required"))]
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub organisation_id: Option<Uuid>,
}
