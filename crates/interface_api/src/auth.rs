//! Authentication and authorization
//!
//! Bearer tokens are HS256 JWTs issued by the login endpoint. Their claims
//! carry everything needed to build a [`RequestContext`]: the tenant, the
//! user, the user's roles and the deployment environment.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use app_services::{RequestContext, UserReadModel};
use core_kernel::{DeploymentEnvironment, TenantId, UserId};

/// JWT claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    pub tenant_id: Uuid,
    pub roles: Vec<String>,
    pub environment: DeploymentEnvironment,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

impl Claims {
    pub fn for_user(user: &UserReadModel, environment: DeploymentEnvironment, expiration_secs: u64) -> Self {
        let now = Utc::now();
        Self {
            sub: *user.user_id.as_uuid(),
            tenant_id: *user.tenant_id.as_uuid(),
            roles: user.roles.clone(),
            environment,
            exp: (now + Duration::seconds(expiration_secs as i64)).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn user_id(&self) -> UserId {
        UserId::from_uuid(self.sub)
    }

    pub fn to_context(&self) -> RequestContext {
        RequestContext::new(TenantId::from_uuid(self.tenant_id), self.environment)
            .with_user(self.user_id(), self.roles.clone())
    }
}

/// Auth errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Missing role: {0}")]
    MissingRole(String),
}

pub fn create_token(claims: &Claims, secret: &str) -> Result<String, AuthError> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|_| AuthError::InvalidToken)
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

/// Role names granted to users
pub mod roles {
    /// Manages organisations, users, number pools and reference data
    pub const ADMIN: &str = "Admin";
    pub const AGENT: &str = "Agent";
    pub const CUSTOMER: &str = "Customer";
}

/// Fails unless the caller holds `role` or is an administrator
pub fn require_role(ctx: &RequestContext, role: &str) -> Result<(), AuthError> {
    if ctx.has_role(role) || ctx.has_role(roles::ADMIN) {
        Ok(())
    } else {
        Err(AuthError::MissingRole(role.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn claims(expiration_secs: i64) -> Claims {
        let now = Utc::now();
        Claims {
            sub: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            roles: vec![roles::AGENT.to_string()],
            environment: DeploymentEnvironment::Staging,
            exp: (now + Duration::seconds(expiration_secs)).timestamp(),
            iat: now.timestamp(),
        }
    }

    #[test]
    fn test_token_round_trip_builds_context() {
        let original = claims(600);
        let token = create_token(&original, SECRET).unwrap();
        let decoded = validate_token(&token, SECRET).unwrap();
        assert_eq!(decoded, original);

        let ctx = decoded.to_context();
        assert_eq!(*ctx.tenant_id.as_uuid(), original.tenant_id);
        assert_eq!(ctx.performing_user_id, Some(UserId::from_uuid(original.sub)));
        assert_eq!(ctx.environment, DeploymentEnvironment::Staging);
        assert!(ctx.has_role("agent"));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = create_token(&claims(600), SECRET).unwrap();
        assert!(matches!(validate_token(&token, "other"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let token = create_token(&claims(-600), SECRET).unwrap();
        assert!(matches!(validate_token(&token, SECRET), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_admin_satisfies_any_role() {
        let admin = RequestContext::new(TenantId::new(), DeploymentEnvironment::Production)
            .with_user(UserId::new(), vec![roles::ADMIN.to_string()]);
        let agent = RequestContext::new(TenantId::new(), DeploymentEnvironment::Production)
            .with_user(UserId::new(), vec![roles::AGENT.to_string()]);

        assert!(require_role(&admin, roles::AGENT).is_ok());
        assert!(require_role(&agent, roles::AGENT).is_ok());
        assert!(matches!(require_role(&agent, roles::ADMIN), Err(AuthError::MissingRole(_))));
    }
}
