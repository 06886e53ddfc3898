//! Party domain errors

use thiserror::Error;

use core_kernel::AggregateError;

/// Errors that can occur in the party domain
#[derive(Debug, Error)]
pub enum PartyError {
    /// Invalid data supplied to a command
    #[error("Invalid party data: {0}")]
    InvalidData(String),

    /// Field-level validation failed
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Person has been deleted")]
    PersonDeleted,

    #[error("Person is already linked to user {0}")]
    AlreadyLinked(String),

    #[error("Role '{0}' is already assigned")]
    DuplicateRole(String),

    #[error("Role '{0}' is not assigned")]
    RoleNotAssigned(String),

    #[error("User is already blocked")]
    AlreadyBlocked,

    #[error("User is not blocked")]
    NotBlocked,

    #[error("User is blocked")]
    UserBlocked,

    #[error("User account is already activated")]
    AlreadyActivated,

    #[error("User account has not been activated")]
    NotActivated,

    /// The invitation does not exist, was superseded or was already used
    #[error("Invitation not found: {0}")]
    InvitationNotFound(String),

    #[error("Invitation has expired")]
    InvitationExpired,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Password error: {0}")]
    Password(String),

    #[error("Organisation has been deleted")]
    OrganisationDeleted,

    #[error("Organisation is already disabled")]
    AlreadyDisabled,

    #[error("Organisation is already active")]
    AlreadyActive,

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl PartyError {
    pub fn invalid(message: impl Into<String>) -> Self {
        PartyError::InvalidData(message.into())
    }

    /// Joins validation messages into one error
    pub fn validation_failed(errors: Vec<String>) -> Self {
        PartyError::ValidationFailed(errors.join("; "))
    }
}

impl From<validator::ValidationErrors> for PartyError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => format!("{}: {}", field, message),
                    None => format!("{}: invalid {}", field, e.code),
                })
            })
            .collect();
        PartyError::validation_failed(messages)
    }
}
