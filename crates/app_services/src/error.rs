//! Application layer errors
//!
//! Domain and port errors are folded into a small set of categories that
//! the HTTP layer maps onto status codes.

use thiserror::Error;

use core_kernel::{AggregateError, PortError};
use domain_party::PartyError;
use domain_quote::{QuoteError, RatingError};
use infra_updater::UpdaterError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The request duplicates existing data
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The aggregate changed since it was loaded
    #[error("Concurrency conflict: {0}")]
    Concurrency(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A domain rule rejected the command
    #[error("{0}")]
    BusinessRule(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("No handler registered for {0}")]
    HandlerNotRegistered(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        AppError::NotFound(format!("{} {}", entity, id))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal(message.into())
    }

    /// True for failures caused by the caller rather than the system
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            AppError::Internal(_) | AppError::Unavailable(_) | AppError::HandlerNotRegistered(_)
        )
    }
}

impl From<PortError> for AppError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => AppError::NotFound(format!("{} {}", entity_type, id)),
            PortError::Validation { message, field } => match field {
                Some(field) => AppError::Validation(format!("{}: {}", field, message)),
                None => AppError::Validation(message),
            },
            PortError::Conflict { message } => AppError::Concurrency(message),
            PortError::Unauthorized { message } => AppError::Unauthorized(message),
            err @ (PortError::Timeout { .. }
            | PortError::Connection { .. }
            | PortError::ServiceUnavailable { .. }) => AppError::Unavailable(err.to_string()),
            err => AppError::Internal(err.to_string()),
        }
    }
}

impl From<AggregateError> for AppError {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::InvalidRollback { .. } => AppError::BusinessRule(err.to_string()),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<QuoteError> for AppError {
    fn from(err: QuoteError) -> Self {
        match err {
            QuoteError::QuoteNotFound(id) => AppError::not_found("quote", id),
            QuoteError::Validation(message) | QuoteError::InvalidDate(message) => AppError::Validation(message),
            QuoteError::Aggregate(inner) => inner.into(),
            other => AppError::BusinessRule(other.to_string()),
        }
    }
}

impl From<RatingError> for AppError {
    fn from(err: RatingError) -> Self {
        match err {
            RatingError::UnknownProduct(id) => AppError::not_found("rating rules for product", id),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<PartyError> for AppError {
    fn from(err: PartyError) -> Self {
        match err {
            PartyError::InvalidData(message) | PartyError::ValidationFailed(message) => {
                AppError::Validation(message)
            }
            PartyError::InvitationNotFound(id) => AppError::not_found("invitation", id),
            PartyError::InvalidCredentials => AppError::Unauthorized(err.to_string()),
            PartyError::Password(message) => AppError::Internal(message),
            PartyError::Aggregate(inner) => inner.into(),
            other => AppError::BusinessRule(other.to_string()),
        }
    }
}

impl From<UpdaterError> for AppError {
    fn from(err: UpdaterError) -> Self {
        match err {
            UpdaterError::JobNotFound(id) => AppError::not_found("updater job", id),
            UpdaterError::JobAlreadyActive { .. } => AppError::Conflict(err.to_string()),
            UpdaterError::InvalidTransition { .. } => AppError::BusinessRule(err.to_string()),
            UpdaterError::NoSource(_)
            | UpdaterError::UnknownDataSet(_)
            | UpdaterError::UnknownState(_)
            | UpdaterError::InvalidSchedule(_) => AppError::Validation(err.to_string()),
            UpdaterError::QueueFull | UpdaterError::QueueClosed => AppError::Unavailable(err.to_string()),
            UpdaterError::Port(inner) => inner.into(),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => format!("{}: {}", field, message),
                    None => format!("{}: invalid {}", field, e.code),
                })
            })
            .collect();
        messages.sort();
        AppError::Validation(messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::QuoteId;

    #[test]
    fn test_conflict_becomes_concurrency() {
        let err: AppError = PortError::conflict("expected version 3").into();
        assert!(matches!(err, AppError::Concurrency(_)));
    }

    #[test]
    fn test_domain_errors_are_categorised() {
        assert!(matches!(
            AppError::from(QuoteError::QuoteNotFound(QuoteId::new())),
            AppError::NotFound(_)
        ));
        assert!(matches!(AppError::from(PartyError::AlreadyBlocked), AppError::BusinessRule(_)));
        assert!(matches!(AppError::from(PartyError::InvalidCredentials), AppError::Unauthorized(_)));
        assert!(matches!(AppError::from(UpdaterError::QueueFull), AppError::Unavailable(_)));
    }

    #[test]
    fn test_client_errors() {
        assert!(AppError::validation("bad").is_client_error());
        assert!(!AppError::internal("boom").is_client_error());
        assert!(!AppError::HandlerNotRegistered("Ping").is_client_error());
    }
}
