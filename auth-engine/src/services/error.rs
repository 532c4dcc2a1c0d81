use service_core::error::AppError;
use thiserror::Error;

use crate::store::StoreError;

/// Engine-level error taxonomy. Every expected business failure is a value
/// here; only programming or integration faults travel through `Internal`.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed method/pipeline/step configuration, caught before any side
    /// effect.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// One or more request fields failed shape validation; the message lists
    /// every violation, not just the first.
    #[error("field validation failed: {0}")]
    FieldValidation(String),

    #[error("duplicate value for field {field}")]
    DuplicateValue { field: String, value: String },

    #[error("maximum number of codes sent")]
    SendLimitExceeded,

    /// Wrong code or password, or an unknown/inactive principal. Deliberately
    /// uniform so callers cannot tell which part of the check failed.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("the auth event is closed")]
    EventClosed,

    #[error("registration is disabled: the census is close")]
    RegistrationClosed,

    #[error("registration is disabled: the auth event has not started")]
    EventNotStarted,

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("permission denied: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("external service unavailable: {0}")]
    ExternalUnavailable(String),

    /// A pipeline step rejected the operation; `key` is the step's
    /// machine-readable reason.
    #[error("rejected: {context}")]
    Rejected { key: String, context: String },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Stable machine-readable codename exposed to callers.
    pub fn codename(&self) -> &str {
        match self {
            ServiceError::ConfigInvalid(_) => "invalid_config",
            ServiceError::FieldValidation(_) => "invalid_fields",
            ServiceError::DuplicateValue { .. } => "duplicate_value",
            ServiceError::SendLimitExceeded => "send_limit_exceeded",
            ServiceError::InvalidCredentials => "invalid_credentials",
            ServiceError::EventClosed => "auth_event_closed",
            ServiceError::RegistrationClosed => "registration_closed",
            ServiceError::EventNotStarted => "auth_event_not_started",
            ServiceError::InvalidTransition { .. } => "invalid_status_transition",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::ExternalUnavailable(_) => "external_service_unavailable",
            ServiceError::Rejected { key, .. } => key,
            ServiceError::Store(_) | ServiceError::Internal(_) => "internal_error",
        }
    }

    /// Human-readable context accompanying the codename.
    pub fn context(&self) -> String {
        match self {
            ServiceError::Rejected { context, .. } => context.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let context = err.context();
        match err {
            ServiceError::ConfigInvalid(m) => AppError::BadRequest(anyhow::anyhow!(m)),
            ServiceError::FieldValidation(m) => AppError::BadRequest(anyhow::anyhow!(m)),
            ServiceError::DuplicateValue { field, .. } => {
                AppError::Conflict(anyhow::anyhow!("duplicate value for field {}", field))
            }
            ServiceError::SendLimitExceeded => {
                AppError::TooManyRequests("maximum number of codes sent".to_string(), None)
            }
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("invalid credentials"))
            }
            ServiceError::EventClosed
            | ServiceError::RegistrationClosed
            | ServiceError::EventNotStarted => AppError::BadRequest(anyhow::anyhow!(context)),
            ServiceError::InvalidTransition { from, to } => {
                AppError::BadRequest(anyhow::anyhow!("invalid status transition: {} -> {}", from, to))
            }
            ServiceError::Forbidden(m) => AppError::Forbidden(anyhow::anyhow!(m)),
            ServiceError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            ServiceError::ExternalUnavailable(_) => AppError::ServiceUnavailable,
            ServiceError::Rejected { context, .. } => AppError::BadRequest(anyhow::anyhow!(context)),
            ServiceError::Store(e) => AppError::StorageError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codenames_stable() {
        assert_eq!(ServiceError::EventClosed.codename(), "auth_event_closed");
        assert_eq!(
            ServiceError::InvalidCredentials.codename(),
            "invalid_credentials"
        );
        assert_eq!(
            ServiceError::Rejected {
                key: "invalid_captcha".to_string(),
                context: "wrong answer".to_string(),
            }
            .codename(),
            "invalid_captcha"
        );
    }
}
