use thiserror::Error;

use crate::backend::BackendError;
use crate::domain::service_request::{RequestStatus, ServiceRequestId};
use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("request {existing} is already in progress ({})", .status.as_str())]
    DuplicateRequest { existing: ServiceRequestId, status: RequestStatus },
    #[error("cannot {operation}: no active request")]
    NoActiveRequest { operation: &'static str },
    #[error("update for request {received} does not match the active request")]
    UnknownRequest { received: ServiceRequestId },
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("invalid employee: {0}")]
    InvalidEmployee(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    /// True for errors where the operation does not fit the current request status.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::NoActiveRequest { .. } | Self::FlowTransition(_))
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("backend failure: {0}")]
    Backend(#[from] BackendError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Caller-facing error: a safe message plus the correlation id to quote in support requests.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => "A request is already in progress.",
            Self::NotFound { .. } => "The requested record could not be found.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// HTTP status code for transports that speak HTTP.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::Internal { .. } => 500,
            Self::ServiceUnavailable { .. } => 503,
        }
    }

    /// Internal detail; only safe to show for caller mistakes.
    pub fn detail(&self) -> &str {
        self.parts().0
    }

    pub fn correlation_id(&self) -> &str {
        self.parts().1
    }

    fn parts(&self) -> (&str, &str) {
        match self {
            Self::BadRequest { message, correlation_id }
            | Self::Conflict { message, correlation_id }
            | Self::NotFound { message, correlation_id }
            | Self::ServiceUnavailable { message, correlation_id }
            | Self::Internal { message, correlation_id } => (message, correlation_id),
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::Domain(error @ DomainError::DuplicateRequest { .. }) => {
                InterfaceError::Conflict { message: error.to_string(), correlation_id }
            }
            Self::Domain(error) => {
                InterfaceError::BadRequest { message: error.to_string(), correlation_id }
            }
            Self::NotFound(message) => InterfaceError::NotFound { message, correlation_id },
            Self::Backend(error) => {
                InterfaceError::ServiceUnavailable { message: error.to_string(), correlation_id }
            }
            Self::Persistence(message) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Configuration(message) => InterfaceError::Internal { message, correlation_id },
        }
    }
}
