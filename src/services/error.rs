use thiserror::Error;

use crate::database::manager::DatabaseError;

/// Caller-actionable failure. Carries the message shown to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Duplicate(String),
}

impl Rejection {
    pub fn message(&self) -> &str {
        match self {
            Rejection::NotFound(m) | Rejection::Forbidden(m) | Rejection::BadRequest(m) | Rejection::Duplicate(m) => m,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Soft failure; nothing was written (or the open transaction was rolled back).
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// Store failure; surfaces as a generic internal error.
    #[error(transparent)]
    Store(#[from] DatabaseError),

    /// Failure of a local primitive (hashing, token signing)
    #[error("{0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::Rejected(Rejection::NotFound(message.into()))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ServiceError::Rejected(Rejection::Forbidden(message.into()))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ServiceError::Rejected(Rejection::BadRequest(message.into()))
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        ServiceError::Rejected(Rejection::Duplicate(message.into()))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            ServiceError::Rejected(r) => Some(r),
            _ => None,
        }
    }
}
