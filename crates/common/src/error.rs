use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by sprint and voting operations.
///
/// Every variant except the internal ones is recoverable and carries a
/// human-readable message for the caller.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Conflicting state: {0}")]
    ConflictingState(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Stable, wire-friendly label for an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    CapacityExceeded,
    ConflictingState,
    PreconditionFailed,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::CapacityExceeded => "capacity_exceeded",
            ErrorKind::ConflictingState => "conflicting_state",
            ErrorKind::PreconditionFailed => "precondition_failed",
            ErrorKind::Internal => "internal",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Validation(_) => ErrorKind::Validation,
            Error::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            Error::ConflictingState(_) => ErrorKind::ConflictingState,
            Error::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            Error::JsonSerialization(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::ConflictingState(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Error::PreconditionFailed(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
