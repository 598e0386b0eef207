//! Store error types (spec §7, Error Handling Design).

use thiserror::Error;

/// Errors a [`crate::state::ControllerState::apply`] call can return.
///
/// This is the "domain error vs infrastructure error" split the
/// propagation policy in §7 calls for: every variant except `Internal`
/// maps to a specific HTTP status in [`crate::error::ApiError`]; `Internal`
/// always maps to 5xx and is logged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("ip pool exhausted for network {0}")]
    IpExhausted(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Internal(e.to_string())
    }
}
