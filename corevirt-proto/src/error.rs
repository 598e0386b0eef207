//! Closed, extensible error code set shared by both ends of the RPC
//! transport (spec §4.1).

use serde::{Deserialize, Serialize};

/// Error codes a [`crate::Frame`]'s `error` field may carry.
///
/// The set is closed in the sense that the controller branches on it by
/// value, never by string-matching a message; it is extensible in the
/// sense that agents may report a code the controller doesn't yet know
/// about (`Unknown` catches that case on deserialization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    MethodNotFound,
    Timeout,
    TransportClosed,
    TransportSuperseded,
    Unauthorized,
    NodeOffline,
    VmNotFound,
    VolumeNotFound,
    PoolNotFound,
    SnapshotNotFound,
    NetworkNotFound,
    IpExhausted,
    PreconditionFailed,
    HypervisorError,
    StorageError,
    NetworkError,
    Internal,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// An error carried in a [`crate::Frame`] of type `response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    /// `{"retryable": true}` lets the caller offer a retry (spec §7).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn retryable(mut self) -> Self {
        self.details = Some(serde_json::json!({ "retryable": true }));
        self
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}
