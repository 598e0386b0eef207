//! Maps [`StoreError`] onto the REST surface (spec §7, Error Handling
//! Design): one JSON shape, one status code per error kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::store::StoreError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

pub struct ApiError(pub StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, retryable) = match &self.0 {
            StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", None),
            StoreError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT", None),
            StoreError::PreconditionFailed(_) => (StatusCode::PRECONDITION_FAILED, "PRECONDITION_FAILED", None),
            StoreError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED", None),
            StoreError::IpExhausted(_) => (StatusCode::CONFLICT, "IP_POOL_EXHAUSTED", None),
            StoreError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", None),
            StoreError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", Some(true)),
        };
        let body = ApiErrorBody { code, message: self.0.to_string(), retryable };
        (status, Json(body)).into_response()
    }
}

/// RPC-layer failures surface through the same shape; `NodeOffline` and
/// `Timeout` are the two codes a client should retry on.
impl From<corevirt_proto::RpcError> for ApiError {
    fn from(e: corevirt_proto::RpcError) -> Self {
        use corevirt_proto::ErrorCode::*;
        let mapped = match e.code {
            NodeOffline => StoreError::PreconditionFailed(e.message),
            Timeout => StoreError::Conflict(format!("agent call timed out: {}", e.message)),
            Unauthorized => StoreError::Unauthorized(e.message),
            _ => StoreError::Internal(e.message),
        };
        ApiError(mapped)
    }
}
