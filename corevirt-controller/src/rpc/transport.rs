//! Request/response correlation over an [`AgentConnection`] (spec §4.1).

use std::time::Duration;

use corevirt_proto::{ErrorCode, Frame, RpcError};
use tokio::sync::oneshot;
use tracing::warn;
use uuid::Uuid;

use crate::registry::AgentConnection;

/// Sends `method(payload)` to the agent behind `conn` and awaits its
/// reply within `timeout`. On timeout, releases the correlation entry
/// and best-effort notifies the agent with `rpc.cancel` (spec §4.1,
/// "Cancellation").
pub async fn call(
    conn: &AgentConnection,
    method: &str,
    payload: serde_json::Value,
    timeout: Duration,
) -> Result<serde_json::Value, RpcError> {
    let id = Uuid::new_v4().to_string();
    let (tx, rx) = oneshot::channel();
    conn.pending.lock().await.insert(id.clone(), tx);

    let frame = Frame::request(id.clone(), method, payload);
    if conn.outbound.send(frame).await.is_err() {
        conn.pending.lock().await.remove(&id);
        return Err(RpcError::new(ErrorCode::NodeOffline, "agent outbound channel closed"));
    }

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(Ok(frame))) => frame.payload.ok_or_else(|| {
            RpcError::new(ErrorCode::Internal, "response frame carried no payload")
        }),
        Ok(Ok(Err(err))) => Err(err),
        Ok(Err(_)) => Err(RpcError::new(ErrorCode::TransportClosed, "agent connection closed before reply")),
        Err(_) => {
            conn.pending.lock().await.remove(&id);
            let cancel = Frame::notification(
                Uuid::new_v4().to_string(),
                corevirt_proto::methods::RPC_CANCEL,
                serde_json::json!({ "id": id }),
            );
            if conn.outbound.send(cancel).await.is_err() {
                warn!(node_id = %conn.node_id, "failed to deliver rpc.cancel after timeout");
            }
            Err(RpcError::new(ErrorCode::Timeout, "request timed out").retryable())
        }
    }
}

/// Resolves a `response` or terminal `stream` frame read off the wire
/// against its pending correlation entry. Non-terminal `stream` frames
/// (progress updates) are handled by the caller before reaching here.
pub async fn resolve(conn: &AgentConnection, frame: Frame) {
    if !frame.is_terminal() {
        return;
    }
    let mut pending = conn.pending.lock().await;
    if let Some(reply) = pending.remove(&frame.id) {
        let result = match frame.error.clone() {
            Some(err) => Err(err),
            None => Ok(frame),
        };
        let _ = reply.send(result);
    }
}

pub fn default_timeout() -> Duration {
    Duration::from_secs(corevirt_proto::methods::DEFAULT_TIMEOUT_SECS)
}

pub fn long_op_timeout() -> Duration {
    Duration::from_secs(corevirt_proto::methods::LONG_OP_TIMEOUT_SECS)
}
