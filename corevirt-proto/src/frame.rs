//! Frame format for the controller/agent duplex RPC transport (spec §4.1).

use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// One of the four frame kinds the transport carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Request,
    Response,
    Notification,
    Stream,
}

/// A single JSON text frame on the wire.
///
/// `id` is freshly generated per outbound request/notification; a
/// `response` or `stream` frame reuses the originating request's `id`.
/// At most one `response` is ever sent per request id; zero or more
/// `stream` frames may precede it. If both a terminal stream
/// (`payload.completed == true`) and a `response` arrive, the
/// `response` is authoritative (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FrameKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Maximum single-frame size. Larger payloads must use streaming or an
/// external transfer (spec §4.1).
pub const MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

impl Frame {
    pub fn request(id: impl Into<String>, method: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind: FrameKind::Request,
            method: Some(method.into()),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn notification(id: impl Into<String>, method: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind: FrameKind::Notification,
            method: Some(method.into()),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn response(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind: FrameKind::Response,
            method: None,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn error_response(id: impl Into<String>, error: RpcError) -> Self {
        Self {
            id: id.into(),
            kind: FrameKind::Response,
            method: None,
            payload: None,
            error: Some(error),
        }
    }

    pub fn stream(id: impl Into<String>, payload: StreamPayload) -> Self {
        Self {
            id: id.into(),
            kind: FrameKind::Stream,
            method: None,
            payload: Some(serde_json::to_value(payload).expect("StreamPayload always serializes")),
            error: None,
        }
    }

    /// `true` once this frame (a `response`, or a `stream` carrying
    /// `completed: true`) releases the correlation entry.
    pub fn is_terminal(&self) -> bool {
        match self.kind {
            FrameKind::Response => true,
            FrameKind::Stream => self
                .payload
                .as_ref()
                .and_then(|p| p.get("completed"))
                .and_then(|c| c.as_bool())
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn approx_size(&self) -> usize {
        serde_json::to_vec(self).map(|b| b.len()).unwrap_or(0)
    }
}

/// Progress payload carried by `stream` frames for a long-running method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_is_terminal() {
        let f = Frame::response("r1", serde_json::json!({"ok": true}));
        assert!(f.is_terminal());
    }

    #[test]
    fn non_terminal_stream() {
        let f = Frame::stream(
            "r1",
            StreamPayload {
                progress: Some(40),
                completed: false,
                message: None,
                data: None,
            },
        );
        assert!(!f.is_terminal());
    }

    #[test]
    fn terminal_stream() {
        let f = Frame::stream(
            "r1",
            StreamPayload {
                progress: Some(100),
                completed: true,
                message: None,
                data: None,
            },
        );
        assert!(f.is_terminal());
    }

    #[test]
    fn round_trips_through_json() {
        let f = Frame::request("r1", "vm.describe", serde_json::json!({"vm_id": "v1"}));
        let s = serde_json::to_string(&f).unwrap();
        let back: Frame = serde_json::from_str(&s).unwrap();
        assert_eq!(back.id, "r1");
        assert_eq!(back.method.as_deref(), Some("vm.describe"));
    }
}
