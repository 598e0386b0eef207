//! Client-side duplex RPC transport (spec §4.1, §4.2): connects to the
//! controller's `/ws/agent` endpoint, performs `node.register`, heartbeats
//! every 30s, and dispatches inbound `request` frames to [`Handlers`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use corevirt_proto::entities::NodeResources;
use corevirt_proto::payloads::{HeartbeatPayload, RegisterPayload};
use corevirt_proto::{methods, Frame, FrameKind};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::handlers::Handlers;

pub struct AgentTransport {
    controller_url: String,
    node_id: Uuid,
    token: String,
    resources: NodeResources,
    handlers: Arc<Handlers>,
}

impl AgentTransport {
    pub fn new(controller_url: String, node_id: Uuid, token: String, resources: NodeResources, handlers: Arc<Handlers>) -> Self {
        Self { controller_url, node_id, token, resources, handlers }
    }

    /// One connect/register/serve cycle; returns once the socket closes
    /// or a connection-level error occurs.
    async fn run_once(&self) -> anyhow::Result<()> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.controller_url).await?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let register_id = Uuid::new_v4().to_string();
        let register_payload = RegisterPayload { node_id: self.node_id, resources: self.resources.clone(), token: self.token.clone() };
        let register_frame = Frame::request(register_id, methods::NODE_REGISTER, serde_json::to_value(&register_payload)?);
        ws_tx.send(Message::Text(serde_json::to_string(&register_frame)?.into())).await?;

        let Some(Ok(Message::Text(text))) = ws_rx.next().await else {
            anyhow::bail!("controller closed the connection before acknowledging registration");
        };
        let ack_frame: Frame = serde_json::from_str(&text)?;
        if let Some(err) = ack_frame.error {
            anyhow::bail!("registration rejected: {err}");
        }
        info!(node_id = %self.node_id, "registered with controller");

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(256);

        let heartbeat_tx = outbound_tx.clone();
        let heartbeat_node_id = self.node_id;
        let heartbeat_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(methods::HEARTBEAT_INTERVAL_SECS));
            loop {
                ticker.tick().await;
                let payload = HeartbeatPayload {
                    node_id: heartbeat_node_id,
                    cpu_load_pct: 0.0,
                    memory_used_bytes: 0,
                    disk_used_bytes: 0,
                    running_vm_ids: Vec::new(),
                };
                let Ok(value) = serde_json::to_value(&payload) else { continue };
                let frame = Frame::notification(Uuid::new_v4().to_string(), methods::HEARTBEAT, value);
                if heartbeat_tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        // Keyed by frame id so a `rpc.cancel` notification (spec §4.1,
        // "Cancellation") can abort the matching in-flight handler task.
        let inflight: Arc<Mutex<HashMap<String, JoinHandle<()>>>> = Arc::new(Mutex::new(HashMap::new()));

        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "agent socket read error, closing");
                    break;
                }
            };
            let Message::Text(text) = msg else { continue };
            let Ok(frame) = serde_json::from_str::<Frame>(&text) else {
                warn!("received malformed frame, ignoring");
                continue;
            };

            match frame.kind {
                FrameKind::Request => {
                    let Some(method) = frame.method.clone() else { continue };
                    let handlers = self.handlers.clone();
                    let reply_tx = outbound_tx.clone();
                    let frame_id = frame.id.clone();
                    let payload = frame.payload.clone().unwrap_or(serde_json::Value::Null);
                    let inflight_done = inflight.clone();
                    let done_id = frame_id.clone();
                    let handle = tokio::spawn(async move {
                        let response = match handlers.dispatch(&method, payload).await {
                            Ok(value) => Frame::response(frame_id.clone(), value),
                            Err(err) => Frame::error_response(frame_id.clone(), err),
                        };
                        let _ = reply_tx.send(response).await;
                        inflight_done.lock().await.remove(&done_id);
                    });
                    inflight.lock().await.insert(frame.id, handle);
                }
                FrameKind::Notification if frame.method.as_deref() == Some(methods::RPC_CANCEL) => {
                    if let Some(target_id) = frame.payload.as_ref().and_then(|p| p.get("id")).and_then(|v| v.as_str()) {
                        if let Some(handle) = inflight.lock().await.remove(target_id) {
                            handle.abort();
                        }
                    }
                }
                _ => {}
            }
        }

        heartbeat_handle.abort();
        writer.abort();
        Ok(())
    }

    /// Runs [`Self::run_once`] forever with the fixed reconnect backoff
    /// (spec §4.1).
    pub async fn run_forever(self) {
        loop {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "agent connection lost, reconnecting");
            }
            tokio::time::sleep(Duration::from_secs(methods::RECONNECT_BACKOFF_SECS)).await;
        }
    }
}
