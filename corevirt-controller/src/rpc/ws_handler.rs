//! Server side of the agent duplex RPC transport: one WebSocket per
//! node, upgraded at `/ws/agent` (spec §4.1, §4.2).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use corevirt_proto::{Frame, FrameKind};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::command::Command;
use crate::registry::{self, AgentConnection};

pub async fn agent_ws_handler(ws: WebSocketUpgrade, State(app): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_agent_socket(socket, app))
}

async fn handle_agent_socket(socket: WebSocket, app: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let Some(Ok(Message::Text(text))) = ws_rx.next().await else {
        warn!("agent socket closed before sending node.register");
        return;
    };
    let Ok(register_frame) = serde_json::from_str::<Frame>(&text) else {
        warn!("first frame from agent was not valid JSON");
        return;
    };
    let Some(payload) = register_frame.payload.clone() else {
        warn!("node.register frame carried no payload");
        return;
    };
    let Ok(reg) = serde_json::from_value::<corevirt_proto::payloads::RegisterPayload>(payload) else {
        warn!("node.register payload did not match expected shape");
        return;
    };

    if !app.auth.verify_agent_token(&reg.token) {
        let err = corevirt_proto::RpcError::new(corevirt_proto::ErrorCode::Unauthorized, "bad agent registration token");
        let _ = ws_tx.send(Message::Text(serde_json::to_string(&Frame::error_response(register_frame.id.clone(), err)).unwrap().into())).await;
        return;
    }

    let node_id = reg.node_id.to_string();
    let cmd = Command::RegisterNode {
        request_id: uuid::Uuid::new_v4().to_string(),
        id: node_id.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        hostname: reg.resources.hostname.clone(),
        ip_address: reg.resources.ip_address.clone(),
        hypervisor_type: reg.resources.hypervisor_type.clone(),
        hypervisor_version: reg.resources.hypervisor_version.clone(),
        cpu_cores: reg.resources.cpu_cores,
        cpu_threads: reg.resources.cpu_threads,
        memory_total_bytes: reg.resources.memory_total_bytes,
        disk_total_bytes: reg.resources.disk_total_bytes,
    };
    if let Err(e) = app.store.apply(cmd).await {
        warn!(error = %e, "failed to persist node registration");
        return;
    }
    app.audit.node_registered(&node_id);

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(256);
    let conn = AgentConnection::new(node_id.clone(), outbound_tx);
    if let Some(old) = app.agents.register(&node_id, conn.clone()).await {
        registry::close_with_superseded(&old).await;
    }
    info!(node_id, "agent registered");

    let ack = corevirt_proto::payloads::RegisterAck { accepted: true, reason: None };
    let ack_frame = Frame::response(register_frame.id, serde_json::to_value(ack).unwrap());
    if ws_tx.send(Message::Text(serde_json::to_string(&ack_frame).unwrap().into())).await.is_err() {
        app.agents.remove(&node_id).await;
        return;
    }

    let writer_node_id = node_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else { continue };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                warn!(node_id = %writer_node_id, "agent socket write failed, closing");
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_rx.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(frame) = serde_json::from_str::<Frame>(&text) else {
            warn!(node_id, "received malformed frame, ignoring");
            continue;
        };
        match frame.kind {
            FrameKind::Notification if frame.method.as_deref() == Some(corevirt_proto::methods::HEARTBEAT) => {
                conn.touch_heartbeat().await;
                let _ = app
                    .store
                    .apply(Command::Heartbeat {
                        request_id: uuid::Uuid::new_v4().to_string(),
                        node_id: node_id.clone(),
                        timestamp: chrono::Utc::now().to_rfc3339(),
                    })
                    .await;
            }
            FrameKind::Response | FrameKind::Stream => {
                crate::rpc::transport::resolve(&conn, frame).await;
            }
            _ => {}
        }
    }

    writer.abort();
    app.agents.remove(&node_id).await;
    let _ = app
        .store
        .apply(Command::SetNodeStatus {
            request_id: uuid::Uuid::new_v4().to_string(),
            node_id: node_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            status: crate::command::NodeStatus::Offline,
        })
        .await;
    info!(node_id, "agent disconnected");
}
