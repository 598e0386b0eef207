//! Agent Connection Registry (spec §4.2): one entry per `node_id`
//! holding the outbound send queue, last-heartbeat timestamp, and the
//! open correlation table for in-flight RPCs to that agent.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use corevirt_proto::{Frame, RpcError};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{info, warn};

pub type PendingReply = oneshot::Sender<Result<Frame, RpcError>>;

pub struct AgentConnection {
    pub node_id: String,
    pub outbound: mpsc::Sender<Frame>,
    pub pending: Mutex<HashMap<String, PendingReply>>,
    pub last_heartbeat: Mutex<DateTime<Utc>>,
    /// Set once the connection is superseded or closed, so a lagging
    /// reader task knows to stop forwarding frames.
    pub closed: std::sync::atomic::AtomicBool,
}

impl AgentConnection {
    pub fn new(node_id: String, outbound: mpsc::Sender<Frame>) -> Arc<Self> {
        Arc::new(Self {
            node_id,
            outbound,
            pending: Mutex::new(HashMap::new()),
            last_heartbeat: Mutex::new(Utc::now()),
            closed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub async fn touch_heartbeat(&self) {
        *self.last_heartbeat.lock().await = Utc::now();
    }

    pub async fn seconds_since_heartbeat(&self) -> i64 {
        (Utc::now() - *self.last_heartbeat.lock().await).num_seconds()
    }
}

#[derive(Default)]
pub struct AgentRegistry {
    connections: RwLock<HashMap<String, Arc<AgentConnection>>>,
}

impl AgentRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a fresh connection for `node_id`. If one already
    /// exists, returns it so the caller can close it with
    /// `TRANSPORT_SUPERSEDED` — "the newer wins" (spec §4.2).
    pub async fn register(&self, node_id: &str, conn: Arc<AgentConnection>) -> Option<Arc<AgentConnection>> {
        let mut conns = self.connections.write().await;
        let old = conns.insert(node_id.to_string(), conn);
        if old.is_some() {
            info!(node_id, "superseding prior agent connection");
        }
        old
    }

    pub async fn get(&self, node_id: &str) -> Option<Arc<AgentConnection>> {
        self.connections.read().await.get(node_id).cloned()
    }

    pub async fn remove(&self, node_id: &str) {
        self.connections.write().await.remove(node_id);
    }

    pub async fn is_online(&self, node_id: &str) -> bool {
        self.connections.read().await.contains_key(node_id)
    }

    /// Nodes whose last heartbeat is older than `timeout_secs` (spec
    /// §4.1: controller marks a node offline after 90s of silence).
    pub async fn stale_nodes(&self, timeout_secs: i64) -> Vec<String> {
        let conns = self.connections.read().await;
        let mut stale = Vec::new();
        for (id, conn) in conns.iter() {
            if conn.seconds_since_heartbeat().await > timeout_secs {
                stale.push(id.clone());
            }
        }
        stale
    }
}

pub async fn close_with_superseded(conn: &Arc<AgentConnection>) {
    conn.closed.store(true, std::sync::atomic::Ordering::SeqCst);
    let mut pending = conn.pending.lock().await;
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(RpcError::new(
            corevirt_proto::ErrorCode::TransportSuperseded,
            "connection superseded by a newer registration",
        )));
    }
    warn!(node_id = %conn.node_id, "agent connection superseded");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn newer_registration_supersedes_older() {
        let registry = AgentRegistry::new();
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);
        let conn1 = AgentConnection::new("n1".into(), tx1);
        let conn2 = AgentConnection::new("n1".into(), tx2);

        assert!(registry.register("n1", conn1).await.is_none());
        let old = registry.register("n1", conn2).await;
        assert!(old.is_some());
        assert!(registry.is_online("n1").await);
    }
}
