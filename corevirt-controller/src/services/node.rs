//! Node membership operations (spec §4.3 "Node lifecycle").

use std::sync::Arc;

use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::command::{Command, NodeData, NodeStatus};
use crate::registry::AgentRegistry;
use crate::store::{MetadataStore, Result, StoreError};

pub struct NodeService {
    store: Arc<dyn MetadataStore>,
    agents: Arc<AgentRegistry>,
    audit: Arc<AuditLogger>,
}

impl NodeService {
    pub fn new(store: Arc<dyn MetadataStore>, agents: Arc<AgentRegistry>, audit: Arc<AuditLogger>) -> Arc<Self> {
        Arc::new(Self { store, agents, audit })
    }

    pub async fn set_maintenance(&self, actor: &str, node_id: &str, maintenance: bool) -> Result<NodeData> {
        let status = if maintenance { NodeStatus::Maintenance } else { NodeStatus::Online };
        let (resp, _) = self
            .store
            .apply(Command::SetNodeStatus { request_id: Uuid::new_v4().to_string(), node_id: node_id.to_string(), timestamp: now(), status })
            .await?;
        self.audit.record(actor, if maintenance { "node.maintenance_entered" } else { "node.maintenance_exited" }, "node", node_id, serde_json::json!({}));
        match resp {
            crate::command::Response::Node(n) => Ok(n),
            _ => Err(StoreError::Internal("unexpected response to SetNodeStatus".into())),
        }
    }

    /// Deletion is rejected by the store while any VM is still assigned
    /// to this node; the live connection (if any) is dropped regardless
    /// so a stale agent can't keep registering against a deleted node.
    pub async fn deregister(&self, actor: &str, node_id: &str) -> Result<()> {
        self.store
            .apply(Command::DeregisterNode { request_id: Uuid::new_v4().to_string(), node_id: node_id.to_string(), timestamp: now() })
            .await?;
        self.agents.remove(node_id).await;
        self.audit.record(actor, "node.deregistered", "node", node_id, serde_json::json!({}));
        Ok(())
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
