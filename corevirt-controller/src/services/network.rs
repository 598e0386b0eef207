//! Network lifecycle orchestration (spec §4.3, §4.4).

use std::sync::Arc;

use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::command::{Command, NetworkType};
use crate::store::{MetadataStore, Result};

pub struct CreateNetworkRequest {
    pub name: String,
    pub network_type: NetworkType,
    pub cidr: String,
    pub gateway: Option<String>,
    pub mtu: u32,
    pub vlan_id: Option<u16>,
    pub node_id: String,
}

pub struct NetworkService {
    store: Arc<dyn MetadataStore>,
    audit: Arc<AuditLogger>,
}

impl NetworkService {
    pub fn new(store: Arc<dyn MetadataStore>, audit: Arc<AuditLogger>) -> Arc<Self> {
        Arc::new(Self { store, audit })
    }

    /// CIDR/gateway validation and host-IP pool materialization happen
    /// inside the store's `CreateNetwork` transaction. No agent call here:
    /// the bridge is materialized lazily by the agent when a VM on that
    /// node first attaches (spec §4.4, "Network lifecycle").
    pub async fn create(&self, actor: &str, req: CreateNetworkRequest) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.store
            .apply(Command::CreateNetwork {
                request_id: Uuid::new_v4().to_string(),
                id: id.clone(),
                timestamp: now(),
                name: req.name,
                network_type: req.network_type,
                cidr: req.cidr,
                gateway: req.gateway,
                mtu: req.mtu,
                vlan_id: req.vlan_id,
                node_id: req.node_id,
            })
            .await?;
        self.audit.record(actor, "network.created", "network", &id, serde_json::json!({}));
        Ok(id)
    }

    pub async fn rename(&self, id: &str, name: &str) -> Result<()> {
        self.store
            .apply(Command::RenameNetwork { request_id: Uuid::new_v4().to_string(), id: id.to_string(), timestamp: now(), name: name.to_string() })
            .await
            .map(|_| ())
    }

    /// Rejected by the store if any allocation on this network is not
    /// `available` (spec §4.3: networks can't be torn down while a VM
    /// still holds an address on them).
    pub async fn delete(&self, actor: &str, id: &str) -> Result<()> {
        self.store
            .apply(Command::DeleteNetwork { request_id: Uuid::new_v4().to_string(), id: id.to_string(), timestamp: now() })
            .await?;
        self.audit.record(actor, "network.deleted", "network", id, serde_json::json!({}));
        Ok(())
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
