//! Shared application state threaded through both the REST handlers and
//! the agent RPC transport (mirrors the teacher's `AppState` pattern).

use std::sync::Arc;

use crate::audit::AuditLogger;
use crate::ipam::IpAllocator;
use crate::notifications::FrontendNotification;
use crate::rbac::AuthRegistry;
use crate::registry::AgentRegistry;
use crate::services::{NetworkService, NodeService, SnapshotService, TaskService, VmService, VolumeService};
use crate::store::MetadataStore;

pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    pub agents: Arc<AgentRegistry>,
    pub ipam: Arc<IpAllocator>,
    pub auth: Arc<AuthRegistry>,
    pub audit: Arc<AuditLogger>,
    /// Front-end WebSocket fanout (spec §6, `/ws/frontend`).
    pub frontend_tx: tokio::sync::broadcast::Sender<FrontendNotification>,
    pub agent_register_token: String,
    pub vms: Arc<VmService>,
    pub volumes: Arc<VolumeService>,
    pub snapshots: Arc<SnapshotService>,
    pub networks: Arc<NetworkService>,
    pub nodes: Arc<NodeService>,
    pub tasks: Arc<TaskService>,
}
