//! Request/response payload shapes for each method name in [`crate::methods`].
//! These are serialized into a [`crate::Frame`]'s `payload` field; the
//! method name itself tells each side which shape to expect.

use serde::{Deserialize, Serialize};

use crate::entities::{DiskSpec, NicSpec, NodeResources, PoolConfig, VmDefineSpec};

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RegisterPayload {
    pub node_id: uuid::Uuid,
    pub resources: NodeResources,
    /// Shared-secret agent registration token (spec §4.6), separate
    /// from the per-user bearer tokens the REST API issues.
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RegisterAck {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HeartbeatPayload {
    pub node_id: uuid::Uuid,
    pub cpu_load_pct: f32,
    pub memory_used_bytes: u64,
    pub disk_used_bytes: u64,
    /// VM ids the agent currently believes are running, used by the
    /// controller's reconciliation sweep to catch drift (spec §4.4).
    pub running_vm_ids: Vec<uuid::Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HeartbeatAck {
    pub received: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CancelPayload {
    /// The `id` of the in-flight request frame being cancelled.
    pub target_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VmDefineAndStartRequest {
    pub spec: VmDefineSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VmLifecycleResponse {
    pub vm_id: uuid::Uuid,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VmStopRequest {
    pub vm_id: uuid::Uuid,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VmRestartRequest {
    pub vm_id: uuid::Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VmAttachDiskRequest {
    pub vm_id: uuid::Uuid,
    pub disk: DiskSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VmDetachDiskRequest {
    pub vm_id: uuid::Uuid,
    pub volume_id: uuid::Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VmDescribeRequest {
    pub vm_id: uuid::Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VmDescribeResponse {
    pub vm_id: uuid::Uuid,
    pub status: String,
    pub disks: Vec<DiskSpec>,
    pub networks: Vec<NicSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VmMigrateRequest {
    pub vm_id: uuid::Uuid,
    pub target_node_id: uuid::Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VolumeCreateRequest {
    pub volume_id: uuid::Uuid,
    pub pool_id: uuid::Uuid,
    pub pool_config: PoolConfig,
    pub size_gb: u64,
    pub volume_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VolumeCreateResponse {
    pub volume_id: uuid::Uuid,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VolumeDeleteRequest {
    pub volume_id: uuid::Uuid,
    pub pool_id: uuid::Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VolumeResizeRequest {
    pub volume_id: uuid::Uuid,
    pub new_size_gb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VolumeCloneRequest {
    pub source_volume_id: uuid::Uuid,
    pub new_volume_id: uuid::Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VolumeDescribeRequest {
    pub volume_id: uuid::Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VolumeDescribeResponse {
    pub volume_id: uuid::Uuid,
    pub size_gb: u64,
    pub path: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SnapshotCreateRequest {
    pub snapshot_id: uuid::Uuid,
    pub volume_id: uuid::Uuid,
    pub snapshot_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SnapshotCreateResponse {
    pub snapshot_id: uuid::Uuid,
    pub size_gb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SnapshotDeleteRequest {
    pub snapshot_id: uuid::Uuid,
    pub volume_id: uuid::Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SnapshotRestoreRequest {
    pub snapshot_id: uuid::Uuid,
    pub volume_id: uuid::Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NetworkEnsureRequest {
    pub network_id: uuid::Uuid,
    pub cidr: String,
    pub gateway: Option<String>,
    pub mtu: u32,
    pub vlan_id: Option<u16>,
    pub network_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NetworkAttachTapRequest {
    pub network_id: uuid::Uuid,
    pub vm_id: uuid::Uuid,
    pub nic: NicSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NetworkAttachTapResponse {
    pub tap_name: String,
    pub mac: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NetworkDetachTapRequest {
    pub network_id: uuid::Uuid,
    pub vm_id: uuid::Uuid,
    pub mac: String,
}
