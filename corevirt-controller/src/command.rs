//! The single mutation vocabulary applied to the metadata store
//! (spec §3 DATA MODEL, §4.4 Orchestration Services).
//!
//! Every REST handler and every agent-originated status update lowers
//! to one of these variants before touching the database; `apply()` in
//! [`crate::state`] is the only code that mutates rows. `timestamp` is
//! set by the caller (not inside `apply`) so two operations against
//! the same row have unambiguous, pre-committed ordering.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub enum Command {
    RegisterNode {
        request_id: String,
        id: String,
        timestamp: String,
        hostname: String,
        ip_address: String,
        hypervisor_type: String,
        hypervisor_version: String,
        cpu_cores: u32,
        cpu_threads: u32,
        memory_total_bytes: u64,
        disk_total_bytes: u64,
    },
    Heartbeat {
        request_id: String,
        node_id: String,
        timestamp: String,
    },
    SetNodeStatus {
        request_id: String,
        node_id: String,
        timestamp: String,
        status: NodeStatus,
    },
    DeregisterNode {
        request_id: String,
        node_id: String,
        timestamp: String,
    },

    CreateNetwork {
        request_id: String,
        id: String,
        timestamp: String,
        name: String,
        network_type: NetworkType,
        cidr: String,
        gateway: Option<String>,
        mtu: u32,
        vlan_id: Option<u16>,
        node_id: String,
    },
    RenameNetwork {
        request_id: String,
        id: String,
        timestamp: String,
        name: String,
    },
    DeleteNetwork {
        request_id: String,
        id: String,
        timestamp: String,
    },

    AllocateIp {
        request_id: String,
        network_id: String,
        timestamp: String,
    },
    AssociateIp {
        request_id: String,
        alloc_id: String,
        vm_id: String,
        timestamp: String,
    },
    ReleaseIps {
        request_id: String,
        network_id: String,
        vm_id: String,
        timestamp: String,
    },
    ReserveIp {
        request_id: String,
        network_id: String,
        ip_address: String,
        timestamp: String,
    },

    CreateVm {
        request_id: String,
        id: String,
        timestamp: String,
        name: String,
        node_id: String,
        vcpu: u32,
        memory_mb: u64,
        os_type: String,
        disks: Vec<VmDiskRequest>,
        networks: Vec<VmNicRequest>,
        metadata: serde_json::Value,
    },
    TransitionVmStatus {
        request_id: String,
        id: String,
        timestamp: String,
        status: VmStatus,
    },
    SetVmNode {
        request_id: String,
        id: String,
        timestamp: String,
        node_id: Option<String>,
    },
    AttachVolume {
        request_id: String,
        vm_id: String,
        volume_id: String,
        device: String,
        timestamp: String,
    },
    DetachVolume {
        request_id: String,
        vm_id: String,
        volume_id: String,
        timestamp: String,
    },
    DeleteVm {
        request_id: String,
        id: String,
        timestamp: String,
    },

    CreateVolume {
        request_id: String,
        id: String,
        timestamp: String,
        name: String,
        volume_type: VolumeType,
        size_gb: u64,
        pool_id: String,
        source: Option<String>,
    },
    TransitionVolumeStatus {
        request_id: String,
        id: String,
        timestamp: String,
        status: VolumeStatus,
        path: Option<String>,
    },
    ResizeVolume {
        request_id: String,
        id: String,
        timestamp: String,
        new_size_gb: u64,
    },
    DeleteVolume {
        request_id: String,
        id: String,
        timestamp: String,
    },

    CreateSnapshot {
        request_id: String,
        id: String,
        timestamp: String,
        name: String,
        volume_id: String,
        description: String,
    },
    TransitionSnapshotStatus {
        request_id: String,
        id: String,
        timestamp: String,
        status: SnapshotStatus,
        snapshot_tag: Option<String>,
        size_gb: Option<u64>,
    },
    DeleteSnapshot {
        request_id: String,
        id: String,
        timestamp: String,
    },
    RestoreSnapshot {
        request_id: String,
        id: String,
        timestamp: String,
    },

    CreatePool {
        request_id: String,
        id: String,
        timestamp: String,
        name: String,
        pool_type: PoolType,
        config: corevirt_proto::PoolConfig,
        capacity_gb: u64,
        node_id: Option<String>,
    },
    DeletePool {
        request_id: String,
        id: String,
        timestamp: String,
    },

    CreateTask {
        request_id: String,
        id: String,
        timestamp: String,
        task_type: String,
        target_type: String,
        target_id: String,
        node_id: Option<String>,
        payload: serde_json::Value,
        created_by: String,
        max_retries: u32,
    },
    UpdateTaskProgress {
        request_id: String,
        id: String,
        timestamp: String,
        progress: u8,
    },
    CompleteTask {
        request_id: String,
        id: String,
        timestamp: String,
        result: serde_json::Value,
    },
    FailTask {
        request_id: String,
        id: String,
        timestamp: String,
        error: String,
        retry: bool,
    },

    CreateUser {
        request_id: String,
        id: String,
        timestamp: String,
        username: String,
        password_hash: String,
        role: String,
    },
    RecordAudit {
        request_id: String,
        id: String,
        timestamp: String,
        actor: String,
        action: String,
        target_type: String,
        target_id: String,
        details: serde_json::Value,
    },
}

impl Command {
    pub fn request_id(&self) -> &str {
        match self {
            Command::RegisterNode { request_id, .. }
            | Command::Heartbeat { request_id, .. }
            | Command::SetNodeStatus { request_id, .. }
            | Command::DeregisterNode { request_id, .. }
            | Command::CreateNetwork { request_id, .. }
            | Command::RenameNetwork { request_id, .. }
            | Command::DeleteNetwork { request_id, .. }
            | Command::AllocateIp { request_id, .. }
            | Command::AssociateIp { request_id, .. }
            | Command::ReleaseIps { request_id, .. }
            | Command::ReserveIp { request_id, .. }
            | Command::CreateVm { request_id, .. }
            | Command::TransitionVmStatus { request_id, .. }
            | Command::SetVmNode { request_id, .. }
            | Command::AttachVolume { request_id, .. }
            | Command::DetachVolume { request_id, .. }
            | Command::DeleteVm { request_id, .. }
            | Command::CreateVolume { request_id, .. }
            | Command::TransitionVolumeStatus { request_id, .. }
            | Command::ResizeVolume { request_id, .. }
            | Command::DeleteVolume { request_id, .. }
            | Command::CreateSnapshot { request_id, .. }
            | Command::TransitionSnapshotStatus { request_id, .. }
            | Command::DeleteSnapshot { request_id, .. }
            | Command::RestoreSnapshot { request_id, .. }
            | Command::CreatePool { request_id, .. }
            | Command::DeletePool { request_id, .. }
            | Command::CreateTask { request_id, .. }
            | Command::UpdateTaskProgress { request_id, .. }
            | Command::CompleteTask { request_id, .. }
            | Command::FailTask { request_id, .. }
            | Command::CreateUser { request_id, .. }
            | Command::RecordAudit { request_id, .. } => request_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VmDiskRequest {
    pub volume_id: String,
    pub device: String,
    pub bootable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VmNicRequest {
    pub network_id: String,
    pub model: String,
}

// =============================================================================
// Entity row shapes (query-side projections, also used as command payloads)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    Offline,
    Maintenance,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NodeData {
    pub id: String,
    pub hostname: String,
    pub ip_address: String,
    pub status: NodeStatus,
    pub hypervisor_type: String,
    pub hypervisor_version: String,
    pub cpu_cores: u32,
    pub cpu_threads: u32,
    pub memory_total_bytes: u64,
    pub disk_total_bytes: u64,
    pub metadata: serde_json::Value,
    pub last_heartbeat: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    Bridge,
    Ovs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Active,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NetworkData {
    pub id: String,
    pub name: String,
    pub network_type: NetworkType,
    pub cidr: String,
    pub gateway: Option<String>,
    pub mtu: u32,
    pub vlan_id: Option<u16>,
    pub node_id: String,
    pub status: NetworkStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IpStatus {
    Available,
    Allocated,
    Reserved,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct IpAllocationData {
    pub id: String,
    pub network_id: String,
    pub ip_address: String,
    pub mac: Option<String>,
    pub vm_id: Option<String>,
    pub status: IpStatus,
    pub allocated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VmStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Paused,
    Restarting,
    Migrating,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VmData {
    pub id: String,
    pub uuid: String,
    pub name: String,
    pub node_id: Option<String>,
    pub status: VmStatus,
    pub vcpu: u32,
    pub memory_mb: u64,
    pub os_type: String,
    pub disk_ids: Vec<String>,
    pub network_interfaces: serde_json::Value,
    pub metadata: serde_json::Value,
    pub started_at: Option<String>,
    pub stopped_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VolumeType {
    Qcow2,
    Raw,
    Ceph,
    Nfs,
    Lvm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VolumeStatus {
    Creating,
    Available,
    InUse,
    Deleting,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VolumeData {
    pub id: String,
    pub name: String,
    pub volume_type: VolumeType,
    pub size_gb: u64,
    pub pool_id: String,
    pub path: Option<String>,
    pub status: VolumeStatus,
    pub vm_id: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Creating,
    Available,
    Deleting,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SnapshotData {
    pub id: String,
    pub name: String,
    pub volume_id: String,
    pub status: SnapshotStatus,
    pub size_gb: Option<u64>,
    pub snapshot_tag: String,
    pub description: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PoolType {
    Nfs,
    Lvm,
    Ceph,
    Iscsi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Active,
    Inactive,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PoolData {
    pub id: String,
    pub name: String,
    pub pool_type: PoolType,
    pub status: PoolStatus,
    pub config: corevirt_proto::PoolConfig,
    pub capacity_gb: u64,
    pub allocated_gb: u64,
    pub available_gb: u64,
    pub node_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TaskData {
    pub id: String,
    pub task_type: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub target_type: String,
    pub target_id: String,
    pub node_id: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UserData {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: String,
}

/// Response from applying a [`Command`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Node(NodeData),
    Network(NetworkData),
    IpAllocation(IpAllocationData),
    Vm(VmData),
    Volume(VolumeData),
    Snapshot(SnapshotData),
    Pool(PoolData),
    Task(TaskData),
    User(UserData),
    Deleted { id: String },
    ReleasedCount { count: u32 },
    Error { code: &'static str, message: String },
}
