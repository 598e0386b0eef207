//! DTOs shared between the REST API, the RPC payloads, and each side's
//! internal state (spec §3, DATA MODEL). These mirror the controller's
//! stored entities but only carry what crosses a wire boundary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type NodeId = Uuid;
pub type VmId = Uuid;
pub type VolumeId = Uuid;
pub type SnapshotId = Uuid;
pub type NetworkId = Uuid;
pub type PoolId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    Offline,
    Maintenance,
    Error,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VolumeStatus {
    Creating,
    Available,
    InUse,
    Deleting,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Creating,
    Available,
    Deleting,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Active,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    Bridge,
    Ovs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Active,
    Inactive,
    Error,
}

/// `StoragePool.config`, type-tagged per `StoragePool.type` (spec §3;
/// Design Notes §9 resolves this as a tagged enum rather than an open
/// `serde_json::Value`, so the controller can validate it before ever
/// handing it to an agent driver).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolConfig {
    Nfs { server: String, export: String, mount_options: Option<String> },
    Lvm { volume_group: String },
    Ceph { monitors: Vec<String>, pool_name: String, user: String, keyring_path: String },
    Iscsi { portal: String, target_iqn: String },
}

/// One disk attachment on a VM (spec §3 `VM.disk_ids[]` plus the
/// request-side disk shape used when defining a VM, spec §8 scenario 1).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DiskSpec {
    pub volume_id: VolumeId,
    pub device: String,
    #[serde(default)]
    pub bootable: bool,
}

/// One NIC attachment on a VM (spec §3 `VM.network_interfaces[]`).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NicSpec {
    pub network_id: NetworkId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
}

/// Full shape the controller sends an agent for `vm.define_and_start`.
/// A superset of the REST `CreateVmRequest`: by the time this crosses
/// C2, every disk and NIC has already been bound to a real volume and
/// IP allocation.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VmDefineSpec {
    pub vm_id: VmId,
    pub name: String,
    pub vcpu: u32,
    pub memory_mb: u64,
    pub os_type: String,
    pub disks: Vec<DiskSpec>,
    pub networks: Vec<NicSpec>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Host facts an agent reports at `node.register` time and on every
/// status report (spec §3 `Node` minus controller-assigned fields).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NodeResources {
    pub hostname: String,
    pub ip_address: String,
    pub hypervisor_type: String,
    pub hypervisor_version: String,
    pub cpu_cores: u32,
    pub cpu_threads: u32,
    pub memory_total_bytes: u64,
    pub disk_total_bytes: u64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}
