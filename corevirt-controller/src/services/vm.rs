//! VM lifecycle orchestration (spec §4.4, "VM lifecycle").

use std::sync::Arc;
use std::time::Duration;

use corevirt_proto::entities::{DiskSpec, NicSpec, VmDefineSpec};
use corevirt_proto::payloads::{NetworkAttachTapRequest, NetworkEnsureRequest, VmAttachDiskRequest, VmDetachDiskRequest, VmStopRequest};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::command::{Command, NodeStatus, VmDiskRequest, VmNicRequest, VmStatus, VolumeStatus};
use crate::ipam::IpAllocator;
use crate::registry::AgentRegistry;
use crate::rpc::transport;
use crate::store::{MetadataStore, Result, StoreError};
use crate::task_keys;

pub struct CreateVmRequest {
    pub name: String,
    pub node_id: String,
    pub vcpu: u32,
    pub memory_mb: u64,
    pub os_type: String,
    pub disks: Vec<VmDiskRequest>,
    pub networks: Vec<VmNicRequest>,
    pub metadata: serde_json::Value,
}

/// Per-VM advisory lock (spec §5, "Ordering guarantees"): one entry
/// per vm id, acquired before any state-transitioning operation.
#[derive(Default)]
struct VmLocks(Mutex<std::collections::HashMap<String, Arc<Mutex<()>>>>);

impl VmLocks {
    async fn acquire(&self, vm_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.0.lock().await;
        locks.entry(vm_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

pub struct VmService {
    store: Arc<dyn MetadataStore>,
    agents: Arc<AgentRegistry>,
    ipam: Arc<IpAllocator>,
    audit: Arc<AuditLogger>,
    locks: VmLocks,
}

impl VmService {
    pub fn new(store: Arc<dyn MetadataStore>, agents: Arc<AgentRegistry>, ipam: Arc<IpAllocator>, audit: Arc<AuditLogger>) -> Arc<Self> {
        Arc::new(Self { store, agents, ipam, audit, locks: VmLocks::default() })
    }

    pub async fn create(&self, actor: &str, req: CreateVmRequest) -> Result<crate::command::VmData> {
        let id = Uuid::new_v4().to_string();
        let cmd = Command::CreateVm {
            request_id: Uuid::new_v4().to_string(),
            id: id.clone(),
            timestamp: now(),
            name: req.name,
            node_id: req.node_id,
            vcpu: req.vcpu,
            memory_mb: req.memory_mb,
            os_type: req.os_type,
            disks: req.disks,
            networks: req.networks,
            metadata: req.metadata,
        };
        let (resp, _) = self.store.apply(cmd).await?;
        self.audit.vm_created(actor, &id);
        match resp {
            crate::command::Response::Vm(vm) => Ok(vm),
            _ => Err(StoreError::Internal("unexpected response to CreateVm".into())),
        }
    }

    /// `start` from `stopped|error` → agent `vm.define_and_start`.
    pub async fn start(&self, actor: &str, vm_id: &str) -> Result<TaskHandle> {
        let guard = self.locks.acquire(vm_id).await;
        let _g = guard.lock().await;

        let vm = self.store.get_vm(vm_id).await?;
        if !matches!(vm.status, VmStatus::Stopped | VmStatus::Error) {
            return Err(StoreError::PreconditionFailed(format!("vm {vm_id} is {:?}, cannot start", vm.status)));
        }
        let Some(node_id) = vm.node_id.clone() else {
            return Err(StoreError::PreconditionFailed(format!("vm {vm_id} has no assigned node")));
        };
        self.transition(vm_id, VmStatus::Starting).await?;

        let task_id = self.create_task("vm.start", vm_id, &node_id, actor).await?;
        for nic in nic_specs(&vm.network_interfaces) {
            self.ensure_network_attached(&node_id, vm_id, &task_id, &nic).await?;
        }
        let spec = VmDefineSpec {
            vm_id: vm_id.parse().unwrap_or_default(),
            name: vm.name.clone(),
            vcpu: vm.vcpu,
            memory_mb: vm.memory_mb,
            os_type: vm.os_type.clone(),
            disks: disk_specs(&vm.disk_ids),
            networks: nic_specs(&vm.network_interfaces),
            metadata: vm.metadata.clone(),
        };
        let payload = serde_json::json!({ "task_id": task_id, "spec": spec });

        match self.dispatch(&node_id, corevirt_proto::methods::VM_DEFINE_AND_START, payload, transport::long_op_timeout()).await {
            Ok(_) => {
                self.transition(vm_id, VmStatus::Running).await?;
                self.complete_task(&task_id, serde_json::json!({"status": "running"})).await?;
            }
            Err(e) => {
                self.on_rpc_failure(vm_id, &task_id, e).await?;
            }
        }
        Ok(TaskHandle { task_id, vm_id: vm_id.to_string() })
    }

    pub async fn stop(&self, actor: &str, vm_id: &str, force: bool) -> Result<TaskHandle> {
        let guard = self.locks.acquire(vm_id).await;
        let _g = guard.lock().await;

        let vm = self.store.get_vm(vm_id).await?;
        if !matches!(vm.status, VmStatus::Running | VmStatus::Paused | VmStatus::Error) {
            return Err(StoreError::PreconditionFailed(format!("vm {vm_id} is {:?}, cannot stop", vm.status)));
        }
        let node_id = vm.node_id.clone().ok_or_else(|| StoreError::PreconditionFailed("vm has no node".into()))?;
        self.transition(vm_id, VmStatus::Stopping).await?;
        let task_id = self.create_task("vm.stop", vm_id, &node_id, actor).await?;

        let req = VmStopRequest { vm_id: vm_id.parse().unwrap_or_default(), force };
        let payload = serde_json::json!({ "task_id": task_id, "request": req });
        match self.dispatch(&node_id, corevirt_proto::methods::VM_STOP, payload, transport::default_timeout()).await {
            Ok(_) => {
                self.transition(vm_id, VmStatus::Stopped).await?;
                self.complete_task(&task_id, serde_json::json!({"status": "stopped"})).await?;
            }
            Err(e) => self.on_rpc_failure(vm_id, &task_id, e).await?,
        }
        Ok(TaskHandle { task_id, vm_id: vm_id.to_string() })
    }

    pub async fn restart(&self, actor: &str, vm_id: &str) -> Result<TaskHandle> {
        let guard = self.locks.acquire(vm_id).await;
        let _g = guard.lock().await;

        let vm = self.store.get_vm(vm_id).await?;
        if vm.status != VmStatus::Running {
            return Err(StoreError::PreconditionFailed(format!("vm {vm_id} is {:?}, cannot restart", vm.status)));
        }
        let node_id = vm.node_id.clone().ok_or_else(|| StoreError::PreconditionFailed("vm has no node".into()))?;
        self.transition(vm_id, VmStatus::Restarting).await?;
        let task_id = self.create_task("vm.restart", vm_id, &node_id, actor).await?;

        let payload = serde_json::json!({ "task_id": task_id, "vm_id": vm_id });
        match self.dispatch(&node_id, corevirt_proto::methods::VM_RESTART, payload, transport::long_op_timeout()).await {
            Ok(_) => {
                self.transition(vm_id, VmStatus::Running).await?;
                self.complete_task(&task_id, serde_json::json!({"status": "running"})).await?;
            }
            Err(e) => self.on_rpc_failure(vm_id, &task_id, e).await?,
        }
        Ok(TaskHandle { task_id, vm_id: vm_id.to_string() })
    }

    pub async fn delete(&self, actor: &str, vm_id: &str) -> Result<()> {
        let guard = self.locks.acquire(vm_id).await;
        let _g = guard.lock().await;

        let vm = self.store.get_vm(vm_id).await?;
        if vm.status == VmStatus::Running {
            return Err(StoreError::PreconditionFailed(format!("vm {vm_id} is running")));
        }
        for network_id in nic_specs(&vm.network_interfaces).into_iter().map(|n| n.network_id.to_string()) {
            self.ipam.release(&network_id, vm_id).await?;
        }
        self.store
            .apply(Command::DeleteVm { request_id: Uuid::new_v4().to_string(), id: vm_id.to_string(), timestamp: now() })
            .await?;
        self.audit.vm_deleted(actor, vm_id);
        Ok(())
    }

    pub async fn migrate(&self, actor: &str, vm_id: &str, target_node_id: &str) -> Result<TaskHandle> {
        let guard = self.locks.acquire(vm_id).await;
        let _g = guard.lock().await;

        let vm = self.store.get_vm(vm_id).await?;
        let source_node = vm.node_id.clone().ok_or_else(|| StoreError::PreconditionFailed("vm has no node".into()))?;
        self.transition(vm_id, VmStatus::Migrating).await?;
        let task_id = self.create_task("vm.migrate", vm_id, &source_node, actor).await?;

        let payload = serde_json::json!({ "task_id": task_id, "vm_id": vm_id, "target_node_id": target_node_id });
        match self.dispatch(&source_node, corevirt_proto::methods::VM_MIGRATE, payload, transport::long_op_timeout()).await {
            Ok(_) => {
                self.store
                    .apply(Command::SetVmNode { request_id: Uuid::new_v4().to_string(), id: vm_id.to_string(), timestamp: now(), node_id: Some(target_node_id.to_string()) })
                    .await?;
                self.transition(vm_id, VmStatus::Running).await?;
                self.complete_task(&task_id, serde_json::json!({"node_id": target_node_id})).await?;
            }
            Err(e) => self.on_rpc_failure(vm_id, &task_id, e).await?,
        }
        Ok(TaskHandle { task_id, vm_id: vm_id.to_string() })
    }

    /// `attach_volume(volume_id)` (spec §4.4, "VM lifecycle"): if the VM is
    /// running, agent `vm.attach_disk` first; the DB update (and the volume's
    /// `available → in_use` transition) only happens once that succeeds. If
    /// the VM isn't running there's nothing live to attach to, so this is a
    /// DB-only update.
    pub async fn attach_volume(&self, actor: &str, vm_id: &str, volume_id: &str, device: &str) -> Result<crate::command::VmData> {
        let guard = self.locks.acquire(vm_id).await;
        let _g = guard.lock().await;

        let vm = self.store.get_vm(vm_id).await?;
        let vol = self.store.get_volume(volume_id).await?;
        if vol.status != VolumeStatus::Available {
            return Err(StoreError::PreconditionFailed(format!("volume {volume_id} is not available")));
        }

        if vm.status == VmStatus::Running {
            let node_id = vm.node_id.clone().ok_or_else(|| StoreError::PreconditionFailed("vm has no node".into()))?;
            let task_id = self.create_task("vm.attach_volume", vm_id, &node_id, actor).await?;
            let req = VmAttachDiskRequest {
                vm_id: vm_id.parse().unwrap_or_default(),
                disk: DiskSpec { volume_id: volume_id.parse().unwrap_or_default(), device: device.to_string(), bootable: false },
            };
            let payload = serde_json::json!({ "task_id": task_id, "request": req });
            match self.dispatch(&node_id, corevirt_proto::methods::VM_ATTACH_DISK, payload, transport::default_timeout()).await {
                Ok(result) => self.complete_task(&task_id, result).await?,
                Err(e) => {
                    self.on_rpc_failure(vm_id, &task_id, e.clone()).await?;
                    return Err(StoreError::PreconditionFailed(format!("agent attach_disk failed: {e}")));
                }
            }
        }

        let (resp, _) = self
            .store
            .apply(Command::AttachVolume { request_id: Uuid::new_v4().to_string(), vm_id: vm_id.to_string(), timestamp: now(), volume_id: volume_id.to_string(), device: device.to_string() })
            .await?;
        self.audit.record(actor, "vm.volume_attached", "vm", vm_id, serde_json::json!({ "volume_id": volume_id }));
        match resp {
            crate::command::Response::Vm(vm) => Ok(vm),
            _ => Err(StoreError::Internal("unexpected response to AttachVolume".into())),
        }
    }

    /// `detach_volume(volume_id)`: mirror of [`Self::attach_volume`].
    pub async fn detach_volume(&self, actor: &str, vm_id: &str, volume_id: &str) -> Result<crate::command::VmData> {
        let guard = self.locks.acquire(vm_id).await;
        let _g = guard.lock().await;

        let vm = self.store.get_vm(vm_id).await?;

        if vm.status == VmStatus::Running {
            let node_id = vm.node_id.clone().ok_or_else(|| StoreError::PreconditionFailed("vm has no node".into()))?;
            let task_id = self.create_task("vm.detach_volume", vm_id, &node_id, actor).await?;
            let req = VmDetachDiskRequest { vm_id: vm_id.parse().unwrap_or_default(), volume_id: volume_id.parse().unwrap_or_default() };
            let payload = serde_json::json!({ "task_id": task_id, "request": req });
            match self.dispatch(&node_id, corevirt_proto::methods::VM_DETACH_DISK, payload, transport::default_timeout()).await {
                Ok(result) => self.complete_task(&task_id, result).await?,
                Err(e) => {
                    self.on_rpc_failure(vm_id, &task_id, e.clone()).await?;
                    return Err(StoreError::PreconditionFailed(format!("agent detach_disk failed: {e}")));
                }
            }
        }

        let (resp, _) = self
            .store
            .apply(Command::DetachVolume { request_id: Uuid::new_v4().to_string(), vm_id: vm_id.to_string(), timestamp: now(), volume_id: volume_id.to_string() })
            .await?;
        self.audit.record(actor, "vm.volume_detached", "vm", vm_id, serde_json::json!({ "volume_id": volume_id }));
        match resp {
            crate::command::Response::Vm(vm) => Ok(vm),
            _ => Err(StoreError::Internal("unexpected response to DetachVolume".into())),
        }
    }

    /// Lazily materializes a VM's network on its node: `network.ensure`
    /// brings up the node-local bridge/VLAN sub-interface (idempotent, a
    /// no-op if a prior VM on this node already triggered it), then
    /// `network.attach_tap` plugs in this VM's tap (spec §4.4 "Network
    /// lifecycle", §4.5). Both calls key off an id derived from the
    /// enclosing task so a retried `start` replays rather than re-runs them.
    async fn ensure_network_attached(&self, node_id: &str, vm_id: &str, task_id: &str, nic: &NicSpec) -> Result<()> {
        let network = self.store.get_network(&nic.network_id.to_string()).await?;

        let ensure_req = NetworkEnsureRequest {
            network_id: nic.network_id,
            cidr: network.cidr,
            gateway: network.gateway,
            mtu: network.mtu,
            vlan_id: network.vlan_id,
            network_type: format!("{:?}", network.network_type).to_lowercase(),
        };
        let ensure_task_id = format!("{task_id}:ensure:{}", nic.network_id);
        let ensure_payload = serde_json::json!({ "task_id": ensure_task_id, "request": ensure_req });
        self.dispatch(node_id, corevirt_proto::methods::NETWORK_ENSURE, ensure_payload, transport::default_timeout())
            .await
            .map_err(|e| StoreError::PreconditionFailed(format!("network ensure failed: {e}")))?;

        let attach_req = NetworkAttachTapRequest { network_id: nic.network_id, vm_id: vm_id.parse().unwrap_or_default(), nic: nic.clone() };
        let attach_task_id = format!("{task_id}:attach_tap:{}", nic.network_id);
        let attach_payload = serde_json::json!({ "task_id": attach_task_id, "request": attach_req });
        self.dispatch(node_id, corevirt_proto::methods::NETWORK_ATTACH_TAP, attach_payload, transport::default_timeout())
            .await
            .map_err(|e| StoreError::PreconditionFailed(format!("network attach_tap failed: {e}")))?;
        Ok(())
    }

    async fn transition(&self, vm_id: &str, status: VmStatus) -> Result<()> {
        self.store
            .apply(Command::TransitionVmStatus { request_id: Uuid::new_v4().to_string(), id: vm_id.to_string(), timestamp: now(), status })
            .await
            .map(|_| ())
    }

    async fn create_task(&self, task_type: &str, vm_id: &str, node_id: &str, actor: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.store
            .apply(Command::CreateTask {
                request_id: Uuid::new_v4().to_string(),
                id: id.clone(),
                timestamp: now(),
                task_type: task_type.to_string(),
                target_type: "vm".to_string(),
                target_id: vm_id.to_string(),
                node_id: Some(node_id.to_string()),
                payload: serde_json::json!({}),
                created_by: actor.to_string(),
                max_retries: task_keys::DEFAULT_MAX_RETRIES,
            })
            .await?;
        Ok(id)
    }

    async fn complete_task(&self, task_id: &str, result: serde_json::Value) -> Result<()> {
        self.store
            .apply(Command::CompleteTask { request_id: Uuid::new_v4().to_string(), id: task_id.to_string(), timestamp: now(), result })
            .await
            .map(|_| ())
    }

    /// Transport failure: commit the intent row, mark the task failed,
    /// leave reconciliation to converge it later (spec §7, "Transport").
    async fn on_rpc_failure(&self, vm_id: &str, task_id: &str, err: corevirt_proto::RpcError) -> Result<()> {
        warn!(vm_id, task_id, error = %err, "vm rpc failed, deferring to reconciliation");
        self.store
            .apply(Command::FailTask { request_id: Uuid::new_v4().to_string(), id: task_id.to_string(), timestamp: now(), error: err.to_string(), retry: err.code == corevirt_proto::ErrorCode::Timeout })
            .await?;
        Ok(())
    }

    async fn dispatch(&self, node_id: &str, method: &str, payload: serde_json::Value, timeout: Duration) -> std::result::Result<serde_json::Value, corevirt_proto::RpcError> {
        let Some(conn) = self.agents.get(node_id).await else {
            return Err(corevirt_proto::RpcError::new(corevirt_proto::ErrorCode::NodeOffline, format!("node {node_id} is not connected")));
        };
        transport::call(&conn, method, payload, timeout).await
    }
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct TaskHandle {
    pub task_id: String,
    pub vm_id: String,
}

/// `VmData.disk_ids` only records volume ids; the device name is a
/// controller-assigned convention (`vda`, `vdb`, ...) since the intent
/// request's device labels aren't retained past `create`.
fn disk_specs(disk_ids: &[String]) -> Vec<DiskSpec> {
    disk_ids
        .iter()
        .enumerate()
        .map(|(i, volume_id)| DiskSpec {
            volume_id: volume_id.parse().unwrap_or_default(),
            device: format!("vd{}", (b'a' + i as u8) as char),
            bootable: i == 0,
        })
        .collect()
}

fn nic_specs(network_interfaces: &serde_json::Value) -> Vec<NicSpec> {
    serde_json::from_value::<Vec<crate::command::VmNicRequest>>(network_interfaces.clone())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|n| {
            Some(NicSpec {
                network_id: n.network_id.parse().ok()?,
                mac: None,
                ip: None,
                model: n.model,
                bridge: None,
            })
        })
        .collect()
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
