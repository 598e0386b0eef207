//! Hypervisor driver: VM define/start/stop/restart/migrate/disk-attach.

use std::time::Duration;

use async_trait::async_trait;
use corevirt_proto::entities::VmDefineSpec;
use tracing::debug;

#[async_trait]
pub trait HypervisorDriver: Send + Sync {
    async fn define_and_start(&self, spec: &VmDefineSpec) -> anyhow::Result<()>;
    async fn stop(&self, vm_id: &str, force: bool) -> anyhow::Result<()>;
    async fn restart(&self, vm_id: &str) -> anyhow::Result<()>;
    async fn migrate(&self, vm_id: &str, target_node_id: &str) -> anyhow::Result<()>;
    async fn attach_disk(&self, vm_id: &str, device: &str, volume_id: &str) -> anyhow::Result<()>;
    async fn detach_disk(&self, vm_id: &str, volume_id: &str) -> anyhow::Result<()>;
    async fn describe(&self, vm_id: &str) -> anyhow::Result<String>;
}

/// In-memory stub: performs the state transitions and timing a real
/// libvirt/virsh-backed driver would, without shelling out.
pub struct StubHypervisorDriver;

#[async_trait]
impl HypervisorDriver for StubHypervisorDriver {
    async fn define_and_start(&self, spec: &VmDefineSpec) -> anyhow::Result<()> {
        debug!(vm_id = %spec.vm_id, vcpu = spec.vcpu, memory_mb = spec.memory_mb, disks = spec.disks.len(), "defining and starting vm");
        // TODO: shell out to `virsh define` + `virsh start` once a real hypervisor backend lands.
        tokio::time::sleep(Duration::from_millis(80)).await;
        Ok(())
    }

    async fn stop(&self, vm_id: &str, force: bool) -> anyhow::Result<()> {
        debug!(vm_id, force, "stopping vm");
        tokio::time::sleep(Duration::from_millis(40)).await;
        Ok(())
    }

    async fn restart(&self, vm_id: &str) -> anyhow::Result<()> {
        debug!(vm_id, "restarting vm");
        tokio::time::sleep(Duration::from_millis(60)).await;
        Ok(())
    }

    async fn migrate(&self, vm_id: &str, target_node_id: &str) -> anyhow::Result<()> {
        debug!(vm_id, target_node_id, "migrating vm");
        // TODO: drive `virsh migrate --live` to the target node's libvirt URI.
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(())
    }

    async fn attach_disk(&self, vm_id: &str, device: &str, volume_id: &str) -> anyhow::Result<()> {
        debug!(vm_id, device, volume_id, "attaching disk");
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }

    async fn detach_disk(&self, vm_id: &str, volume_id: &str) -> anyhow::Result<()> {
        debug!(vm_id, volume_id, "detaching disk");
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }

    async fn describe(&self, vm_id: &str) -> anyhow::Result<String> {
        debug!(vm_id, "describing vm");
        // TODO: query real domain state via `virsh domstate` instead of assuming running.
        Ok("running".to_string())
    }
}
