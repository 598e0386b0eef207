//! Network driver: bridge/OVS ensure plus per-VM tap attach/detach.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait NetworkDriver: Send + Sync {
    /// Materializes the network itself. `vlan_id` selects one of the two
    /// modes spec §4.5 describes: `Some` means a VLAN sub-interface
    /// tagged off the uplink, `None` means a flat untagged bridge.
    async fn ensure(&self, network_id: &str, cidr: &str, vlan_id: Option<u16>) -> anyhow::Result<()>;
    async fn attach_tap(&self, network_id: &str, vm_id: &str) -> anyhow::Result<(String, String)>;
    async fn detach_tap(&self, network_id: &str, vm_id: &str) -> anyhow::Result<()>;
}

pub struct StubNetworkDriver;

#[async_trait]
impl NetworkDriver for StubNetworkDriver {
    async fn ensure(&self, network_id: &str, cidr: &str, vlan_id: Option<u16>) -> anyhow::Result<()> {
        match vlan_id {
            Some(vlan) => {
                debug!(network_id, cidr, vlan, "ensuring vlan-tagged bridge");
                // TODO: `ip link add link <uplink> name br-<id>.<vlan> type vlan id <vlan>`.
            }
            None => {
                debug!(network_id, cidr, "ensuring flat bridge");
                // TODO: `ip link add name br-<id> type bridge`.
            }
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
        Ok(())
    }

    async fn attach_tap(&self, network_id: &str, vm_id: &str) -> anyhow::Result<(String, String)> {
        debug!(network_id, vm_id, "attaching tap");
        // TODO: `ip tuntap add` + bridge the tap into the network's device.
        let tap_name = format!("tap-{}", &vm_id[..vm_id.len().min(8)]);
        let mac = synthetic_mac(vm_id);
        Ok((tap_name, mac))
    }

    async fn detach_tap(&self, network_id: &str, vm_id: &str) -> anyhow::Result<()> {
        debug!(network_id, vm_id, "detaching tap");
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(())
    }
}

/// Deterministic locally-administered MAC derived from a VM id, so the
/// same VM always attaches with the same address across retries.
fn synthetic_mac(vm_id: &str) -> String {
    let bytes = vm_id.as_bytes();
    let mut octets = [0u8; 5];
    for (i, o) in octets.iter_mut().enumerate() {
        *o = bytes.get(i).copied().unwrap_or(0);
    }
    format!("52:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", octets[0], octets[1], octets[2], octets[3], octets[4])
}
