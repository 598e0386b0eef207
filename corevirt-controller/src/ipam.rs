//! IP Pool Allocator (spec §4.3): a thin façade over [`MetadataStore`]
//! that adds the per-network exclusive lock the spec requires so two
//! concurrent `allocate` calls against the same network can never
//! observe the same `available` row.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::command::{Command, IpAllocationData, Response};
use crate::store::{MetadataStore, Result, StoreError};

#[derive(Default)]
struct NetworkLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NetworkLocks {
    async fn lock_for(&self, network_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(network_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct IpAllocator {
    store: Arc<dyn MetadataStore>,
    locks: NetworkLocks,
}

impl IpAllocator {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store, locks: NetworkLocks::default() }
    }

    pub async fn allocate(&self, network_id: &str) -> Result<IpAllocationData> {
        let lock = self.locks.lock_for(network_id).await;
        let _guard = lock.lock().await;
        let cmd = Command::AllocateIp {
            request_id: uuid::Uuid::new_v4().to_string(),
            network_id: network_id.to_string(),
            timestamp: now(),
        };
        match self.store.apply(cmd).await?.0 {
            Response::IpAllocation(a) => Ok(a),
            _ => Err(StoreError::Internal("unexpected apply() response for AllocateIp".into())),
        }
    }

    pub async fn associate(&self, alloc_id: &str, vm_id: &str) -> Result<IpAllocationData> {
        let cmd = Command::AssociateIp {
            request_id: uuid::Uuid::new_v4().to_string(),
            alloc_id: alloc_id.to_string(),
            vm_id: vm_id.to_string(),
            timestamp: now(),
        };
        match self.store.apply(cmd).await?.0 {
            Response::IpAllocation(a) => Ok(a),
            _ => Err(StoreError::Internal("unexpected apply() response for AssociateIp".into())),
        }
    }

    pub async fn release(&self, network_id: &str, vm_id: &str) -> Result<u32> {
        let lock = self.locks.lock_for(network_id).await;
        let _guard = lock.lock().await;
        let cmd = Command::ReleaseIps {
            request_id: uuid::Uuid::new_v4().to_string(),
            network_id: network_id.to_string(),
            vm_id: vm_id.to_string(),
            timestamp: now(),
        };
        match self.store.apply(cmd).await?.0 {
            Response::ReleasedCount { count } => Ok(count),
            _ => Err(StoreError::Internal("unexpected apply() response for ReleaseIps".into())),
        }
    }

    pub async fn reserve(&self, network_id: &str, ip_address: &str) -> Result<IpAllocationData> {
        let lock = self.locks.lock_for(network_id).await;
        let _guard = lock.lock().await;
        let cmd = Command::ReserveIp {
            request_id: uuid::Uuid::new_v4().to_string(),
            network_id: network_id.to_string(),
            ip_address: ip_address.to_string(),
            timestamp: now(),
        };
        match self.store.apply(cmd).await?.0 {
            Response::IpAllocation(a) => Ok(a),
            _ => Err(StoreError::Internal("unexpected apply() response for ReserveIp".into())),
        }
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{NetworkType, VmStatus};
    use crate::store::SqliteStore;

    #[tokio::test]
    async fn concurrent_allocate_never_double_assigns() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .apply(Command::CreateNetwork {
                request_id: "r1".into(),
                id: "net1".into(),
                timestamp: now(),
                name: "net1".into(),
                network_type: NetworkType::Bridge,
                cidr: "10.1.0.0/28".into(),
                gateway: None,
                mtu: 1500,
                vlan_id: None,
                node_id: "n1".into(),
            })
            .await
            .unwrap();
        let allocator = Arc::new(IpAllocator::new(store));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let a = allocator.clone();
            handles.push(tokio::spawn(async move { a.allocate("net1").await }));
        }
        let mut addrs = std::collections::HashSet::new();
        for h in handles {
            if let Ok(Ok(a)) = h.await {
                assert!(addrs.insert(a.ip_address), "duplicate allocation returned");
            }
        }
        let _ = VmStatus::Running;
    }
}
