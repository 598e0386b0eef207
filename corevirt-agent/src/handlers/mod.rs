//! Method-group dispatch (spec §4.5: `vm.*`, `volume.*`, `snapshot.*`,
//! `network.*`), fronted by the idempotency cache.

pub mod network;
pub mod snapshot;
pub mod vm;
pub mod volume;

use std::sync::Arc;

use corevirt_proto::{ErrorCode, RpcError};
use serde::de::DeserializeOwned;

use crate::drivers::{HypervisorDriver, NetworkDriver, StorageDriver};
use crate::idempotency::IdempotencyCache;

pub struct Handlers {
    hypervisor: Arc<dyn HypervisorDriver>,
    storage: Arc<dyn StorageDriver>,
    network: Arc<dyn NetworkDriver>,
    idempotency: IdempotencyCache,
}

impl Handlers {
    pub fn new(hypervisor: Arc<dyn HypervisorDriver>, storage: Arc<dyn StorageDriver>, network: Arc<dyn NetworkDriver>) -> Self {
        Self { hypervisor, storage, network, idempotency: IdempotencyCache::default() }
    }

    /// Routes one inbound `request` frame by method name. Requests that
    /// carry a `task_id` (everything except the reconciliation sweep's
    /// bare `*.describe` calls) replay their cached result on retry
    /// rather than re-executing the driver call.
    pub async fn dispatch(&self, method: &str, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
        let task_id = payload.get("task_id").and_then(|v| v.as_str()).map(str::to_string);
        if let Some(task_id) = &task_id {
            if let Some(cached) = self.idempotency.get(task_id).await {
                return cached;
            }
        }

        let result = self.dispatch_uncached(method, payload).await;

        if let Some(task_id) = task_id {
            self.idempotency.put(task_id, result.clone()).await;
        }
        result
    }

    async fn dispatch_uncached(&self, method: &str, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
        use corevirt_proto::methods::*;
        match method {
            VM_DEFINE_AND_START => vm::define_and_start(&*self.hypervisor, payload).await,
            VM_STOP => vm::stop(&*self.hypervisor, payload).await,
            VM_RESTART => vm::restart(&*self.hypervisor, payload).await,
            VM_MIGRATE => vm::migrate(&*self.hypervisor, payload).await,
            VM_ATTACH_DISK => vm::attach_disk(&*self.hypervisor, payload).await,
            VM_DETACH_DISK => vm::detach_disk(&*self.hypervisor, payload).await,
            VM_DESCRIBE => vm::describe(&*self.hypervisor, payload).await,
            VOLUME_CREATE => volume::create(&*self.storage, payload).await,
            VOLUME_DELETE => volume::delete(&*self.storage, payload).await,
            VOLUME_RESIZE => volume::resize(&*self.storage, payload).await,
            VOLUME_CLONE => volume::clone(&*self.storage, payload).await,
            VOLUME_DESCRIBE => volume::describe(&*self.storage, payload).await,
            SNAPSHOT_CREATE => snapshot::create(&*self.storage, payload).await,
            SNAPSHOT_DELETE => snapshot::delete(&*self.storage, payload).await,
            SNAPSHOT_RESTORE => snapshot::restore(&*self.storage, payload).await,
            NETWORK_ENSURE => network::ensure(&*self.network, payload).await,
            NETWORK_ATTACH_TAP => network::attach_tap(&*self.network, payload).await,
            NETWORK_DETACH_TAP => network::detach_tap(&*self.network, payload).await,
            other => Err(RpcError::new(ErrorCode::MethodNotFound, format!("agent has no handler for {other}"))),
        }
    }
}

fn bad_request(msg: impl Into<String>) -> RpcError {
    RpcError::new(ErrorCode::InvalidRequest, msg.into())
}

fn driver_error(code: ErrorCode, err: anyhow::Error) -> RpcError {
    RpcError::new(code, err.to_string())
}

/// Pulls `payload[key]` and deserializes it into `T`, mapping any shape
/// mismatch to an `InvalidRequest` RPC error instead of panicking.
fn field<T: DeserializeOwned>(payload: &serde_json::Value, key: &str) -> Result<T, RpcError> {
    let value = payload.get(key).cloned().ok_or_else(|| bad_request(format!("missing '{key}' field")))?;
    serde_json::from_value(value).map_err(|e| bad_request(format!("malformed '{key}': {e}")))
}
