//! Exercises `Handlers::dispatch` against the stub drivers directly,
//! without a real controller connection.

use std::sync::Arc;

use corevirt_agent::drivers::{StubHypervisorDriver, StubNetworkDriver, StubStorageDriver};
use corevirt_agent::Handlers;
use corevirt_proto::entities::{DiskSpec, NicSpec, VmDefineSpec};
use corevirt_proto::ErrorCode;

fn handlers() -> Handlers {
    Handlers::new(Arc::new(StubHypervisorDriver), Arc::new(StubStorageDriver), Arc::new(StubNetworkDriver))
}

#[tokio::test]
async fn vm_define_and_start_reports_running() {
    let h = handlers();
    let spec = VmDefineSpec {
        vm_id: uuid::Uuid::new_v4(),
        name: "vm-1".to_string(),
        vcpu: 2,
        memory_mb: 2048,
        os_type: "linux".to_string(),
        disks: vec![DiskSpec { volume_id: uuid::Uuid::new_v4(), device: "vda".to_string(), bootable: true }],
        networks: vec![NicSpec { network_id: uuid::Uuid::new_v4(), mac: None, ip: None, model: "virtio".to_string(), bridge: None }],
        metadata: serde_json::json!({}),
    };
    let payload = serde_json::json!({ "task_id": "task-1", "spec": spec });
    let result = h.dispatch(corevirt_proto::methods::VM_DEFINE_AND_START, payload).await.expect("handler ok");
    assert_eq!(result["status"], "running");
}

#[tokio::test]
async fn duplicate_task_id_replays_cached_result() {
    let h = handlers();
    let vm_id = uuid::Uuid::new_v4();
    let payload = serde_json::json!({ "task_id": "task-2", "vm_id": vm_id });
    let first = h.dispatch(corevirt_proto::methods::VM_RESTART, payload.clone()).await.expect("first call ok");
    let second = h.dispatch(corevirt_proto::methods::VM_RESTART, payload).await.expect("replayed ok");
    assert_eq!(first, second);
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let h = handlers();
    let err = h.dispatch("vm.teleport", serde_json::json!({})).await.expect_err("should fail");
    assert_eq!(err.code, ErrorCode::MethodNotFound);
}

#[tokio::test]
async fn malformed_payload_is_invalid_request() {
    let h = handlers();
    let err = h.dispatch(corevirt_proto::methods::VM_STOP, serde_json::json!({"task_id": "task-3"})).await.expect_err("missing request field");
    assert_eq!(err.code, ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn network_ensure_accepts_vlan_and_flat_modes() {
    let h = handlers();
    for vlan_id in [None, Some(42u16)] {
        let req = corevirt_proto::payloads::NetworkEnsureRequest {
            network_id: uuid::Uuid::new_v4(),
            cidr: "10.1.0.0/24".to_string(),
            gateway: Some("10.1.0.1".to_string()),
            mtu: 1500,
            vlan_id,
            network_type: "bridge".to_string(),
        };
        let payload = serde_json::json!({ "task_id": uuid::Uuid::new_v4().to_string(), "request": req });
        h.dispatch(corevirt_proto::methods::NETWORK_ENSURE, payload).await.expect("ensure ok");
    }
}
