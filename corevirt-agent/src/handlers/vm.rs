//! `vm.*` method handlers (spec §4.5).

use corevirt_proto::entities::VmDefineSpec;
use corevirt_proto::payloads::{VmAttachDiskRequest, VmDescribeRequest, VmDescribeResponse, VmDetachDiskRequest, VmLifecycleResponse, VmStopRequest};
use corevirt_proto::{ErrorCode, RpcError};

use crate::drivers::HypervisorDriver;

use super::{bad_request, driver_error, field};

pub async fn define_and_start(driver: &dyn HypervisorDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let spec: VmDefineSpec = field(&payload, "spec")?;
    driver.define_and_start(&spec).await.map_err(|e| driver_error(ErrorCode::HypervisorError, e))?;
    Ok(serde_json::to_value(VmLifecycleResponse { vm_id: spec.vm_id, status: "running".to_string() }).expect("serializes"))
}

pub async fn stop(driver: &dyn HypervisorDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: VmStopRequest = field(&payload, "request")?;
    driver.stop(&req.vm_id.to_string(), req.force).await.map_err(|e| driver_error(ErrorCode::HypervisorError, e))?;
    Ok(serde_json::to_value(VmLifecycleResponse { vm_id: req.vm_id, status: "stopped".to_string() }).expect("serializes"))
}

pub async fn restart(driver: &dyn HypervisorDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let vm_id: uuid::Uuid = payload.get("vm_id").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).ok_or_else(|| bad_request("missing vm_id"))?;
    driver.restart(&vm_id.to_string()).await.map_err(|e| driver_error(ErrorCode::HypervisorError, e))?;
    Ok(serde_json::to_value(VmLifecycleResponse { vm_id, status: "running".to_string() }).expect("serializes"))
}

pub async fn migrate(driver: &dyn HypervisorDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let vm_id: uuid::Uuid = payload.get("vm_id").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).ok_or_else(|| bad_request("missing vm_id"))?;
    let target_node_id = payload.get("target_node_id").and_then(|v| v.as_str()).ok_or_else(|| bad_request("missing target_node_id"))?;
    driver.migrate(&vm_id.to_string(), target_node_id).await.map_err(|e| driver_error(ErrorCode::HypervisorError, e))?;
    Ok(serde_json::to_value(VmLifecycleResponse { vm_id, status: "running".to_string() }).expect("serializes"))
}

pub async fn attach_disk(driver: &dyn HypervisorDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: VmAttachDiskRequest = field(&payload, "request")?;
    driver
        .attach_disk(&req.vm_id.to_string(), &req.disk.device, &req.disk.volume_id.to_string())
        .await
        .map_err(|e| driver_error(ErrorCode::HypervisorError, e))?;
    Ok(serde_json::json!({ "vm_id": req.vm_id, "device": req.disk.device }))
}

pub async fn detach_disk(driver: &dyn HypervisorDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: VmDetachDiskRequest = field(&payload, "request")?;
    driver.detach_disk(&req.vm_id.to_string(), &req.volume_id.to_string()).await.map_err(|e| driver_error(ErrorCode::HypervisorError, e))?;
    Ok(serde_json::json!({ "vm_id": req.vm_id, "volume_id": req.volume_id }))
}

/// Reconciliation-only method (spec §4.4 "Failure semantics"): no
/// `task_id` wrapper, payload is a bare `{"request": VmDescribeRequest}`.
pub async fn describe(driver: &dyn HypervisorDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: VmDescribeRequest = field(&payload, "request")?;
    let status = driver.describe(&req.vm_id.to_string()).await.map_err(|e| driver_error(ErrorCode::HypervisorError, e))?;
    Ok(serde_json::to_value(VmDescribeResponse { vm_id: req.vm_id, status, disks: vec![], networks: vec![] }).expect("serializes"))
}
