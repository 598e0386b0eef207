//! `network.*` method handlers (spec §4.5).

use corevirt_proto::payloads::{NetworkAttachTapRequest, NetworkAttachTapResponse, NetworkDetachTapRequest, NetworkEnsureRequest};
use corevirt_proto::{ErrorCode, RpcError};

use crate::drivers::NetworkDriver;

use super::{driver_error, field};

pub async fn ensure(driver: &dyn NetworkDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: NetworkEnsureRequest = field(&payload, "request")?;
    driver
        .ensure(&req.network_id.to_string(), &req.cidr, req.vlan_id)
        .await
        .map_err(|e| driver_error(ErrorCode::NetworkError, e))?;
    Ok(serde_json::json!({ "network_id": req.network_id }))
}

pub async fn attach_tap(driver: &dyn NetworkDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: NetworkAttachTapRequest = field(&payload, "request")?;
    let (tap_name, mac) = driver
        .attach_tap(&req.network_id.to_string(), &req.vm_id.to_string())
        .await
        .map_err(|e| driver_error(ErrorCode::NetworkError, e))?;
    Ok(serde_json::to_value(NetworkAttachTapResponse { tap_name, mac }).expect("serializes"))
}

pub async fn detach_tap(driver: &dyn NetworkDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: NetworkDetachTapRequest = field(&payload, "request")?;
    driver
        .detach_tap(&req.network_id.to_string(), &req.vm_id.to_string())
        .await
        .map_err(|e| driver_error(ErrorCode::NetworkError, e))?;
    Ok(serde_json::json!({ "network_id": req.network_id, "vm_id": req.vm_id }))
}
