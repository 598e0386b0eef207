//! `volume.*` method handlers (spec §4.5).

use corevirt_proto::payloads::{VolumeCloneRequest, VolumeCreateRequest, VolumeCreateResponse, VolumeDeleteRequest, VolumeDescribeRequest, VolumeDescribeResponse, VolumeResizeRequest};
use corevirt_proto::{ErrorCode, RpcError};

use crate::drivers::StorageDriver;

use super::{driver_error, field};

pub async fn create(driver: &dyn StorageDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: VolumeCreateRequest = field(&payload, "request")?;
    let path = driver
        .create_volume(&req.volume_id.to_string(), &req.pool_config, req.size_gb)
        .await
        .map_err(|e| driver_error(ErrorCode::StorageError, e))?;
    Ok(serde_json::to_value(VolumeCreateResponse { volume_id: req.volume_id, path }).expect("serializes"))
}

pub async fn delete(driver: &dyn StorageDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: VolumeDeleteRequest = field(&payload, "request")?;
    driver.delete_volume(&req.volume_id.to_string()).await.map_err(|e| driver_error(ErrorCode::StorageError, e))?;
    Ok(serde_json::json!({ "volume_id": req.volume_id }))
}

pub async fn resize(driver: &dyn StorageDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: VolumeResizeRequest = field(&payload, "request")?;
    driver.resize_volume(&req.volume_id.to_string(), req.new_size_gb).await.map_err(|e| driver_error(ErrorCode::StorageError, e))?;
    Ok(serde_json::json!({ "volume_id": req.volume_id, "size_gb": req.new_size_gb }))
}

pub async fn clone(driver: &dyn StorageDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: VolumeCloneRequest = field(&payload, "request")?;
    let path = driver
        .clone_volume(&req.source_volume_id.to_string(), &req.new_volume_id.to_string())
        .await
        .map_err(|e| driver_error(ErrorCode::StorageError, e))?;
    Ok(serde_json::to_value(VolumeCreateResponse { volume_id: req.new_volume_id, path }).expect("serializes"))
}

/// Reconciliation-only method: bare `{"request": VolumeDescribeRequest}`.
pub async fn describe(driver: &dyn StorageDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: VolumeDescribeRequest = field(&payload, "request")?;
    let (status, path) = driver.describe_volume(&req.volume_id.to_string()).await.map_err(|e| driver_error(ErrorCode::StorageError, e))?;
    Ok(serde_json::to_value(VolumeDescribeResponse { volume_id: req.volume_id, size_gb: 0, path, status }).expect("serializes"))
}
