//! `snapshot.*` method handlers (spec §4.5).

use corevirt_proto::payloads::{SnapshotCreateRequest, SnapshotCreateResponse, SnapshotDeleteRequest, SnapshotRestoreRequest};
use corevirt_proto::{ErrorCode, RpcError};

use crate::drivers::StorageDriver;

use super::{driver_error, field};

pub async fn create(driver: &dyn StorageDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: SnapshotCreateRequest = field(&payload, "request")?;
    let size_gb = driver
        .create_snapshot(&req.volume_id.to_string(), &req.snapshot_tag)
        .await
        .map_err(|e| driver_error(ErrorCode::StorageError, e))?;
    Ok(serde_json::to_value(SnapshotCreateResponse { snapshot_id: req.snapshot_id, size_gb }).expect("serializes"))
}

pub async fn delete(driver: &dyn StorageDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: SnapshotDeleteRequest = field(&payload, "request")?;
    driver
        .delete_snapshot(&req.volume_id.to_string(), &req.snapshot_id.to_string())
        .await
        .map_err(|e| driver_error(ErrorCode::StorageError, e))?;
    Ok(serde_json::json!({ "snapshot_id": req.snapshot_id }))
}

pub async fn restore(driver: &dyn StorageDriver, payload: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let req: SnapshotRestoreRequest = field(&payload, "request")?;
    driver
        .restore_snapshot(&req.volume_id.to_string(), &req.snapshot_id.to_string())
        .await
        .map_err(|e| driver_error(ErrorCode::StorageError, e))?;
    Ok(serde_json::json!({ "snapshot_id": req.snapshot_id, "volume_id": req.volume_id }))
}
