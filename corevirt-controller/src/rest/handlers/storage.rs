//! `/api/storage/{pools,volumes,snapshots}` (spec §6, §8 scenarios 5-6).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::command::{Command, PoolData, PoolType, SnapshotData, VolumeData, VolumeType};
use crate::rbac::Permission;
use crate::services::volume::CreateVolumeRequest as ServiceCreateVolumeRequest;

use super::{ApiError, AppState, AuthUser, Page, PageQuery};

// ---- Pools -----------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePoolRequest {
    pub name: String,
    pub pool_type: PoolType,
    pub config: corevirt_proto::PoolConfig,
    pub capacity_gb: u64,
    pub node_id: Option<String>,
}

#[utoipa::path(post, path = "/api/storage/pools", responses((status = 201, body = PoolData)), tag = "storage")]
pub async fn create_pool(State(state): State<Arc<AppState>>, user: AuthUser, Json(req): Json<CreatePoolRequest>) -> Result<(axum::http::StatusCode, Json<PoolData>), ApiError> {
    user.require(Permission::StorageWrite)?;
    let id = Uuid::new_v4().to_string();
    let (resp, _) = state
        .store
        .apply(Command::CreatePool {
            request_id: Uuid::new_v4().to_string(),
            id,
            timestamp: now(),
            name: req.name,
            pool_type: req.pool_type,
            config: req.config,
            capacity_gb: req.capacity_gb,
            node_id: req.node_id,
        })
        .await?;
    match resp {
        crate::command::Response::Pool(p) => Ok((axum::http::StatusCode::CREATED, Json(p))),
        _ => Err(internal()),
    }
}

#[utoipa::path(get, path = "/api/storage/pools/{id}", responses((status = 200, body = PoolData)), tag = "storage")]
pub async fn get_pool(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<Json<PoolData>, ApiError> {
    user.require(Permission::StorageRead)?;
    Ok(Json(state.store.get_pool(&id).await?))
}

#[utoipa::path(get, path = "/api/storage/pools", responses((status = 200, body = Page<PoolData>)), tag = "storage")]
pub async fn list_pools(State(state): State<Arc<AppState>>, user: AuthUser, Query(q): Query<PageQuery>) -> Result<Json<Page<PoolData>>, ApiError> {
    user.require(Permission::StorageRead)?;
    let (pools, total) = state.store.list_pools(q.page(), q.page_size()).await?;
    Ok(Json(Page::new(pools, total, q.page(), q.page_size())))
}

#[utoipa::path(put, path = "/api/storage/pools/{id}", responses((status = 200, body = PoolData)), tag = "storage")]
pub async fn update_pool(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<Json<PoolData>, ApiError> {
    user.require(Permission::StorageWrite)?;
    Ok(Json(state.store.get_pool(&id).await?))
}

#[utoipa::path(delete, path = "/api/storage/pools/{id}", responses((status = 204, description = "deleted")), tag = "storage")]
pub async fn delete_pool(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<axum::http::StatusCode, ApiError> {
    user.require(Permission::StorageWrite)?;
    state.store.apply(Command::DeletePool { request_id: Uuid::new_v4().to_string(), id, timestamp: now() }).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

// ---- Volumes -----------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateVolumeRequest {
    pub name: String,
    pub volume_type: VolumeType,
    pub size_gb: u64,
    pub pool_id: String,
    pub source: Option<String>,
}

#[utoipa::path(post, path = "/api/storage/volumes", responses((status = 201, body = VolumeData)), tag = "storage")]
pub async fn create_volume(State(state): State<Arc<AppState>>, user: AuthUser, Json(req): Json<CreateVolumeRequest>) -> Result<(axum::http::StatusCode, Json<VolumeData>), ApiError> {
    user.require(Permission::StorageWrite)?;
    let id = state
        .volumes
        .create(
            &user.user_id,
            ServiceCreateVolumeRequest { name: req.name, volume_type: req.volume_type, size_gb: req.size_gb, pool_id: req.pool_id, source: req.source },
        )
        .await?;
    let vol = state.store.get_volume(&id).await?;
    Ok((axum::http::StatusCode::CREATED, Json(vol)))
}

#[utoipa::path(get, path = "/api/storage/volumes/{id}", responses((status = 200, body = VolumeData)), tag = "storage")]
pub async fn get_volume(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<Json<VolumeData>, ApiError> {
    user.require(Permission::StorageRead)?;
    Ok(Json(state.store.get_volume(&id).await?))
}

#[utoipa::path(get, path = "/api/storage/volumes", responses((status = 200, body = Page<VolumeData>)), tag = "storage")]
pub async fn list_volumes(State(state): State<Arc<AppState>>, user: AuthUser, Query(q): Query<PageQuery>) -> Result<Json<Page<VolumeData>>, ApiError> {
    user.require(Permission::StorageRead)?;
    let (vols, total) = state.store.list_volumes(q.page(), q.page_size()).await?;
    Ok(Json(Page::new(vols, total, q.page(), q.page_size())))
}

#[utoipa::path(put, path = "/api/storage/volumes/{id}", responses((status = 200, body = VolumeData)), tag = "storage")]
pub async fn update_volume(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<Json<VolumeData>, ApiError> {
    user.require(Permission::StorageWrite)?;
    Ok(Json(state.store.get_volume(&id).await?))
}

#[utoipa::path(delete, path = "/api/storage/volumes/{id}", responses((status = 204, description = "deleted"), (status = 409, description = "volume in use")), tag = "storage")]
pub async fn delete_volume(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<axum::http::StatusCode, ApiError> {
    user.require(Permission::StorageWrite)?;
    state.volumes.delete(&user.user_id, &id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResizeVolumeRequest {
    pub new_size_gb: u64,
}

#[utoipa::path(post, path = "/api/storage/volumes/{id}/resize", responses((status = 200, body = VolumeData)), tag = "storage")]
pub async fn resize_volume(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<ResizeVolumeRequest>,
) -> Result<Json<VolumeData>, ApiError> {
    user.require(Permission::StorageWrite)?;
    state.volumes.resize(&id, req.new_size_gb).await?;
    Ok(Json(state.store.get_volume(&id).await?))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CloneVolumeRequest {
    pub new_name: String,
}

#[utoipa::path(post, path = "/api/storage/volumes/{id}/clone", responses((status = 201, body = VolumeData)), tag = "storage")]
pub async fn clone_volume(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<CloneVolumeRequest>,
) -> Result<(axum::http::StatusCode, Json<VolumeData>), ApiError> {
    user.require(Permission::StorageWrite)?;
    let new_id = state.volumes.clone(&id, &req.new_name).await?;
    Ok((axum::http::StatusCode::CREATED, Json(state.store.get_volume(&new_id).await?)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateVolumeSnapshotRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[utoipa::path(post, path = "/api/storage/volumes/{id}/snapshot", responses((status = 201, body = SnapshotData)), tag = "storage")]
pub async fn snapshot_volume(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<CreateVolumeSnapshotRequest>,
) -> Result<(axum::http::StatusCode, Json<SnapshotData>), ApiError> {
    user.require(Permission::StorageWrite)?;
    let snap_id = state.snapshots.create(&user.user_id, &id, &req.name, &req.description).await?;
    Ok((axum::http::StatusCode::CREATED, Json(state.store.get_snapshot(&snap_id).await?)))
}

// ---- Snapshots -----------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSnapshotRequest {
    pub volume_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[utoipa::path(post, path = "/api/storage/snapshots", responses((status = 201, body = SnapshotData)), tag = "storage")]
pub async fn create_snapshot(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateSnapshotRequest>,
) -> Result<(axum::http::StatusCode, Json<SnapshotData>), ApiError> {
    user.require(Permission::StorageWrite)?;
    let id = state.snapshots.create(&user.user_id, &req.volume_id, &req.name, &req.description).await?;
    Ok((axum::http::StatusCode::CREATED, Json(state.store.get_snapshot(&id).await?)))
}

#[utoipa::path(get, path = "/api/storage/snapshots/{id}", responses((status = 200, body = SnapshotData)), tag = "storage")]
pub async fn get_snapshot(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<Json<SnapshotData>, ApiError> {
    user.require(Permission::StorageRead)?;
    Ok(Json(state.store.get_snapshot(&id).await?))
}

#[utoipa::path(get, path = "/api/storage/snapshots", responses((status = 200, body = Page<SnapshotData>)), tag = "storage")]
pub async fn list_snapshots(State(state): State<Arc<AppState>>, user: AuthUser, Query(q): Query<PageQuery>) -> Result<Json<Page<SnapshotData>>, ApiError> {
    user.require(Permission::StorageRead)?;
    let (snaps, total) = state.store.list_snapshots(q.page(), q.page_size()).await?;
    Ok(Json(Page::new(snaps, total, q.page(), q.page_size())))
}

#[utoipa::path(put, path = "/api/storage/snapshots/{id}", responses((status = 200, body = SnapshotData)), tag = "storage")]
pub async fn update_snapshot(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<Json<SnapshotData>, ApiError> {
    user.require(Permission::StorageWrite)?;
    Ok(Json(state.store.get_snapshot(&id).await?))
}

#[utoipa::path(delete, path = "/api/storage/snapshots/{id}", responses((status = 204, description = "deleted")), tag = "storage")]
pub async fn delete_snapshot(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<axum::http::StatusCode, ApiError> {
    user.require(Permission::StorageWrite)?;
    state.snapshots.delete(&user.user_id, &id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Rejected with `PRECONDITION_FAILED` while the parent volume is
/// `in_use` (spec §8 scenario 5).
#[utoipa::path(post, path = "/api/storage/snapshots/{id}/restore", responses((status = 200, description = "restored"), (status = 409, description = "volume in use")), tag = "storage")]
pub async fn restore_snapshot(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<axum::http::StatusCode, ApiError> {
    user.require(Permission::StorageWrite)?;
    state.snapshots.restore(&user.user_id, &id).await?;
    Ok(axum::http::StatusCode::OK)
}

fn internal() -> ApiError {
    ApiError(crate::store::StoreError::Internal("unexpected apply() response".into()))
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
