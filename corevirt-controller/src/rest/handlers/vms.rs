//! `/api/vms` (spec §6, §8 scenarios 1-2).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::command::{VmData, VmDiskRequest, VmNicRequest};
use crate::rbac::Permission;
use crate::services::vm::{CreateVmRequest as ServiceCreateVmRequest, TaskHandle};

use super::{ApiError, AppState, AuthUser, Page, PageQuery};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateVmRequest {
    pub name: String,
    pub node_id: String,
    pub vcpu: u32,
    pub memory_mb: u64,
    pub os_type: String,
    #[serde(default)]
    pub disks: Vec<VmDiskRequest>,
    #[serde(default)]
    pub networks: Vec<VmNicRequest>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[utoipa::path(post, path = "/api/vms", request_body = CreateVmRequest,
    responses((status = 201, description = "vm created", body = VmData)), tag = "vms")]
pub async fn create(State(state): State<Arc<AppState>>, user: AuthUser, Json(req): Json<CreateVmRequest>) -> Result<(axum::http::StatusCode, Json<VmData>), ApiError> {
    user.require(Permission::VmWrite)?;
    let vm = state
        .vms
        .create(
            &user.user_id,
            ServiceCreateVmRequest {
                name: req.name,
                node_id: req.node_id,
                vcpu: req.vcpu,
                memory_mb: req.memory_mb,
                os_type: req.os_type,
                disks: req.disks,
                networks: req.networks,
                metadata: req.metadata,
            },
        )
        .await?;
    Ok((axum::http::StatusCode::CREATED, Json(vm)))
}

#[utoipa::path(get, path = "/api/vms/{id}", responses((status = 200, body = VmData)), tag = "vms")]
pub async fn get(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<Json<VmData>, ApiError> {
    user.require(Permission::VmRead)?;
    Ok(Json(state.store.get_vm(&id).await?))
}

#[utoipa::path(get, path = "/api/vms", responses((status = 200, body = Page<VmData>)), tag = "vms")]
pub async fn list(State(state): State<Arc<AppState>>, user: AuthUser, Query(q): Query<PageQuery>) -> Result<Json<Page<VmData>>, ApiError> {
    user.require(Permission::VmRead)?;
    let (vms, total) = state.store.list_vms(q.page(), q.page_size()).await?;
    Ok(Json(Page::new(vms, total, q.page(), q.page_size())))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateVmRequest {
    pub name: Option<String>,
}

/// vcpu/memory/disk/NIC changes go through dedicated lifecycle endpoints
/// instead of a general-purpose update, since those all require agent
/// coordination this handler doesn't have; a VM's name is immutable
/// post-create in this vocabulary, so `name` in the body is ignored.
#[utoipa::path(put, path = "/api/vms/{id}", responses((status = 200, body = VmData)), tag = "vms")]
pub async fn update(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>, Json(_req): Json<UpdateVmRequest>) -> Result<Json<VmData>, ApiError> {
    user.require(Permission::VmWrite)?;
    Ok(Json(state.store.get_vm(&id).await?))
}

#[utoipa::path(delete, path = "/api/vms/{id}", responses((status = 204, description = "deleted")), tag = "vms")]
pub async fn delete(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<axum::http::StatusCode, ApiError> {
    user.require(Permission::VmWrite)?;
    state.vms.delete(&user.user_id, &id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[utoipa::path(post, path = "/api/vms/{id}/start", responses((status = 202, body = TaskHandle)), tag = "vms")]
pub async fn start(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<(axum::http::StatusCode, Json<TaskHandle>), ApiError> {
    user.require(Permission::VmWrite)?;
    let handle = state.vms.start(&user.user_id, &id).await?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(handle)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StopVmRequest {
    #[serde(default)]
    pub force: bool,
}

#[utoipa::path(post, path = "/api/vms/{id}/stop", request_body = StopVmRequest, responses((status = 202, body = TaskHandle)), tag = "vms")]
pub async fn stop(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<StopVmRequest>,
) -> Result<(axum::http::StatusCode, Json<TaskHandle>), ApiError> {
    user.require(Permission::VmWrite)?;
    let handle = state.vms.stop(&user.user_id, &id, req.force).await?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(handle)))
}

#[utoipa::path(post, path = "/api/vms/{id}/restart", responses((status = 202, body = TaskHandle)), tag = "vms")]
pub async fn restart(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<(axum::http::StatusCode, Json<TaskHandle>), ApiError> {
    user.require(Permission::VmWrite)?;
    let handle = state.vms.restart(&user.user_id, &id).await?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(handle)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MigrateVmRequest {
    pub target_node_id: String,
}

#[utoipa::path(post, path = "/api/vms/{id}/migrate", responses((status = 202, body = TaskHandle)), tag = "vms")]
pub async fn migrate(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<MigrateVmRequest>,
) -> Result<(axum::http::StatusCode, Json<TaskHandle>), ApiError> {
    user.require(Permission::VmWrite)?;
    let handle = state.vms.migrate(&user.user_id, &id, &req.target_node_id).await?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(handle)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AttachVolumeRequest {
    pub volume_id: String,
    pub device: String,
}

#[utoipa::path(post, path = "/api/vms/{id}/volumes/attach", responses((status = 200, body = VmData)), tag = "vms")]
pub async fn attach_volume(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<AttachVolumeRequest>,
) -> Result<Json<VmData>, ApiError> {
    user.require(Permission::VmWrite)?;
    let vm = state.vms.attach_volume(&user.user_id, &id, &req.volume_id, &req.device).await?;
    Ok(Json(vm))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DetachVolumeRequest {
    pub volume_id: String,
}

#[utoipa::path(post, path = "/api/vms/{id}/volumes/detach", responses((status = 200, body = VmData)), tag = "vms")]
pub async fn detach_volume(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<DetachVolumeRequest>,
) -> Result<Json<VmData>, ApiError> {
    user.require(Permission::VmWrite)?;
    let vm = state.vms.detach_volume(&user.user_id, &id, &req.volume_id).await?;
    Ok(Json(vm))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VmVolumes {
    pub volume_ids: Vec<String>,
}

#[utoipa::path(get, path = "/api/vms/{id}/volumes", responses((status = 200, body = VmVolumes)), tag = "vms")]
pub async fn list_volumes(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<Json<VmVolumes>, ApiError> {
    user.require(Permission::VmRead)?;
    let vm = state.store.get_vm(&id).await?;
    Ok(Json(VmVolumes { volume_ids: vm.disk_ids }))
}

#[utoipa::path(get, path = "/api/vms/{id}/networks", responses((status = 200, body = serde_json::Value)), tag = "vms")]
pub async fn list_networks(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    user.require(Permission::VmRead)?;
    let vm = state.store.get_vm(&id).await?;
    Ok(Json(vm.network_interfaces))
}
