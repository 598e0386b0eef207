//! `/api/nodes` (spec §6): registration, status, heartbeat, deregistration.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use utoipa::ToSchema;

use crate::command::{Command, NodeData, NodeStatus};
use crate::rbac::Permission;

use super::{ApiError, AppState, AuthUser, Page, PageQuery};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterNodeRequest {
    pub hostname: String,
    pub ip_address: String,
    pub hypervisor_type: String,
    pub hypervisor_version: String,
    pub cpu_cores: u32,
    pub cpu_threads: u32,
    pub memory_total_bytes: u64,
    pub disk_total_bytes: u64,
}

#[utoipa::path(post, path = "/api/nodes", request_body = RegisterNodeRequest,
    responses((status = 201, description = "node registered", body = NodeData)), tag = "nodes")]
pub async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<RegisterNodeRequest>,
) -> Result<(axum::http::StatusCode, Json<NodeData>), ApiError> {
    user.require(Permission::NodeWrite)?;
    let id = Uuid::new_v4().to_string();
    let (resp, _) = state
        .store
        .apply(Command::RegisterNode {
            request_id: Uuid::new_v4().to_string(),
            id,
            timestamp: now(),
            hostname: req.hostname,
            ip_address: req.ip_address,
            hypervisor_type: req.hypervisor_type,
            hypervisor_version: req.hypervisor_version,
            cpu_cores: req.cpu_cores,
            cpu_threads: req.cpu_threads,
            memory_total_bytes: req.memory_total_bytes,
            disk_total_bytes: req.disk_total_bytes,
        })
        .await?;
    match resp {
        crate::command::Response::Node(n) => {
            state.audit.node_registered(&n.id);
            Ok((axum::http::StatusCode::CREATED, Json(n)))
        }
        _ => Err(internal()),
    }
}

#[utoipa::path(get, path = "/api/nodes/{id}", responses((status = 200, body = NodeData)), tag = "nodes")]
pub async fn get(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<Json<NodeData>, ApiError> {
    user.require(Permission::NodeRead)?;
    Ok(Json(state.store.get_node(&id).await?))
}

#[utoipa::path(get, path = "/api/nodes", responses((status = 200, body = Page<NodeData>)), tag = "nodes")]
pub async fn list(State(state): State<Arc<AppState>>, user: AuthUser, Query(q): Query<PageQuery>) -> Result<Json<Page<NodeData>>, ApiError> {
    user.require(Permission::NodeRead)?;
    let (nodes, total) = state.store.list_nodes(q.page(), q.page_size()).await?;
    Ok(Json(Page::new(nodes, total, q.page(), q.page_size())))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateNodeRequest {
    pub maintenance: bool,
}

#[utoipa::path(put, path = "/api/nodes/{id}", responses((status = 200, body = NodeData)), tag = "nodes")]
pub async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateNodeRequest>,
) -> Result<Json<NodeData>, ApiError> {
    user.require(Permission::NodeWrite)?;
    let node = state.nodes.set_maintenance(&user.user_id, &id, req.maintenance).await?;
    Ok(Json(node))
}

#[utoipa::path(delete, path = "/api/nodes/{id}", responses((status = 204, description = "deregistered")), tag = "nodes")]
pub async fn delete(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<axum::http::StatusCode, ApiError> {
    user.require(Permission::NodeWrite)?;
    state.nodes.deregister(&user.user_id, &id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[utoipa::path(post, path = "/api/nodes/{id}/heartbeat", responses((status = 200, body = NodeData)), tag = "nodes")]
pub async fn heartbeat(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<Json<NodeData>, ApiError> {
    user.require(Permission::NodeWrite)?;
    let (resp, _) = state
        .store
        .apply(Command::Heartbeat { request_id: Uuid::new_v4().to_string(), node_id: id, timestamp: now() })
        .await?;
    match resp {
        crate::command::Response::Node(n) => Ok(Json(n)),
        _ => Err(internal()),
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NodeStats {
    pub total: u64,
    pub online: u64,
    pub offline: u64,
    pub maintenance: u64,
}

#[utoipa::path(get, path = "/api/nodes/stats", responses((status = 200, body = NodeStats)), tag = "nodes")]
pub async fn stats(State(state): State<Arc<AppState>>, user: AuthUser) -> Result<Json<NodeStats>, ApiError> {
    user.require(Permission::NodeRead)?;
    let (nodes, total) = state.store.list_nodes(1, 10_000).await?;
    let online = nodes.iter().filter(|n| n.status == NodeStatus::Online).count() as u64;
    let offline = nodes.iter().filter(|n| n.status == NodeStatus::Offline).count() as u64;
    let maintenance = nodes.iter().filter(|n| n.status == NodeStatus::Maintenance).count() as u64;
    Ok(Json(NodeStats { total, online, offline, maintenance }))
}

fn internal() -> ApiError {
    ApiError(crate::store::StoreError::Internal("unexpected apply() response".into()))
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
