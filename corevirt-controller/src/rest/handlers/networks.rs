//! `/api/networks` (spec §6, §8 scenario 4: concurrent IP allocation).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::command::{IpAllocationData, NetworkData, NetworkType};
use crate::rbac::Permission;
use crate::services::network::CreateNetworkRequest as ServiceCreateNetworkRequest;

use super::{ApiError, AppState, AuthUser, Page, PageQuery};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateNetworkRequest {
    pub name: String,
    pub network_type: NetworkType,
    pub cidr: String,
    pub gateway: Option<String>,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    pub vlan_id: Option<u16>,
    pub node_id: String,
}

fn default_mtu() -> u32 {
    1500
}

#[utoipa::path(post, path = "/api/networks", responses((status = 201, body = NetworkData)), tag = "networks")]
pub async fn create(State(state): State<Arc<AppState>>, user: AuthUser, Json(req): Json<CreateNetworkRequest>) -> Result<(axum::http::StatusCode, Json<NetworkData>), ApiError> {
    user.require(Permission::NetworkWrite)?;
    let id = state
        .networks
        .create(
            &user.user_id,
            ServiceCreateNetworkRequest {
                name: req.name,
                network_type: req.network_type,
                cidr: req.cidr,
                gateway: req.gateway,
                mtu: req.mtu,
                vlan_id: req.vlan_id,
                node_id: req.node_id,
            },
        )
        .await?;
    Ok((axum::http::StatusCode::CREATED, Json(state.store.get_network(&id).await?)))
}

#[utoipa::path(get, path = "/api/networks/{id}", responses((status = 200, body = NetworkData)), tag = "networks")]
pub async fn get(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<Json<NetworkData>, ApiError> {
    user.require(Permission::NetworkRead)?;
    Ok(Json(state.store.get_network(&id).await?))
}

#[utoipa::path(get, path = "/api/networks", responses((status = 200, body = Page<NetworkData>)), tag = "networks")]
pub async fn list(State(state): State<Arc<AppState>>, user: AuthUser, Query(q): Query<PageQuery>) -> Result<Json<Page<NetworkData>>, ApiError> {
    user.require(Permission::NetworkRead)?;
    let (nets, total) = state.store.list_networks(q.page(), q.page_size()).await?;
    Ok(Json(Page::new(nets, total, q.page(), q.page_size())))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateNetworkRequest {
    pub name: String,
}

#[utoipa::path(put, path = "/api/networks/{id}", responses((status = 200, body = NetworkData)), tag = "networks")]
pub async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateNetworkRequest>,
) -> Result<Json<NetworkData>, ApiError> {
    user.require(Permission::NetworkWrite)?;
    state.networks.rename(&id, &req.name).await?;
    Ok(Json(state.store.get_network(&id).await?))
}

/// Rejected while any allocation on the network is still held (spec
/// §4.3: a network can't be torn down out from under a running VM).
#[utoipa::path(delete, path = "/api/networks/{id}", responses((status = 204, description = "deleted"), (status = 409, description = "network has active allocations")), tag = "networks")]
pub async fn delete(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<axum::http::StatusCode, ApiError> {
    user.require(Permission::NetworkWrite)?;
    state.networks.delete(&user.user_id, &id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[utoipa::path(get, path = "/api/networks/{id}/ips", responses((status = 200, body = Page<IpAllocationData>)), tag = "networks")]
pub async fn list_ips(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Page<IpAllocationData>>, ApiError> {
    user.require(Permission::NetworkRead)?;
    let (ips, total) = state.store.list_ip_allocations(&id, q.page(), q.page_size()).await?;
    Ok(Json(Page::new(ips, total, q.page(), q.page_size())))
}

/// Concurrent callers against the same network race on the IPAM's
/// per-network lock; exactly one gets the free address, everyone else
/// gets `IP_EXHAUSTED` (spec §8 scenario 4).
#[utoipa::path(post, path = "/api/networks/{id}/allocate-ip", responses((status = 200, body = IpAllocationData), (status = 409, description = "IP_EXHAUSTED")), tag = "networks")]
pub async fn allocate_ip(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<Json<IpAllocationData>, ApiError> {
    user.require(Permission::NetworkWrite)?;
    Ok(Json(state.ipam.allocate(&id).await?))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReleaseIpRequest {
    pub vm_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReleaseIpResponse {
    pub released: u32,
}

#[utoipa::path(post, path = "/api/networks/{id}/release-ip", responses((status = 200, body = ReleaseIpResponse)), tag = "networks")]
pub async fn release_ip(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<ReleaseIpRequest>,
) -> Result<Json<ReleaseIpResponse>, ApiError> {
    user.require(Permission::NetworkWrite)?;
    let count = state.ipam.release(&id, &req.vm_id).await?;
    Ok(Json(ReleaseIpResponse { released: count }))
}
