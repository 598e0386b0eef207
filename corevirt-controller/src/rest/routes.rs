use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::app_state::AppState;
use crate::rpc::ws_handler::agent_ws_handler;

use super::handlers::{auth, networks, nodes, storage, tasks, vms, ws};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "corevirt controller API",
        version = "0.1.0",
        description = "Control-plane REST API for nodes, VMs, storage, and networks.",
        license(name = "MIT")
    ),
    tags(
        (name = "auth", description = "Authentication"),
        (name = "nodes", description = "Hypervisor node registration and status"),
        (name = "vms", description = "VM lifecycle"),
        (name = "storage", description = "Storage pools, volumes, snapshots"),
        (name = "networks", description = "Network and IPAM operations"),
        (name = "tasks", description = "Async task tracking")
    ),
    paths(
        auth::login,
        nodes::create,
        nodes::get,
        nodes::list,
        nodes::update,
        nodes::delete,
        nodes::heartbeat,
        nodes::stats,
        vms::create,
        vms::get,
        vms::list,
        vms::update,
        vms::delete,
        vms::start,
        vms::stop,
        vms::restart,
        vms::migrate,
        vms::attach_volume,
        vms::detach_volume,
        vms::list_volumes,
        vms::list_networks,
        storage::create_pool,
        storage::get_pool,
        storage::list_pools,
        storage::update_pool,
        storage::delete_pool,
        storage::create_volume,
        storage::get_volume,
        storage::list_volumes,
        storage::update_volume,
        storage::delete_volume,
        storage::resize_volume,
        storage::clone_volume,
        storage::snapshot_volume,
        storage::create_snapshot,
        storage::get_snapshot,
        storage::list_snapshots,
        storage::update_snapshot,
        storage::delete_snapshot,
        storage::restore_snapshot,
        networks::create,
        networks::get,
        networks::list,
        networks::update,
        networks::delete,
        networks::list_ips,
        networks::allocate_ip,
        networks::release_ip,
        tasks::get,
        tasks::list,
    ),
    components(schemas(
        auth::LoginRequest,
        auth::LoginResponse,
        auth::AuthToken,
        nodes::RegisterNodeRequest,
        nodes::UpdateNodeRequest,
        nodes::NodeStats,
        vms::CreateVmRequest,
        vms::UpdateVmRequest,
        vms::StopVmRequest,
        vms::MigrateVmRequest,
        vms::AttachVolumeRequest,
        vms::DetachVolumeRequest,
        vms::VmVolumes,
        storage::CreatePoolRequest,
        storage::CreateVolumeRequest,
        storage::ResizeVolumeRequest,
        storage::CloneVolumeRequest,
        storage::CreateVolumeSnapshotRequest,
        storage::CreateSnapshotRequest,
        networks::CreateNetworkRequest,
        networks::UpdateNetworkRequest,
        networks::ReleaseIpRequest,
        networks::ReleaseIpResponse,
        crate::command::NodeData,
        crate::command::VmData,
        crate::command::VolumeData,
        crate::command::SnapshotData,
        crate::command::PoolData,
        crate::command::NetworkData,
        crate::command::IpAllocationData,
        crate::command::TaskData,
        crate::error::ApiErrorBody,
        crate::services::vm::TaskHandle,
    ))
)]
pub struct ApiDoc;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/auth/login", post(auth::login))
        // Nodes
        .route("/nodes", get(nodes::list).post(nodes::create))
        .route("/nodes/stats", get(nodes::stats))
        .route("/nodes/{id}", get(nodes::get).put(nodes::update).delete(nodes::delete))
        .route("/nodes/{id}/heartbeat", post(nodes::heartbeat))
        // VMs
        .route("/vms", get(vms::list).post(vms::create))
        .route("/vms/{id}", get(vms::get).put(vms::update).delete(vms::delete))
        .route("/vms/{id}/start", post(vms::start))
        .route("/vms/{id}/stop", post(vms::stop))
        .route("/vms/{id}/restart", post(vms::restart))
        .route("/vms/{id}/migrate", post(vms::migrate))
        .route("/vms/{id}/volumes/attach", post(vms::attach_volume))
        .route("/vms/{id}/volumes/detach", post(vms::detach_volume))
        .route("/vms/{id}/volumes", get(vms::list_volumes))
        .route("/vms/{id}/networks", get(vms::list_networks))
        // Storage: pools
        .route("/storage/pools", get(storage::list_pools).post(storage::create_pool))
        .route("/storage/pools/{id}", get(storage::get_pool).put(storage::update_pool).delete(storage::delete_pool))
        // Storage: volumes
        .route("/storage/volumes", get(storage::list_volumes).post(storage::create_volume))
        .route("/storage/volumes/{id}", get(storage::get_volume).put(storage::update_volume).delete(storage::delete_volume))
        .route("/storage/volumes/{id}/resize", post(storage::resize_volume))
        .route("/storage/volumes/{id}/clone", post(storage::clone_volume))
        .route("/storage/volumes/{id}/snapshot", post(storage::snapshot_volume))
        // Storage: snapshots
        .route("/storage/snapshots", get(storage::list_snapshots).post(storage::create_snapshot))
        .route("/storage/snapshots/{id}", get(storage::get_snapshot).put(storage::update_snapshot).delete(storage::delete_snapshot))
        .route("/storage/snapshots/{id}/restore", post(storage::restore_snapshot))
        // Networks
        .route("/networks", get(networks::list).post(networks::create))
        .route("/networks/{id}", get(networks::get).put(networks::update).delete(networks::delete))
        .route("/networks/{id}/ips", get(networks::list_ips))
        .route("/networks/{id}/allocate-ip", post(networks::allocate_ip))
        .route("/networks/{id}/release-ip", post(networks::release_ip))
        // Tasks
        .route("/tasks", get(tasks::list))
        .route("/tasks/{id}", get(tasks::get));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .route("/ws/agent", get(agent_ws_handler))
        .route("/ws/frontend", get(ws::frontend_ws_handler))
        .with_state(state)
}
