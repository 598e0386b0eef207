//! The store boundary: one trait the REST handlers and services program
//! against, so the sqlite-backed implementation can be swapped for an
//! in-memory one in tests without touching a single handler.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::command::{
    Command, IpAllocationData, NetworkData, NodeData, PoolData, Response, SnapshotData, TaskData, UserData, VmData, VolumeData,
};

use super::error::Result;
use super::event::Event;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Apply one command inside a single transaction and return the
    /// resulting projection plus any events to publish. Idempotent per
    /// `Command::request_id()`: replaying the same request id returns
    /// the cached response without re-executing (spec §8, "Idempotency").
    async fn apply(&self, cmd: Command) -> Result<(Response, Vec<Event>)>;

    fn subscribe(&self) -> broadcast::Receiver<Event>;

    async fn get_node(&self, id: &str) -> Result<NodeData>;
    async fn list_nodes(&self, page: u32, page_size: u32) -> Result<(Vec<NodeData>, u64)>;

    async fn get_network(&self, id: &str) -> Result<NetworkData>;
    async fn list_networks(&self, page: u32, page_size: u32) -> Result<(Vec<NetworkData>, u64)>;
    async fn list_ip_allocations(&self, network_id: &str, page: u32, page_size: u32) -> Result<(Vec<IpAllocationData>, u64)>;

    async fn get_vm(&self, id: &str) -> Result<VmData>;
    async fn list_vms(&self, page: u32, page_size: u32) -> Result<(Vec<VmData>, u64)>;

    async fn get_volume(&self, id: &str) -> Result<VolumeData>;
    async fn list_volumes(&self, page: u32, page_size: u32) -> Result<(Vec<VolumeData>, u64)>;

    async fn get_snapshot(&self, id: &str) -> Result<SnapshotData>;
    async fn list_snapshots(&self, page: u32, page_size: u32) -> Result<(Vec<SnapshotData>, u64)>;

    async fn get_pool(&self, id: &str) -> Result<PoolData>;
    async fn list_pools(&self, page: u32, page_size: u32) -> Result<(Vec<PoolData>, u64)>;

    async fn get_task(&self, id: &str) -> Result<TaskData>;
    async fn list_tasks(&self, page: u32, page_size: u32) -> Result<(Vec<TaskData>, u64)>;

    async fn get_user_by_username(&self, username: &str) -> Result<UserData>;

    /// Rows not yet in a terminal state, for the reconciliation sweep.
    async fn list_pending_vms(&self) -> Result<Vec<VmData>>;
    async fn list_pending_volumes(&self) -> Result<Vec<VolumeData>>;
    async fn list_stale_tasks(&self) -> Result<Vec<TaskData>>;
}
