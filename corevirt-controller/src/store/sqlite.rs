//! SQLite-backed [`MetadataStore`] (spec §1 calls C1 "a durable
//! relational store"; §9 Non-goals excludes multi-region replication,
//! so a single embedded database is sufficient — no consensus layer).
//!
//! `rusqlite::Connection` is `!Sync`; every command and query takes the
//! connection mutex for the span of one transaction and releases it
//! before returning, per the §5 rule that non-DB locks may never span
//! a suspension point (this one *is* the DB lock, held only across
//! synchronous SQL calls, never across an `.await`).

use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use corevirt_proto::PoolConfig;

use crate::command::{
    Command, IpAllocationData, IpStatus, NetworkData, NetworkStatus, NetworkType, NodeData,
    NodeStatus, PoolData, PoolStatus, PoolType, Response, SnapshotData, SnapshotStatus, TaskData,
    TaskStatus, VmData, VmStatus, VolumeData, VolumeStatus, VolumeType,
};

use super::error::{Result, StoreError};
use super::event::Event;
use super::traits::MetadataStore;

const IDEMPOTENCY_CACHE_SIZE: usize = 4096;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    idempotency: Mutex<LruCache<String, Response>>,
    events: broadcast::Sender<Event>,
}

impl SqliteStore {
    pub fn open(path: &std::path::Path) -> Result<Arc<Self>> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Arc<Self>> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Arc<Self>> {
        conn.execute_batch(SCHEMA)?;
        let (tx, _rx) = broadcast::channel(1024);
        Ok(Arc::new(Self {
            conn: Mutex::new(conn),
            idempotency: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(IDEMPOTENCY_CACHE_SIZE).unwrap(),
            )),
            events: tx,
        }))
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn apply(&self, cmd: Command) -> Result<(Response, Vec<Event>)> {
        let request_id = cmd.request_id().to_string();
        {
            let mut cache = self.idempotency.lock().await;
            if let Some(cached) = cache.get(&request_id) {
                debug!(request_id, "idempotent replay, returning cached response");
                return Ok((cached.clone(), Vec::new()));
            }
        }

        let mut conn = self.conn.lock().await;
        let (response, events) = apply_inner(&mut conn, cmd)?;

        let mut cache = self.idempotency.lock().await;
        cache.put(request_id, response.clone());
        drop(cache);
        drop(conn);

        for ev in &events {
            let _ = self.events.send(ev.clone());
        }
        Ok((response, events))
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    async fn get_node(&self, id: &str) -> Result<NodeData> {
        let conn = self.conn.lock().await;
        row_node(&conn, id)
    }

    async fn list_nodes(&self, page: u32, page_size: u32) -> Result<(Vec<NodeData>, u64)> {
        let conn = self.conn.lock().await;
        paginate(&conn, "nodes", page, page_size, row_to_node)
    }

    async fn get_network(&self, id: &str) -> Result<NetworkData> {
        let conn = self.conn.lock().await;
        row_network(&conn, id)
    }

    async fn list_networks(&self, page: u32, page_size: u32) -> Result<(Vec<NetworkData>, u64)> {
        let conn = self.conn.lock().await;
        paginate(&conn, "networks", page, page_size, row_to_network)
    }

    async fn list_ip_allocations(&self, network_id: &str, page: u32, page_size: u32) -> Result<(Vec<IpAllocationData>, u64)> {
        let conn = self.conn.lock().await;
        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM ip_allocations WHERE network_id = ?1",
            params![network_id],
            |r| r.get(0),
        )?;
        let offset = (page.saturating_sub(1) as i64) * page_size as i64;
        let mut stmt = conn.prepare(
            "SELECT * FROM ip_allocations WHERE network_id = ?1 ORDER BY ip_address LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![network_id, page_size, offset], row_to_ip)?;
        let items = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((items, total))
    }

    async fn get_vm(&self, id: &str) -> Result<VmData> {
        let conn = self.conn.lock().await;
        row_vm(&conn, id)
    }

    async fn list_vms(&self, page: u32, page_size: u32) -> Result<(Vec<VmData>, u64)> {
        let conn = self.conn.lock().await;
        paginate(&conn, "vms", page, page_size, row_to_vm)
    }

    async fn get_volume(&self, id: &str) -> Result<VolumeData> {
        let conn = self.conn.lock().await;
        row_volume(&conn, id)
    }

    async fn list_volumes(&self, page: u32, page_size: u32) -> Result<(Vec<VolumeData>, u64)> {
        let conn = self.conn.lock().await;
        paginate(&conn, "volumes", page, page_size, row_to_volume)
    }

    async fn get_snapshot(&self, id: &str) -> Result<SnapshotData> {
        let conn = self.conn.lock().await;
        row_snapshot(&conn, id)
    }

    async fn list_snapshots(&self, page: u32, page_size: u32) -> Result<(Vec<SnapshotData>, u64)> {
        let conn = self.conn.lock().await;
        paginate(&conn, "snapshots", page, page_size, row_to_snapshot)
    }

    async fn get_pool(&self, id: &str) -> Result<PoolData> {
        let conn = self.conn.lock().await;
        row_pool(&conn, id)
    }

    async fn list_pools(&self, page: u32, page_size: u32) -> Result<(Vec<PoolData>, u64)> {
        let conn = self.conn.lock().await;
        paginate(&conn, "pools", page, page_size, row_to_pool)
    }

    async fn get_task(&self, id: &str) -> Result<TaskData> {
        let conn = self.conn.lock().await;
        row_task(&conn, id)
    }

    async fn list_tasks(&self, page: u32, page_size: u32) -> Result<(Vec<TaskData>, u64)> {
        let conn = self.conn.lock().await;
        paginate(&conn, "tasks", page, page_size, row_to_task)
    }

    async fn list_pending_vms(&self) -> Result<Vec<VmData>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM vms WHERE status IN ('starting','stopping','restarting','migrating')",
        )?;
        let rows = stmt.query_map([], row_to_vm)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    async fn list_pending_volumes(&self) -> Result<Vec<VolumeData>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT * FROM volumes WHERE status IN ('creating','deleting')")?;
        let rows = stmt.query_map([], row_to_volume)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    async fn list_stale_tasks(&self) -> Result<Vec<TaskData>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT * FROM tasks WHERE status IN ('pending','running')")?;
        let rows = stmt.query_map([], row_to_task)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<crate::command::UserData> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE username = ?1",
            params![username],
            |row| {
                Ok(crate::command::UserData {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    role: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("user {username}")))
    }
}

fn paginate<T>(
    conn: &Connection,
    table: &str,
    page: u32,
    page_size: u32,
    mapper: fn(&rusqlite::Row) -> rusqlite::Result<T>,
) -> Result<(Vec<T>, u64)> {
    let total: u64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
    let offset = (page.saturating_sub(1) as i64) * page_size as i64;
    let mut stmt = conn.prepare(&format!("SELECT * FROM {table} ORDER BY created_at LIMIT ?1 OFFSET ?2"))?;
    let rows = stmt.query_map(params![page_size, offset], mapper)?;
    Ok((rows.collect::<rusqlite::Result<Vec<_>>>()?, total))
}

// =============================================================================
// apply()
// =============================================================================

fn apply_inner(conn: &mut Connection, cmd: Command) -> Result<(Response, Vec<Event>)> {
    let tx = conn.transaction()?;
    let result = match cmd {
        Command::RegisterNode {
            id,
            timestamp,
            hostname,
            ip_address,
            hypervisor_type,
            hypervisor_version,
            cpu_cores,
            cpu_threads,
            memory_total_bytes,
            disk_total_bytes,
            ..
        } => {
            let existing: Option<String> = tx
                .query_row("SELECT id FROM nodes WHERE hostname = ?1", params![hostname], |r| r.get(0))
                .optional()?;
            let id = existing.unwrap_or(id);
            tx.execute(
                "INSERT INTO nodes (id, hostname, ip_address, status, hypervisor_type, hypervisor_version,
                    cpu_cores, cpu_threads, memory_total_bytes, disk_total_bytes, metadata, last_heartbeat, created_at, updated_at)
                 VALUES (?1,?2,?3,'online',?4,?5,?6,?7,?8,?9,'{}',?10,?10,?10)
                 ON CONFLICT(id) DO UPDATE SET ip_address=excluded.ip_address, status='online',
                    hypervisor_type=excluded.hypervisor_type, hypervisor_version=excluded.hypervisor_version,
                    cpu_cores=excluded.cpu_cores, cpu_threads=excluded.cpu_threads,
                    memory_total_bytes=excluded.memory_total_bytes, disk_total_bytes=excluded.disk_total_bytes,
                    last_heartbeat=excluded.last_heartbeat, updated_at=excluded.updated_at",
                params![id, hostname, ip_address, hypervisor_type, hypervisor_version, cpu_cores, cpu_threads, memory_total_bytes, disk_total_bytes, timestamp],
            )?;
            let node = row_node(&tx, &id)?;
            (Response::Node(node.clone()), vec![Event::NodeRegistered(node)])
        }

        Command::Heartbeat { node_id, timestamp, .. } => {
            tx.execute(
                "UPDATE nodes SET last_heartbeat = ?1, status = CASE WHEN status = 'offline' THEN 'online' ELSE status END, updated_at = ?1 WHERE id = ?2",
                params![timestamp, node_id],
            )?;
            let node = row_node(&tx, &node_id)?;
            (Response::Node(node.clone()), vec![Event::NodeStatusChanged { id: node_id, status: node.status }])
        }

        Command::SetNodeStatus { node_id, timestamp, status, .. } => {
            tx.execute(
                "UPDATE nodes SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status_str(status), timestamp, node_id],
            )?;
            (Response::Node(row_node(&tx, &node_id)?), vec![Event::NodeStatusChanged { id: node_id, status }])
        }

        Command::DeregisterNode { node_id, .. } => {
            let in_use: i64 = tx.query_row(
                "SELECT COUNT(*) FROM vms WHERE node_id = ?1",
                params![node_id],
                |r| r.get(0),
            )?;
            if in_use > 0 {
                return Err(StoreError::PreconditionFailed(format!(
                    "node {node_id} still has {in_use} assigned vm(s)"
                )));
            }
            tx.execute("DELETE FROM nodes WHERE id = ?1", params![node_id])?;
            (Response::Deleted { id: node_id.clone() }, vec![Event::NodeDeregistered { id: node_id }])
        }

        Command::CreateNetwork { id, timestamp, name, network_type, cidr, gateway, mtu, vlan_id, node_id, .. } => {
            let network: ipnetwork::IpNetwork = cidr
                .parse()
                .map_err(|e| StoreError::Validation(format!("invalid cidr {cidr}: {e}")))?;
            if let Some(gw) = &gateway {
                let gw_addr: std::net::IpAddr = gw
                    .parse()
                    .map_err(|e| StoreError::Validation(format!("invalid gateway {gw}: {e}")))?;
                if !network.contains(gw_addr) {
                    return Err(StoreError::Validation(format!("gateway {gw} not within {cidr}")));
                }
            }
            tx.execute(
                "INSERT INTO networks (id, name, network_type, cidr, gateway, mtu, vlan_id, node_id, status)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,'active')",
                params![id, name, type_str(network_type), cidr, gateway, mtu, vlan_id, node_id],
            )?;
            materialize_ip_pool(&tx, &id, &network, gateway.as_deref())?;
            let _ = timestamp;
            (Response::Network(row_network(&tx, &id)?), vec![Event::NetworkCreated { id }])
        }

        Command::RenameNetwork { id, name, .. } => {
            tx.execute("UPDATE networks SET name = ?1 WHERE id = ?2", params![name, id])?;
            (Response::Network(row_network(&tx, &id)?), vec![])
        }

        Command::DeleteNetwork { id, .. } => {
            let non_available: i64 = tx.query_row(
                "SELECT COUNT(*) FROM ip_allocations WHERE network_id = ?1 AND status != 'available'",
                params![id],
                |r| r.get(0),
            )?;
            if non_available > 0 {
                return Err(StoreError::PreconditionFailed(format!(
                    "network {id} has {non_available} non-available ip allocation(s)"
                )));
            }
            tx.execute("DELETE FROM ip_allocations WHERE network_id = ?1", params![id])?;
            tx.execute("DELETE FROM networks WHERE id = ?1", params![id])?;
            (Response::Deleted { id: id.clone() }, vec![Event::NetworkDeleted { id }])
        }

        Command::AllocateIp { network_id, timestamp, .. } => {
            let alloc_id: Option<String> = tx
                .query_row(
                    "SELECT id FROM ip_allocations WHERE network_id = ?1 AND status = 'available' ORDER BY ip_address LIMIT 1",
                    params![network_id],
                    |r| r.get(0),
                )
                .optional()?;
            let alloc_id = alloc_id.ok_or_else(|| StoreError::IpExhausted(network_id.clone()))?;
            tx.execute(
                "UPDATE ip_allocations SET status = 'allocated', allocated_at = ?1 WHERE id = ?2",
                params![timestamp, alloc_id],
            )?;
            (Response::IpAllocation(row_ip(&tx, &alloc_id)?), vec![])
        }

        Command::AssociateIp { alloc_id, vm_id, .. } => {
            tx.execute(
                "UPDATE ip_allocations SET vm_id = ?1 WHERE id = ?2",
                params![vm_id, alloc_id],
            )?;
            (Response::IpAllocation(row_ip(&tx, &alloc_id)?), vec![])
        }

        Command::ReleaseIps { network_id, vm_id, .. } => {
            let count = tx.execute(
                "UPDATE ip_allocations SET status = 'available', vm_id = NULL, allocated_at = NULL
                 WHERE network_id = ?1 AND vm_id = ?2",
                params![network_id, vm_id],
            )?;
            (Response::ReleasedCount { count: count as u32 }, vec![])
        }

        Command::ReserveIp { network_id, ip_address, .. } => {
            tx.execute(
                "UPDATE ip_allocations SET status = 'reserved' WHERE network_id = ?1 AND ip_address = ?2 AND status = 'available'",
                params![network_id, ip_address],
            )?;
            let alloc_id: String = tx.query_row(
                "SELECT id FROM ip_allocations WHERE network_id = ?1 AND ip_address = ?2",
                params![network_id, ip_address],
                |r| r.get(0),
            )?;
            (Response::IpAllocation(row_ip(&tx, &alloc_id)?), vec![])
        }

        Command::CreateVm { id, timestamp, name, node_id, vcpu, memory_mb, os_type, disks, networks, metadata, .. } => {
            let disk_ids: Vec<String> = disks.iter().map(|d| d.volume_id.clone()).collect();
            tx.execute(
                "INSERT INTO vms (id, uuid, name, node_id, status, vcpu, memory_mb, os_type, disk_ids, network_interfaces, metadata, started_at, stopped_at)
                 VALUES (?1,?1,?2,?3,'stopped',?4,?5,?6,?7,?8,?9,NULL,NULL)",
                params![
                    id, name, node_id, vcpu, memory_mb, os_type,
                    serde_json::to_string(&disk_ids).unwrap(),
                    serde_json::to_string(&networks).unwrap(),
                    metadata.to_string(),
                ],
            )?;
            for d in &disks {
                tx.execute("UPDATE volumes SET status = 'in_use', vm_id = ?1 WHERE id = ?2", params![id, d.volume_id])?;
            }
            for n in &networks {
                let alloc_id: Option<String> = tx
                    .query_row(
                        "SELECT id FROM ip_allocations WHERE network_id = ?1 AND status = 'available' ORDER BY ip_address LIMIT 1",
                        params![n.network_id],
                        |r| r.get(0),
                    )
                    .optional()?;
                let alloc_id = alloc_id.ok_or_else(|| StoreError::IpExhausted(n.network_id.clone()))?;
                tx.execute(
                    "UPDATE ip_allocations SET status = 'allocated', vm_id = ?1, allocated_at = ?2 WHERE id = ?3",
                    params![id, timestamp, alloc_id],
                )?;
            }
            let vm = row_vm(&tx, &id)?;
            (Response::Vm(vm.clone()), vec![Event::VmCreated(vm)])
        }

        Command::TransitionVmStatus { id, status, .. } => {
            let old = row_vm(&tx, &id)?.status;
            tx.execute("UPDATE vms SET status = ?1 WHERE id = ?2", params![status_str(vm_status_generic(status)), id])?;
            (Response::Vm(row_vm(&tx, &id)?), vec![Event::VmStatusChanged { id, old, new: status }])
        }

        Command::SetVmNode { id, node_id, .. } => {
            tx.execute("UPDATE vms SET node_id = ?1 WHERE id = ?2", params![node_id, id])?;
            (Response::Vm(row_vm(&tx, &id)?), vec![])
        }

        Command::AttachVolume { vm_id, volume_id, device, .. } => {
            let mut vm = row_vm(&tx, &vm_id)?;
            vm.disk_ids.push(volume_id.clone());
            tx.execute(
                "UPDATE vms SET disk_ids = ?1 WHERE id = ?2",
                params![serde_json::to_string(&vm.disk_ids).unwrap(), vm_id],
            )?;
            tx.execute("UPDATE volumes SET status = 'in_use', vm_id = ?1 WHERE id = ?2", params![vm_id, volume_id])?;
            let _ = device;
            (Response::Vm(row_vm(&tx, &vm_id)?), vec![])
        }

        Command::DetachVolume { vm_id, volume_id, .. } => {
            let mut vm = row_vm(&tx, &vm_id)?;
            vm.disk_ids.retain(|d| d != &volume_id);
            tx.execute(
                "UPDATE vms SET disk_ids = ?1 WHERE id = ?2",
                params![serde_json::to_string(&vm.disk_ids).unwrap(), vm_id],
            )?;
            tx.execute("UPDATE volumes SET status = 'available', vm_id = NULL WHERE id = ?1", params![volume_id])?;
            (Response::Vm(row_vm(&tx, &vm_id)?), vec![])
        }

        Command::DeleteVm { id, .. } => {
            let vm = row_vm(&tx, &id)?;
            if vm.status == VmStatus::Running {
                return Err(StoreError::PreconditionFailed(format!("vm {id} is running")));
            }
            tx.execute("UPDATE ip_allocations SET status = 'available', vm_id = NULL, allocated_at = NULL WHERE vm_id = ?1", params![id])?;
            tx.execute("UPDATE volumes SET status = 'available', vm_id = NULL WHERE vm_id = ?1", params![id])?;
            tx.execute("DELETE FROM vms WHERE id = ?1", params![id])?;
            (Response::Deleted { id: id.clone() }, vec![Event::VmDeleted { id }])
        }

        Command::CreateVolume { id, name, volume_type, size_gb, pool_id, source, .. } => {
            tx.execute(
                "INSERT INTO volumes (id, name, volume_type, size_gb, pool_id, path, status, vm_id, metadata)
                 VALUES (?1,?2,?3,?4,?5,NULL,'creating',NULL,?6)",
                params![id, name, type_str(volume_type), size_gb, pool_id, serde_json::json!({"source": source}).to_string()],
            )?;
            recompute_pool_accounting(&tx, &pool_id)?;
            let vol = row_volume(&tx, &id)?;
            (Response::Volume(vol.clone()), vec![Event::VolumeCreated(vol)])
        }

        Command::TransitionVolumeStatus { id, status, path, .. } => {
            tx.execute(
                "UPDATE volumes SET status = ?1, path = COALESCE(?2, path) WHERE id = ?3",
                params![status_str(volume_status_generic(status)), path, id],
            )?;
            (Response::Volume(row_volume(&tx, &id)?), vec![Event::VolumeStatusChanged { id, new: status }])
        }

        Command::ResizeVolume { id, new_size_gb, .. } => {
            let vol = row_volume(&tx, &id)?;
            if vol.status != VolumeStatus::Available {
                return Err(StoreError::PreconditionFailed(format!("volume {id} is not available")));
            }
            tx.execute("UPDATE volumes SET size_gb = ?1 WHERE id = ?2", params![new_size_gb, id])?;
            recompute_pool_accounting(&tx, &vol.pool_id)?;
            (Response::Volume(row_volume(&tx, &id)?), vec![])
        }

        Command::DeleteVolume { id, .. } => {
            let vol = row_volume(&tx, &id)?;
            if vol.status == VolumeStatus::InUse {
                return Err(StoreError::PreconditionFailed(format!("volume {id} is in use")));
            }
            tx.execute("UPDATE volumes SET status = 'deleting' WHERE id = ?1", params![id])?;
            recompute_pool_accounting(&tx, &vol.pool_id)?;
            (Response::Deleted { id: id.clone() }, vec![Event::VolumeDeleted { id }])
        }

        Command::CreateSnapshot { id, name, volume_id, description, .. } => {
            tx.execute(
                "INSERT INTO snapshots (id, name, volume_id, status, size_gb, snapshot_tag, description, metadata)
                 VALUES (?1,?2,?3,'creating',NULL,'',?4,'{}')",
                params![id, name, volume_id, description],
            )?;
            (Response::Snapshot(row_snapshot(&tx, &id)?), vec![Event::SnapshotCreated { id }])
        }

        Command::TransitionSnapshotStatus { id, status, snapshot_tag, size_gb, .. } => {
            tx.execute(
                "UPDATE snapshots SET status = ?1, snapshot_tag = COALESCE(?2, snapshot_tag), size_gb = COALESCE(?3, size_gb) WHERE id = ?4",
                params![status_str(snapshot_status_generic(status)), snapshot_tag, size_gb, id],
            )?;
            (Response::Snapshot(row_snapshot(&tx, &id)?), vec![])
        }

        Command::DeleteSnapshot { id, .. } => {
            tx.execute("UPDATE snapshots SET status = 'deleting' WHERE id = ?1", params![id])?;
            (Response::Deleted { id: id.clone() }, vec![Event::SnapshotDeleted { id }])
        }

        Command::RestoreSnapshot { id, .. } => {
            let snap = row_snapshot(&tx, &id)?;
            let vol = row_volume(&tx, &snap.volume_id)?;
            if vol.status != VolumeStatus::Available {
                return Err(StoreError::PreconditionFailed(format!(
                    "volume {} is not available; stop the vm before restoring", snap.volume_id
                )));
            }
            (Response::Snapshot(snap), vec![])
        }

        Command::CreatePool { id, name, pool_type, config, capacity_gb, node_id, .. } => {
            tx.execute(
                "INSERT INTO pools (id, name, pool_type, status, config, capacity_gb, allocated_gb, available_gb, node_id)
                 VALUES (?1,?2,?3,'active',?4,?5,0,?5,?6)",
                params![id, name, type_str(pool_type), serde_json::to_string(&config).unwrap(), capacity_gb, node_id],
            )?;
            (Response::Pool(row_pool(&tx, &id)?), vec![])
        }

        Command::DeletePool { id, .. } => {
            let in_use: i64 = tx.query_row(
                "SELECT COUNT(*) FROM volumes WHERE pool_id = ?1 AND status != 'deleting'",
                params![id],
                |r| r.get(0),
            )?;
            if in_use > 0 {
                return Err(StoreError::PreconditionFailed(format!("pool {id} still has {in_use} volume(s)")));
            }
            tx.execute("DELETE FROM pools WHERE id = ?1", params![id])?;
            (Response::Deleted { id }, vec![])
        }

        Command::CreateTask { id, timestamp, task_type, target_type, target_id, node_id, payload, created_by, max_retries, .. } => {
            tx.execute(
                "INSERT INTO tasks (id, task_type, status, progress, payload, result, error, target_type, target_id, node_id, retry_count, max_retries, created_by, created_at, updated_at)
                 VALUES (?1,?2,'pending',0,?3,NULL,NULL,?4,?5,?6,0,?7,?8,?9,?9)",
                params![id, task_type, payload.to_string(), target_type, target_id, node_id, max_retries, created_by, timestamp],
            )?;
            let task = row_task(&tx, &id)?;
            (Response::Task(task.clone()), vec![Event::TaskCreated(task)])
        }

        Command::UpdateTaskProgress { id, timestamp, progress } => {
            let current = row_task(&tx, &id)?;
            if progress < current.progress {
                return Err(StoreError::Internal(format!("task {id} progress would decrease")));
            }
            tx.execute(
                "UPDATE tasks SET progress = ?1, status = 'running', updated_at = ?2 WHERE id = ?3",
                params![progress, timestamp, id],
            )?;
            let task = row_task(&tx, &id)?;
            (Response::Task(task.clone()), vec![Event::TaskUpdated(task)])
        }

        Command::CompleteTask { id, timestamp, result } => {
            tx.execute(
                "UPDATE tasks SET status = 'completed', progress = 100, result = ?1, updated_at = ?2 WHERE id = ?3",
                params![result.to_string(), timestamp, id],
            )?;
            let task = row_task(&tx, &id)?;
            (Response::Task(task.clone()), vec![Event::TaskUpdated(task)])
        }

        Command::FailTask { id, timestamp, error, retry } => {
            let current = row_task(&tx, &id)?;
            if retry && current.retry_count < current.max_retries {
                tx.execute(
                    "UPDATE tasks SET status = 'pending', retry_count = retry_count + 1, error = ?1, updated_at = ?2 WHERE id = ?3",
                    params![error, timestamp, id],
                )?;
            } else {
                tx.execute(
                    "UPDATE tasks SET status = 'failed', error = ?1, updated_at = ?2 WHERE id = ?3",
                    params![error, timestamp, id],
                )?;
            }
            let task = row_task(&tx, &id)?;
            (Response::Task(task.clone()), vec![Event::TaskUpdated(task)])
        }

        Command::CreateUser { id, timestamp, username, password_hash, role, .. } => {
            tx.execute(
                "INSERT INTO users (id, username, password_hash, role, created_at) VALUES (?1,?2,?3,?4,?5)",
                params![id, username, password_hash, role, timestamp],
            )?;
            (
                Response::User(crate::command::UserData { id, username, password_hash, role, created_at: timestamp }),
                vec![],
            )
        }

        Command::RecordAudit { id, timestamp, actor, action, target_type, target_id, details } => {
            tx.execute(
                "INSERT INTO audit_log (id, actor, action, target_type, target_id, details, created_at) VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![id, actor, action, target_type, target_id, details.to_string(), timestamp],
            )?;
            (Response::Deleted { id }, vec![])
        }
    };
    tx.commit()?;
    Ok(result)
}

fn materialize_ip_pool(tx: &rusqlite::Transaction, network_id: &str, net: &ipnetwork::IpNetwork, gateway: Option<&str>) -> Result<()> {
    let excluded_gw = gateway.and_then(|g| g.parse::<std::net::IpAddr>().ok());
    let network_addr = net.network();
    let broadcast_addr = match net {
        ipnetwork::IpNetwork::V4(n) => Some(std::net::IpAddr::V4(n.broadcast())),
        ipnetwork::IpNetwork::V6(_) => None,
    };
    for ip in net.iter() {
        if ip == network_addr || Some(ip) == broadcast_addr || Some(ip) == excluded_gw {
            continue;
        }
        let id = uuid::Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO ip_allocations (id, network_id, ip_address, mac, vm_id, status, allocated_at)
             VALUES (?1,?2,?3,NULL,NULL,'available',NULL)",
            params![id, network_id, ip.to_string()],
        )?;
    }
    Ok(())
}

// =============================================================================
// Row <-> struct mapping
// =============================================================================

fn row_node(conn: &rusqlite::Connection, id: &str) -> Result<NodeData> {
    conn.query_row("SELECT * FROM nodes WHERE id = ?1", params![id], row_to_node)
        .map_err(|_| StoreError::NotFound(format!("node {id}")))
}

fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<NodeData> {
    Ok(NodeData {
        id: row.get("id")?,
        hostname: row.get("hostname")?,
        ip_address: row.get("ip_address")?,
        status: parse_node_status(&row.get::<_, String>("status")?),
        hypervisor_type: row.get("hypervisor_type")?,
        hypervisor_version: row.get("hypervisor_version")?,
        cpu_cores: row.get("cpu_cores")?,
        cpu_threads: row.get("cpu_threads")?,
        memory_total_bytes: row.get::<_, i64>("memory_total_bytes")? as u64,
        disk_total_bytes: row.get::<_, i64>("disk_total_bytes")? as u64,
        metadata: serde_json::from_str(&row.get::<_, String>("metadata")?).unwrap_or_default(),
        last_heartbeat: row.get("last_heartbeat")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_network(conn: &rusqlite::Connection, id: &str) -> Result<NetworkData> {
    conn.query_row("SELECT * FROM networks WHERE id = ?1", params![id], row_to_network)
        .map_err(|_| StoreError::NotFound(format!("network {id}")))
}

fn row_to_network(row: &rusqlite::Row) -> rusqlite::Result<NetworkData> {
    Ok(NetworkData {
        id: row.get("id")?,
        name: row.get("name")?,
        network_type: parse_network_type(&row.get::<_, String>("network_type")?),
        cidr: row.get("cidr")?,
        gateway: row.get("gateway")?,
        mtu: row.get("mtu")?,
        vlan_id: row.get("vlan_id")?,
        node_id: row.get("node_id")?,
        status: parse_network_status(&row.get::<_, String>("status")?),
    })
}

fn row_ip(conn: &rusqlite::Connection, id: &str) -> Result<IpAllocationData> {
    conn.query_row("SELECT * FROM ip_allocations WHERE id = ?1", params![id], row_to_ip)
        .map_err(|_| StoreError::NotFound(format!("ip allocation {id}")))
}

fn row_to_ip(row: &rusqlite::Row) -> rusqlite::Result<IpAllocationData> {
    Ok(IpAllocationData {
        id: row.get("id")?,
        network_id: row.get("network_id")?,
        ip_address: row.get("ip_address")?,
        mac: row.get("mac")?,
        vm_id: row.get("vm_id")?,
        status: parse_ip_status(&row.get::<_, String>("status")?),
        allocated_at: row.get("allocated_at")?,
    })
}

fn row_vm(conn: &rusqlite::Connection, id: &str) -> Result<VmData> {
    conn.query_row("SELECT * FROM vms WHERE id = ?1", params![id], row_to_vm)
        .map_err(|_| StoreError::NotFound(format!("vm {id}")))
}

fn row_to_vm(row: &rusqlite::Row) -> rusqlite::Result<VmData> {
    Ok(VmData {
        id: row.get("id")?,
        uuid: row.get("uuid")?,
        name: row.get("name")?,
        node_id: row.get("node_id")?,
        status: parse_vm_status(&row.get::<_, String>("status")?),
        vcpu: row.get("vcpu")?,
        memory_mb: row.get::<_, i64>("memory_mb")? as u64,
        os_type: row.get("os_type")?,
        disk_ids: serde_json::from_str(&row.get::<_, String>("disk_ids")?).unwrap_or_default(),
        network_interfaces: serde_json::from_str(&row.get::<_, String>("network_interfaces")?).unwrap_or_default(),
        metadata: serde_json::from_str(&row.get::<_, String>("metadata")?).unwrap_or_default(),
        started_at: row.get("started_at")?,
        stopped_at: row.get("stopped_at")?,
    })
}

fn row_volume(conn: &rusqlite::Connection, id: &str) -> Result<VolumeData> {
    conn.query_row("SELECT * FROM volumes WHERE id = ?1", params![id], row_to_volume)
        .map_err(|_| StoreError::NotFound(format!("volume {id}")))
}

fn row_to_volume(row: &rusqlite::Row) -> rusqlite::Result<VolumeData> {
    Ok(VolumeData {
        id: row.get("id")?,
        name: row.get("name")?,
        volume_type: parse_volume_type(&row.get::<_, String>("volume_type")?),
        size_gb: row.get::<_, i64>("size_gb")? as u64,
        pool_id: row.get("pool_id")?,
        path: row.get("path")?,
        status: parse_volume_status(&row.get::<_, String>("status")?),
        vm_id: row.get("vm_id")?,
        metadata: serde_json::from_str(&row.get::<_, String>("metadata")?).unwrap_or_default(),
    })
}

fn row_snapshot(conn: &rusqlite::Connection, id: &str) -> Result<SnapshotData> {
    conn.query_row("SELECT * FROM snapshots WHERE id = ?1", params![id], row_to_snapshot)
        .map_err(|_| StoreError::NotFound(format!("snapshot {id}")))
}

fn row_to_snapshot(row: &rusqlite::Row) -> rusqlite::Result<SnapshotData> {
    Ok(SnapshotData {
        id: row.get("id")?,
        name: row.get("name")?,
        volume_id: row.get("volume_id")?,
        status: parse_snapshot_status(&row.get::<_, String>("status")?),
        size_gb: row.get::<_, Option<i64>>("size_gb")?.map(|v| v as u64),
        snapshot_tag: row.get("snapshot_tag")?,
        description: row.get("description")?,
        metadata: serde_json::from_str(&row.get::<_, String>("metadata")?).unwrap_or_default(),
    })
}

/// Recomputes `allocated_gb`/`available_gb` for a pool from its current
/// non-deleting volumes (Data Model invariant 3: `allocated_gb = Σ
/// volume.size_gb` over volumes not in `deleting` status).
fn recompute_pool_accounting(tx: &rusqlite::Transaction, pool_id: &str) -> Result<()> {
    let allocated: i64 = tx.query_row(
        "SELECT COALESCE(SUM(size_gb), 0) FROM volumes WHERE pool_id = ?1 AND status != 'deleting'",
        params![pool_id],
        |r| r.get(0),
    )?;
    tx.execute(
        "UPDATE pools SET allocated_gb = ?1, available_gb = capacity_gb - ?1 WHERE id = ?2",
        params![allocated, pool_id],
    )?;
    Ok(())
}

fn row_pool(conn: &rusqlite::Connection, id: &str) -> Result<PoolData> {
    conn.query_row("SELECT * FROM pools WHERE id = ?1", params![id], row_to_pool)
        .map_err(|_| StoreError::NotFound(format!("pool {id}")))
}

fn row_to_pool(row: &rusqlite::Row) -> rusqlite::Result<PoolData> {
    let config_str: String = row.get("config")?;
    let config: PoolConfig = serde_json::from_str(&config_str).unwrap_or(PoolConfig::Nfs {
        server: String::new(),
        export: String::new(),
        mount_options: None,
    });
    Ok(PoolData {
        id: row.get("id")?,
        name: row.get("name")?,
        pool_type: parse_pool_type(&row.get::<_, String>("pool_type")?),
        status: parse_pool_status(&row.get::<_, String>("status")?),
        config,
        capacity_gb: row.get::<_, i64>("capacity_gb")? as u64,
        allocated_gb: row.get::<_, i64>("allocated_gb")? as u64,
        available_gb: row.get::<_, i64>("available_gb")? as u64,
        node_id: row.get("node_id")?,
    })
}

fn row_task(conn: &rusqlite::Connection, id: &str) -> Result<TaskData> {
    conn.query_row("SELECT * FROM tasks WHERE id = ?1", params![id], row_to_task)
        .map_err(|_| StoreError::NotFound(format!("task {id}")))
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<TaskData> {
    Ok(TaskData {
        id: row.get("id")?,
        task_type: row.get("task_type")?,
        status: parse_task_status(&row.get::<_, String>("status")?),
        progress: row.get("progress")?,
        payload: serde_json::from_str(&row.get::<_, String>("payload")?).unwrap_or_default(),
        result: row
            .get::<_, Option<String>>("result")?
            .map(|s| serde_json::from_str(&s).unwrap_or_default()),
        error: row.get("error")?,
        target_type: row.get("target_type")?,
        target_id: row.get("target_id")?,
        node_id: row.get("node_id")?,
        retry_count: row.get("retry_count")?,
        max_retries: row.get("max_retries")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn status_str(s: impl std::fmt::Debug) -> String {
    format!("{s:?}").to_lowercase()
}
fn type_str(s: impl std::fmt::Debug) -> String {
    format!("{s:?}").to_lowercase()
}

fn vm_status_generic(s: VmStatus) -> VmStatus {
    s
}
fn volume_status_generic(s: VolumeStatus) -> VolumeStatus {
    s
}
fn snapshot_status_generic(s: SnapshotStatus) -> SnapshotStatus {
    s
}

fn parse_node_status(s: &str) -> NodeStatus {
    match s {
        "online" => NodeStatus::Online,
        "maintenance" => NodeStatus::Maintenance,
        "error" => NodeStatus::Error,
        _ => NodeStatus::Offline,
    }
}
fn parse_network_type(s: &str) -> NetworkType {
    if s == "ovs" { NetworkType::Ovs } else { NetworkType::Bridge }
}
fn parse_network_status(s: &str) -> NetworkStatus {
    if s == "error" { NetworkStatus::Error } else { NetworkStatus::Active }
}
fn parse_ip_status(s: &str) -> IpStatus {
    match s {
        "allocated" => IpStatus::Allocated,
        "reserved" => IpStatus::Reserved,
        _ => IpStatus::Available,
    }
}
fn parse_vm_status(s: &str) -> VmStatus {
    match s {
        "starting" => VmStatus::Starting,
        "running" => VmStatus::Running,
        "stopping" => VmStatus::Stopping,
        "paused" => VmStatus::Paused,
        "restarting" => VmStatus::Restarting,
        "migrating" => VmStatus::Migrating,
        "error" => VmStatus::Error,
        _ => VmStatus::Stopped,
    }
}
fn parse_volume_type(s: &str) -> VolumeType {
    match s {
        "raw" => VolumeType::Raw,
        "ceph" => VolumeType::Ceph,
        "nfs" => VolumeType::Nfs,
        "lvm" => VolumeType::Lvm,
        _ => VolumeType::Qcow2,
    }
}
fn parse_volume_status(s: &str) -> VolumeStatus {
    match s {
        "available" => VolumeStatus::Available,
        "in_use" => VolumeStatus::InUse,
        "deleting" => VolumeStatus::Deleting,
        "error" => VolumeStatus::Error,
        _ => VolumeStatus::Creating,
    }
}
fn parse_snapshot_status(s: &str) -> SnapshotStatus {
    match s {
        "available" => SnapshotStatus::Available,
        "deleting" => SnapshotStatus::Deleting,
        "error" => SnapshotStatus::Error,
        _ => SnapshotStatus::Creating,
    }
}
fn parse_pool_type(s: &str) -> PoolType {
    match s {
        "lvm" => PoolType::Lvm,
        "ceph" => PoolType::Ceph,
        "iscsi" => PoolType::Iscsi,
        _ => PoolType::Nfs,
    }
}
fn parse_pool_status(s: &str) -> PoolStatus {
    match s {
        "inactive" => PoolStatus::Inactive,
        "error" => PoolStatus::Error,
        _ => PoolStatus::Active,
    }
}
fn parse_task_status(s: &str) -> TaskStatus {
    match s {
        "running" => TaskStatus::Running,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "cancelled" => TaskStatus::Cancelled,
        _ => TaskStatus::Pending,
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    hostname TEXT NOT NULL UNIQUE,
    ip_address TEXT NOT NULL,
    status TEXT NOT NULL,
    hypervisor_type TEXT NOT NULL,
    hypervisor_version TEXT NOT NULL,
    cpu_cores INTEGER NOT NULL,
    cpu_threads INTEGER NOT NULL,
    memory_total_bytes INTEGER NOT NULL,
    disk_total_bytes INTEGER NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    last_heartbeat TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS networks (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    network_type TEXT NOT NULL,
    cidr TEXT NOT NULL,
    gateway TEXT,
    mtu INTEGER NOT NULL,
    vlan_id INTEGER,
    node_id TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS ip_allocations (
    id TEXT PRIMARY KEY,
    network_id TEXT NOT NULL,
    ip_address TEXT NOT NULL,
    mac TEXT,
    vm_id TEXT,
    status TEXT NOT NULL,
    allocated_at TEXT,
    UNIQUE(network_id, ip_address)
);

CREATE TABLE IF NOT EXISTS pools (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    pool_type TEXT NOT NULL,
    status TEXT NOT NULL,
    config TEXT NOT NULL,
    capacity_gb INTEGER NOT NULL,
    allocated_gb INTEGER NOT NULL,
    available_gb INTEGER NOT NULL,
    node_id TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS volumes (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    volume_type TEXT NOT NULL,
    size_gb INTEGER NOT NULL,
    pool_id TEXT NOT NULL,
    path TEXT,
    status TEXT NOT NULL,
    vm_id TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS snapshots (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    volume_id TEXT NOT NULL,
    status TEXT NOT NULL,
    size_gb INTEGER,
    snapshot_tag TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS vms (
    id TEXT PRIMARY KEY,
    uuid TEXT NOT NULL,
    name TEXT NOT NULL,
    node_id TEXT,
    status TEXT NOT NULL,
    vcpu INTEGER NOT NULL,
    memory_mb INTEGER NOT NULL,
    os_type TEXT NOT NULL,
    disk_ids TEXT NOT NULL DEFAULT '[]',
    network_interfaces TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    started_at TEXT,
    stopped_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    task_type TEXT NOT NULL,
    status TEXT NOT NULL,
    progress INTEGER NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    result TEXT,
    error TEXT,
    target_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    node_id TEXT,
    retry_count INTEGER NOT NULL,
    max_retries INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id TEXT PRIMARY KEY,
    actor TEXT NOT NULL,
    action TEXT NOT NULL,
    target_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> String {
        "2025-01-01T00:00:00Z".to_string()
    }

    #[tokio::test]
    async fn register_node_then_idempotent_replay() {
        let store = SqliteStore::open_in_memory().unwrap();
        let cmd = Command::RegisterNode {
            request_id: "r1".into(),
            id: "n1".into(),
            timestamp: ts(),
            hostname: "host-a".into(),
            ip_address: "10.0.0.1".into(),
            hypervisor_type: "kvm".into(),
            hypervisor_version: "8.0".into(),
            cpu_cores: 8,
            cpu_threads: 16,
            memory_total_bytes: 1 << 34,
            disk_total_bytes: 1 << 40,
        };
        let (r1, _) = store.apply(cmd.clone()).await.unwrap();
        let (r2, ev2) = store.apply(cmd).await.unwrap();
        assert!(ev2.is_empty(), "replay must not re-emit events");
        match (r1, r2) {
            (Response::Node(a), Response::Node(b)) => assert_eq!(a.id, b.id),
            _ => panic!("expected Node responses"),
        }
    }

    #[tokio::test]
    async fn network_create_materializes_ip_pool_excluding_reserved_addresses() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .apply(Command::RegisterNode {
                request_id: "rn".into(),
                id: "n1".into(),
                timestamp: ts(),
                hostname: "h".into(),
                ip_address: "10.0.0.1".into(),
                hypervisor_type: "kvm".into(),
                hypervisor_version: "8".into(),
                cpu_cores: 4,
                cpu_threads: 8,
                memory_total_bytes: 0,
                disk_total_bytes: 0,
            })
            .await
            .unwrap();
        store
            .apply(Command::CreateNetwork {
                request_id: "r2".into(),
                id: "net1".into(),
                timestamp: ts(),
                name: "net1".into(),
                network_type: NetworkType::Bridge,
                cidr: "192.168.1.0/29".into(),
                gateway: Some("192.168.1.1".into()),
                mtu: 1500,
                vlan_id: None,
                node_id: "n1".into(),
            })
            .await
            .unwrap();
        let (list, total) = store.list_networks(1, 10).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(total, 1);

        let mut available = 0;
        for _ in 0..5 {
            if store
                .apply(Command::AllocateIp { request_id: uuid::Uuid::new_v4().to_string(), network_id: "net1".into(), timestamp: ts() })
                .await
                .is_ok()
            {
                available += 1;
            }
        }
        // /29 has 8 addresses minus network/broadcast/gateway = 5 allocatable.
        assert_eq!(available, 5);
        let exhausted = store
            .apply(Command::AllocateIp { request_id: uuid::Uuid::new_v4().to_string(), network_id: "net1".into(), timestamp: ts() })
            .await;
        assert!(matches!(exhausted, Err(StoreError::IpExhausted(_))));
    }

    #[tokio::test]
    async fn delete_network_rejected_while_ip_allocated() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .apply(Command::CreateNetwork {
                request_id: "r1".into(),
                id: "net1".into(),
                timestamp: ts(),
                name: "net1".into(),
                network_type: NetworkType::Bridge,
                cidr: "10.10.0.0/30".into(),
                gateway: None,
                mtu: 1500,
                vlan_id: None,
                node_id: "n1".into(),
            })
            .await
            .unwrap();
        store
            .apply(Command::AllocateIp { request_id: "r2".into(), network_id: "net1".into(), timestamp: ts() })
            .await
            .unwrap();
        let err = store
            .apply(Command::DeleteNetwork { request_id: "r3".into(), id: "net1".into(), timestamp: ts() })
            .await;
        assert!(matches!(err, Err(StoreError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn delete_running_vm_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .apply(Command::CreateVm {
                request_id: "r1".into(),
                id: "vm1".into(),
                timestamp: ts(),
                name: "vm1".into(),
                node_id: "n1".into(),
                vcpu: 2,
                memory_mb: 2048,
                os_type: "linux".into(),
                disks: vec![],
                networks: vec![],
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();
        store
            .apply(Command::TransitionVmStatus { request_id: "r2".into(), id: "vm1".into(), timestamp: ts(), status: VmStatus::Running })
            .await
            .unwrap();
        let err = store
            .apply(Command::DeleteVm { request_id: "r3".into(), id: "vm1".into(), timestamp: ts() })
            .await;
        assert!(matches!(err, Err(StoreError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn task_progress_cannot_decrease() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .apply(Command::CreateTask {
                request_id: "r1".into(),
                id: "t1".into(),
                timestamp: ts(),
                task_type: "vm.start".into(),
                target_type: "vm".into(),
                target_id: "vm1".into(),
                node_id: Some("n1".into()),
                payload: serde_json::json!({}),
                created_by: "system".into(),
                max_retries: 3,
            })
            .await
            .unwrap();
        store
            .apply(Command::UpdateTaskProgress { request_id: "r2".into(), id: "t1".into(), timestamp: ts(), progress: 50 })
            .await
            .unwrap();
        let err = store
            .apply(Command::UpdateTaskProgress { request_id: "r3".into(), id: "t1".into(), timestamp: ts(), progress: 10 })
            .await;
        assert!(err.is_err());
    }
}
