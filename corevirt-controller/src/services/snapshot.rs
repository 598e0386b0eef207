//! Snapshot lifecycle orchestration (spec §4.4, "Snapshot lifecycle").

use std::sync::Arc;

use corevirt_proto::methods;
use corevirt_proto::payloads::{SnapshotCreateRequest, SnapshotDeleteRequest, SnapshotRestoreRequest};
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::command::{Command, SnapshotStatus, VolumeStatus};
use crate::registry::AgentRegistry;
use crate::rpc::transport;
use crate::store::{MetadataStore, Result, StoreError};
use crate::task_keys;

pub struct SnapshotService {
    store: Arc<dyn MetadataStore>,
    agents: Arc<AgentRegistry>,
    audit: Arc<AuditLogger>,
}

impl SnapshotService {
    pub fn new(store: Arc<dyn MetadataStore>, agents: Arc<AgentRegistry>, audit: Arc<AuditLogger>) -> Arc<Self> {
        Arc::new(Self { store, agents, audit })
    }

    /// Creation takes the live or offline path depending on the parent
    /// volume's current status; either way it's the same agent method,
    /// the hypervisor driver decides how to quiesce I/O.
    pub async fn create(&self, actor: &str, volume_id: &str, name: &str, description: &str) -> Result<String> {
        let volume = self.store.get_volume(volume_id).await?;
        if !matches!(volume.status, VolumeStatus::Available | VolumeStatus::InUse) {
            return Err(StoreError::PreconditionFailed(format!("volume {volume_id} is not in a snapshottable state")));
        }
        let node_id = self.node_for_volume(&volume).await?;

        let id = Uuid::new_v4().to_string();
        let snapshot_tag = format!("snap-{}", &id[..8]);
        self.store
            .apply(Command::CreateSnapshot {
                request_id: Uuid::new_v4().to_string(),
                id: id.clone(),
                timestamp: now(),
                name: name.to_string(),
                volume_id: volume_id.to_string(),
                description: description.to_string(),
            })
            .await?;

        let task_id = self.create_task("snapshot.create", &id, &node_id, actor).await?;
        let req = SnapshotCreateRequest {
            snapshot_id: id.parse().unwrap_or_default(),
            volume_id: volume_id.parse().unwrap_or_default(),
            snapshot_tag: snapshot_tag.clone(),
        };
        let payload = serde_json::json!({ "task_id": task_id, "request": req, "live": volume.status == VolumeStatus::InUse });

        match self.dispatch(&node_id, methods::SNAPSHOT_CREATE, payload).await {
            Ok(result) => {
                let size_gb = result.get("size_gb").and_then(|v| v.as_u64());
                self.transition(&id, SnapshotStatus::Available, Some(snapshot_tag), size_gb).await?;
                self.complete_task(&task_id, result).await?;
            }
            Err(e) => self.on_rpc_failure(&id, &task_id, e).await?,
        }
        self.audit.record(actor, "snapshot.created", "snapshot", &id, serde_json::json!({"volume_id": volume_id}));
        Ok(id)
    }

    /// Restore requires the parent volume to be `available`; it can't
    /// be rolled back while something else holds it open.
    pub async fn restore(&self, actor: &str, snapshot_id: &str) -> Result<()> {
        let snapshot = self.store.get_snapshot(snapshot_id).await?;
        let volume = self.store.get_volume(&snapshot.volume_id).await?;
        if volume.status != VolumeStatus::Available {
            return Err(StoreError::PreconditionFailed(format!("volume {} is not available", snapshot.volume_id)));
        }
        let node_id = self.node_for_volume(&volume).await?;
        let task_id = self.create_task("snapshot.restore", snapshot_id, &node_id, actor).await?;

        let req = SnapshotRestoreRequest { snapshot_id: snapshot_id.parse().unwrap_or_default(), volume_id: snapshot.volume_id.parse().unwrap_or_default() };
        let payload = serde_json::json!({ "task_id": task_id, "request": req });
        match self.dispatch(&node_id, methods::SNAPSHOT_RESTORE, payload).await {
            Ok(result) => {
                self.store
                    .apply(Command::RestoreSnapshot { request_id: Uuid::new_v4().to_string(), id: snapshot_id.to_string(), timestamp: now() })
                    .await?;
                self.complete_task(&task_id, result).await?;
            }
            Err(e) => self.on_rpc_failure(snapshot_id, &task_id, e).await?,
        }
        self.audit.record(actor, "snapshot.restored", "snapshot", snapshot_id, serde_json::json!({}));
        Ok(())
    }

    pub async fn delete(&self, actor: &str, snapshot_id: &str) -> Result<()> {
        let snapshot = self.store.get_snapshot(snapshot_id).await?;
        let volume = self.store.get_volume(&snapshot.volume_id).await?;
        let node_id = self.node_for_volume(&volume).await?;
        let task_id = self.create_task("snapshot.delete", snapshot_id, &node_id, actor).await?;

        let req = SnapshotDeleteRequest { snapshot_id: snapshot_id.parse().unwrap_or_default(), volume_id: snapshot.volume_id.parse().unwrap_or_default() };
        let payload = serde_json::json!({ "task_id": task_id, "request": req });
        match self.dispatch(&node_id, methods::SNAPSHOT_DELETE, payload).await {
            Ok(result) => {
                self.store
                    .apply(Command::DeleteSnapshot { request_id: Uuid::new_v4().to_string(), id: snapshot_id.to_string(), timestamp: now() })
                    .await?;
                self.complete_task(&task_id, result).await?;
            }
            Err(e) => self.on_rpc_failure(snapshot_id, &task_id, e).await?,
        }
        self.audit.record(actor, "snapshot.deleted", "snapshot", snapshot_id, serde_json::json!({}));
        Ok(())
    }

    async fn node_for_volume(&self, volume: &crate::command::VolumeData) -> Result<String> {
        let pool = self.store.get_pool(&volume.pool_id).await?;
        pool.node_id.ok_or_else(|| StoreError::PreconditionFailed(format!("pool {} has no host node", volume.pool_id)))
    }

    async fn transition(&self, id: &str, status: SnapshotStatus, snapshot_tag: Option<String>, size_gb: Option<u64>) -> Result<()> {
        self.store
            .apply(Command::TransitionSnapshotStatus { request_id: Uuid::new_v4().to_string(), id: id.to_string(), timestamp: now(), status, snapshot_tag, size_gb })
            .await
            .map(|_| ())
    }

    async fn create_task(&self, task_type: &str, target_id: &str, node_id: &str, actor: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.store
            .apply(Command::CreateTask {
                request_id: Uuid::new_v4().to_string(),
                id: id.clone(),
                timestamp: now(),
                task_type: task_type.to_string(),
                target_type: "snapshot".to_string(),
                target_id: target_id.to_string(),
                node_id: Some(node_id.to_string()),
                payload: serde_json::json!({}),
                created_by: actor.to_string(),
                max_retries: task_keys::DEFAULT_MAX_RETRIES,
            })
            .await?;
        Ok(id)
    }

    async fn complete_task(&self, task_id: &str, result: serde_json::Value) -> Result<()> {
        self.store
            .apply(Command::CompleteTask { request_id: Uuid::new_v4().to_string(), id: task_id.to_string(), timestamp: now(), result })
            .await
            .map(|_| ())
    }

    async fn on_rpc_failure(&self, id: &str, task_id: &str, err: corevirt_proto::RpcError) -> Result<()> {
        tracing::warn!(id, task_id, error = %err, "snapshot rpc failed, deferring to reconciliation");
        self.store
            .apply(Command::FailTask { request_id: Uuid::new_v4().to_string(), id: task_id.to_string(), timestamp: now(), error: err.to_string(), retry: err.code == corevirt_proto::ErrorCode::Timeout })
            .await?;
        Ok(())
    }

    async fn dispatch(&self, node_id: &str, method: &str, payload: serde_json::Value) -> std::result::Result<serde_json::Value, corevirt_proto::RpcError> {
        let Some(conn) = self.agents.get(node_id).await else {
            return Err(corevirt_proto::RpcError::new(corevirt_proto::ErrorCode::NodeOffline, format!("node {node_id} is not connected")));
        };
        transport::call(&conn, method, payload, transport::long_op_timeout()).await
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
