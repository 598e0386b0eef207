//! Volume lifecycle orchestration (spec §4.4, "Volume lifecycle").

use std::sync::Arc;

use corevirt_proto::payloads::{VolumeCloneRequest, VolumeCreateRequest, VolumeDeleteRequest, VolumeResizeRequest};
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::command::{Command, VolumeStatus, VolumeType};
use crate::registry::AgentRegistry;
use crate::rpc::transport;
use crate::store::{MetadataStore, Result, StoreError};
use crate::task_keys;

pub struct CreateVolumeRequest {
    pub name: String,
    pub volume_type: VolumeType,
    pub size_gb: u64,
    pub pool_id: String,
    pub source: Option<String>,
}

pub struct VolumeService {
    store: Arc<dyn MetadataStore>,
    agents: Arc<AgentRegistry>,
    audit: Arc<AuditLogger>,
}

impl VolumeService {
    pub fn new(store: Arc<dyn MetadataStore>, agents: Arc<AgentRegistry>, audit: Arc<AuditLogger>) -> Arc<Self> {
        Arc::new(Self { store, agents, audit })
    }

    pub async fn create(&self, actor: &str, req: CreateVolumeRequest) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let pool = self.store.get_pool(&req.pool_id).await?;
        self.store
            .apply(Command::CreateVolume {
                request_id: Uuid::new_v4().to_string(),
                id: id.clone(),
                timestamp: now(),
                name: req.name,
                volume_type: req.volume_type,
                size_gb: req.size_gb,
                pool_id: req.pool_id.clone(),
                source: req.source.clone(),
            })
            .await?;

        let task_id = self.create_task("volume.create", &id, pool.node_id.as_deref(), actor).await?;
        let Some(node_id) = pool.node_id.clone() else {
            return Err(StoreError::PreconditionFailed(format!("pool {} has no host node", req.pool_id)));
        };
        let create_req = VolumeCreateRequest {
            volume_id: id.parse().unwrap_or_default(),
            pool_id: req.pool_id.parse().unwrap_or_default(),
            pool_config: pool.config.clone(),
            size_gb: req.size_gb,
            volume_type: format!("{:?}", req.volume_type).to_lowercase(),
        };
        let payload = serde_json::json!({ "task_id": task_id, "request": create_req, "source": req.source });

        match self.dispatch(&node_id, corevirt_proto::methods::VOLUME_CREATE, payload).await {
            Ok(result) => {
                let path = result.get("path").and_then(|v| v.as_str()).map(str::to_string);
                self.transition(&id, VolumeStatus::Available, path).await?;
                self.complete_task(&task_id, result).await?;
            }
            Err(e) => self.on_rpc_failure(&id, &task_id, e).await?,
        }
        self.audit.record(actor, "volume.created", "volume", &id, serde_json::json!({}));
        Ok(id)
    }

    pub async fn resize(&self, vol_id: &str, new_size_gb: u64) -> Result<()> {
        let vol = self.store.get_volume(vol_id).await?;
        if vol.status != VolumeStatus::Available {
            return Err(StoreError::PreconditionFailed(format!("volume {vol_id} is not available")));
        }
        self.store
            .apply(Command::ResizeVolume { request_id: Uuid::new_v4().to_string(), id: vol_id.to_string(), timestamp: now(), new_size_gb })
            .await?;
        let _ = VolumeResizeRequest { volume_id: vol_id.parse().unwrap_or_default(), new_size_gb };
        Ok(())
    }

    pub async fn clone(&self, source_id: &str, new_name: &str) -> Result<String> {
        let source = self.store.get_volume(source_id).await?;
        if source.status != VolumeStatus::Available {
            return Err(StoreError::PreconditionFailed(format!("source volume {source_id} is not available")));
        }
        let new_id = Uuid::new_v4().to_string();
        self.store
            .apply(Command::CreateVolume {
                request_id: Uuid::new_v4().to_string(),
                id: new_id.clone(),
                timestamp: now(),
                name: new_name.to_string(),
                volume_type: source.volume_type,
                size_gb: source.size_gb,
                pool_id: source.pool_id.clone(),
                source: Some(format!("clone:{source_id}")),
            })
            .await?;
        let _ = VolumeCloneRequest { source_volume_id: source_id.parse().unwrap_or_default(), new_volume_id: new_id.parse().unwrap_or_default() };
        self.transition(&new_id, VolumeStatus::Available, None).await?;
        Ok(new_id)
    }

    pub async fn delete(&self, actor: &str, vol_id: &str) -> Result<()> {
        let vol = self.store.get_volume(vol_id).await?;
        if vol.status == VolumeStatus::InUse {
            return Err(StoreError::PreconditionFailed(format!("volume {vol_id} is in use")));
        }
        self.store
            .apply(Command::DeleteVolume { request_id: Uuid::new_v4().to_string(), id: vol_id.to_string(), timestamp: now() })
            .await?;
        let _ = VolumeDeleteRequest { volume_id: vol_id.parse().unwrap_or_default(), pool_id: vol.pool_id.parse().unwrap_or_default() };
        self.audit.record(actor, "volume.deleted", "volume", vol_id, serde_json::json!({}));
        Ok(())
    }

    async fn transition(&self, id: &str, status: VolumeStatus, path: Option<String>) -> Result<()> {
        self.store
            .apply(Command::TransitionVolumeStatus { request_id: Uuid::new_v4().to_string(), id: id.to_string(), timestamp: now(), status, path })
            .await
            .map(|_| ())
    }

    async fn create_task(&self, task_type: &str, target_id: &str, node_id: Option<&str>, actor: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.store
            .apply(Command::CreateTask {
                request_id: Uuid::new_v4().to_string(),
                id: id.clone(),
                timestamp: now(),
                task_type: task_type.to_string(),
                target_type: "volume".to_string(),
                target_id: target_id.to_string(),
                node_id: node_id.map(str::to_string),
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
        tracing::warn!(id, task_id, error = %err, "volume rpc failed, deferring to reconciliation");
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
