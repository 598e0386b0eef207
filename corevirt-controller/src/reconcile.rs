//! Reconciliation sweep (spec §4.4, "Failure semantics"): a transport
//! failure during orchestration commits the intent row and fails the
//! task without guessing the true remote state. This sweep runs on a
//! fixed interval, re-queries the agent for anything still pending,
//! and converges it to a terminal state.

use std::sync::Arc;

use corevirt_proto::methods;
use corevirt_proto::payloads::{VmDescribeRequest, VolumeDescribeRequest};
use tracing::{info, warn};
use uuid::Uuid;

use crate::command::{Command, TaskStatus, VmStatus, VolumeStatus};
use crate::registry::AgentRegistry;
use crate::rpc::transport;
use crate::store::MetadataStore;
use crate::task_keys;

pub async fn run_forever(store: Arc<dyn MetadataStore>, agents: Arc<AgentRegistry>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(task_keys::RECONCILE_INTERVAL_SECS));
    loop {
        ticker.tick().await;
        if let Err(e) = sweep(&store, &agents).await {
            warn!(error = %e, "reconciliation sweep failed");
        }
    }
}

async fn sweep(store: &Arc<dyn MetadataStore>, agents: &Arc<AgentRegistry>) -> crate::store::Result<()> {
    let stale_tasks = store.list_stale_tasks().await?;
    info!(count = stale_tasks.len(), "reconciliation sweep starting");

    for task in stale_tasks {
        if task.status != TaskStatus::Pending && task.status != TaskStatus::Running {
            continue;
        }
        let Some(node_id) = task.node_id.clone() else { continue };
        let Some(conn) = agents.get(&node_id).await else {
            fail_or_retry(store, &task.id, task.retry_count, task.max_retries, "node offline during reconciliation").await;
            continue;
        };

        match task.target_type.as_str() {
            "vm" => reconcile_vm(store, &conn, &task).await,
            "volume" => reconcile_volume(store, &conn, &task).await,
            other => {
                warn!(target_type = other, task_id = %task.id, "reconciliation has no handler for this task target type");
            }
        }
    }
    Ok(())
}

async fn reconcile_vm(store: &Arc<dyn MetadataStore>, conn: &crate::registry::AgentConnection, task: &crate::command::TaskData) {
    let req = VmDescribeRequest { vm_id: task.target_id.parse().unwrap_or_default() };
    let payload = serde_json::json!({ "request": req });
    match transport::call(conn, methods::VM_DESCRIBE, payload, transport::default_timeout()).await {
        Ok(result) => {
            let status = result.get("status").and_then(|v| v.as_str()).unwrap_or("");
            let resolved = match status {
                "running" => Some(VmStatus::Running),
                "stopped" => Some(VmStatus::Stopped),
                _ => None,
            };
            if let Some(status) = resolved {
                let _ = store
                    .apply(Command::TransitionVmStatus { request_id: Uuid::new_v4().to_string(), id: task.target_id.clone(), timestamp: now(), status })
                    .await;
                let _ = store
                    .apply(Command::CompleteTask { request_id: Uuid::new_v4().to_string(), id: task.id.clone(), timestamp: now(), result })
                    .await;
            }
        }
        Err(e) => fail_or_retry(store, &task.id, task.retry_count, task.max_retries, &e.to_string()).await,
    }
}

async fn reconcile_volume(store: &Arc<dyn MetadataStore>, conn: &crate::registry::AgentConnection, task: &crate::command::TaskData) {
    let req = VolumeDescribeRequest { volume_id: task.target_id.parse().unwrap_or_default() };
    let payload = serde_json::json!({ "request": req });
    match transport::call(conn, methods::VOLUME_DESCRIBE, payload, transport::default_timeout()).await {
        Ok(result) => {
            let status = result.get("status").and_then(|v| v.as_str()).unwrap_or("");
            let path = result.get("path").and_then(|v| v.as_str()).map(str::to_string);
            let resolved = match status {
                "available" => Some(VolumeStatus::Available),
                "error" => Some(VolumeStatus::Error),
                _ => None,
            };
            if let Some(status) = resolved {
                let _ = store
                    .apply(Command::TransitionVolumeStatus { request_id: Uuid::new_v4().to_string(), id: task.target_id.clone(), timestamp: now(), status, path })
                    .await;
                let _ = store
                    .apply(Command::CompleteTask { request_id: Uuid::new_v4().to_string(), id: task.id.clone(), timestamp: now(), result })
                    .await;
            }
        }
        Err(e) => fail_or_retry(store, &task.id, task.retry_count, task.max_retries, &e.to_string()).await,
    }
}

/// Retries while under `max_retries`; once exhausted the task (and, for
/// VM/volume targets, the entity itself) settles into `error` rather
/// than being swept forever.
async fn fail_or_retry(store: &Arc<dyn MetadataStore>, task_id: &str, retry_count: u32, max_retries: u32, error: &str) {
    let retry = retry_count < max_retries;
    let _ = store
        .apply(Command::FailTask { request_id: Uuid::new_v4().to_string(), id: task_id.to_string(), timestamp: now(), error: error.to_string(), retry })
        .await;
    if !retry {
        if let Ok(task) = store.get_task(task_id).await {
            match task.target_type.as_str() {
                "vm" => {
                    let _ = store
                        .apply(Command::TransitionVmStatus { request_id: Uuid::new_v4().to_string(), id: task.target_id, timestamp: now(), status: VmStatus::Error })
                        .await;
                }
                "volume" => {
                    let _ = store
                        .apply(Command::TransitionVolumeStatus { request_id: Uuid::new_v4().to_string(), id: task.target_id, timestamp: now(), status: VolumeStatus::Error, path: None })
                        .await;
                }
                _ => {}
            }
        }
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
