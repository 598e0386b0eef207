//! Auth & RBAC (spec §4.6): opaque bearer tokens bound to a user id
//! with a fixed expiry, plus the separate shared-secret token agents
//! present at `node.register`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::StoreError;

const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    VmRead,
    VmWrite,
    StorageRead,
    StorageWrite,
    NetworkRead,
    NetworkWrite,
    NodeRead,
    NodeWrite,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Operator,
    Viewer,
}

impl Role {
    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Admin => &[
                VmRead, VmWrite, StorageRead, StorageWrite, NetworkRead, NetworkWrite, NodeRead, NodeWrite, Admin,
            ],
            Role::Operator => &[VmRead, VmWrite, StorageRead, StorageWrite, NetworkRead, NetworkWrite, NodeRead],
            Role::Viewer => &[VmRead, StorageRead, NetworkRead, NodeRead],
        }
    }

    pub fn parse(s: &str) -> Role {
        match s {
            "admin" => Role::Admin,
            "operator" => Role::Operator,
            _ => Role::Viewer,
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    user_id: String,
    role: Role,
    expires_at: DateTime<Utc>,
}

/// In-memory session table. Tokens are opaque UUIDs; the mapping to
/// `(user_id, role, expiry)` never needs to survive a controller
/// restart (clients re-authenticate), so there is no durability
/// requirement forcing this into the relational store.
pub struct AuthRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    agent_secret: String,
}

impl AuthRegistry {
    pub fn new(agent_secret: String) -> Arc<Self> {
        Arc::new(Self { sessions: RwLock::new(HashMap::new()), agent_secret })
    }

    pub async fn login(&self, user_id: &str, role: Role) -> String {
        let token = Uuid::new_v4().to_string();
        let session = Session { user_id: user_id.to_string(), role, expires_at: Utc::now() + Duration::hours(TOKEN_TTL_HOURS) };
        self.sessions.write().await.insert(token.clone(), session);
        token
    }

    pub async fn authenticate(&self, token: &str) -> Result<(String, Role), StoreError> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(token).ok_or_else(|| StoreError::Unauthorized("invalid token".into()))?;
        if session.expires_at < Utc::now() {
            return Err(StoreError::Unauthorized("token expired".into()));
        }
        Ok((session.user_id.clone(), session.role))
    }

    pub fn authorize(&self, role: Role, required: Permission) -> Result<(), StoreError> {
        if role.permissions().contains(&required) {
            Ok(())
        } else {
            Err(StoreError::Unauthorized(format!("{role:?} lacks {required:?}")))
        }
    }

    /// Verifies the shared-secret token an agent presents at
    /// `node.register`, distinct from per-user bearer tokens.
    pub fn verify_agent_token(&self, presented: &str) -> bool {
        presented == self.agent_secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_then_authenticate_round_trips() {
        let reg = AuthRegistry::new("agent-secret".into());
        let token = reg.login("u1", Role::Operator).await;
        let (user_id, role) = reg.authenticate(&token).await.unwrap();
        assert_eq!(user_id, "u1");
        assert_eq!(role, Role::Operator);
    }

    #[tokio::test]
    async fn viewer_cannot_write_vms() {
        let reg = AuthRegistry::new("s".into());
        assert!(reg.authorize(Role::Viewer, Permission::VmWrite).is_err());
        assert!(reg.authorize(Role::Viewer, Permission::VmRead).is_ok());
    }

    #[test]
    fn agent_token_must_match_secret() {
        let reg = AuthRegistry::new("s3cr3t".into());
        assert!(reg.verify_agent_token("s3cr3t"));
        assert!(!reg.verify_agent_token("wrong"));
    }
}
