pub mod auth;
pub mod networks;
pub mod nodes;
pub mod storage;
pub mod tasks;
pub mod vms;
pub mod ws;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use crate::app_state::AppState;
pub use crate::error::ApiError;
use crate::rbac::{Permission, Role};
use crate::store::StoreError;

/// `?page&page_size` (spec §6, "Pagination"). `per_page` is accepted as
/// an alias for `page_size` for client compatibility.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default, alias = "per_page")]
    pub page_size: Option<u32>,
}

fn default_page() -> u32 {
    1
}

impl PageQuery {
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(50).clamp(1, 500)
    }
}

/// Nested `pagination` object, carried alongside the flat `page` /
/// `page_size` fields so both client shapes the source supported keep
/// working (Design Notes §9).
#[derive(Debug, Serialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, page: u32, page_size: u32) -> Self {
        Self { items, total, page, page_size, pagination: Pagination { page, page_size, total } }
    }
}

/// Extracted from `Authorization: Bearer <token>`, checked against
/// [`crate::rbac::AuthRegistry`] (spec §4.6).
pub struct AuthUser {
    pub user_id: String,
    pub role: Role,
}

impl FromRequestParts<std::sync::Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &std::sync::Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError(StoreError::Unauthorized("missing authorization header".into())))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError(StoreError::Unauthorized("expected Bearer token".into())))?;
        let (user_id, role) = state.auth.authenticate(token).await?;
        Ok(AuthUser { user_id, role })
    }
}

impl AuthUser {
    pub fn require(&self, perm: Permission) -> Result<(), ApiError> {
        if self.role.permissions().contains(&perm) {
            Ok(())
        } else {
            Err(ApiError(StoreError::Unauthorized(format!("{:?} lacks {:?}", self.role, perm))))
        }
    }
}
