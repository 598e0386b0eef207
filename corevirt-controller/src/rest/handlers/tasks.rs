//! `/api/tasks` — read-only surface over [`crate::services::task::TaskService`].

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;

use crate::command::TaskData;
use crate::rbac::Permission;

use super::{ApiError, AppState, AuthUser, Page, PageQuery};

#[utoipa::path(get, path = "/api/tasks/{id}", responses((status = 200, body = TaskData)), tag = "tasks")]
pub async fn get(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> Result<Json<TaskData>, ApiError> {
    user.require(Permission::VmRead)?;
    Ok(Json(state.tasks.get(&id).await?))
}

#[utoipa::path(get, path = "/api/tasks", responses((status = 200, body = Page<TaskData>)), tag = "tasks")]
pub async fn list(State(state): State<Arc<AppState>>, user: AuthUser, Query(q): Query<PageQuery>) -> Result<Json<Page<TaskData>>, ApiError> {
    user.require(Permission::VmRead)?;
    let (tasks, total) = state.tasks.list(q.page(), q.page_size()).await?;
    Ok(Json(Page::new(tasks, total, q.page(), q.page_size())))
}
