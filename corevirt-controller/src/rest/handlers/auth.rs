//! `POST /api/auth/login` (spec §4.6): verifies the submitted password
//! against the stored argon2 hash, then mints a bearer token.

use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::rbac::Role;
use crate::store::StoreError;

use super::{ApiError, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthToken {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub auth: AuthToken,
}

#[utoipa::path(post, path = "/api/auth/login", request_body = LoginRequest,
    responses((status = 200, body = LoginResponse), (status = 401, description = "bad credentials")), tag = "auth")]
pub async fn login(State(state): State<Arc<AppState>>, Json(req): Json<LoginRequest>) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .store
        .get_user_by_username(&req.username)
        .await
        .map_err(|_| ApiError(StoreError::Unauthorized("invalid username or password".into())))?;

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| ApiError(StoreError::Internal("corrupt password hash on user row".into())))?;
    if Argon2::default().verify_password(req.password.as_bytes(), &parsed_hash).is_err() {
        return Err(ApiError(StoreError::Unauthorized("invalid username or password".into())));
    }

    let token = state.auth.login(&user.id, Role::parse(&user.role)).await;
    Ok(Json(LoginResponse { auth: AuthToken { token } }))
}
