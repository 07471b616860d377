//! Registration, login, identity and profile changes.

use axum::Json;
use axum::extract::State;
use chatters_auth::{hash_password, verify_password};
use chatters_store::StoreError;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::AuthUser;
use crate::error::ApiError;
use crate::server::AppState;

/// `POST /register` body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    /// Desired identity.
    pub username: String,
    /// Contact address; must be unique.
    pub email: String,
    /// Plaintext password, hashed before storage.
    pub password: String,
}

/// `POST /login` body. `username` may also hold an email address.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    /// Username or email.
    pub username: String,
    /// Plaintext password.
    pub password: String,
}

/// `PUT /api/profile/password` body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChangePasswordRequest {
    /// Current password.
    pub old_password: String,
    /// Replacement password.
    pub new_password: String,
}

/// `PUT /api/profile/username` body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChangeUsernameRequest {
    /// Replacement identity.
    pub new_username: String,
}

/// Create an account. The username becomes the user's identity.
#[instrument(skip_all, fields(username = %req.username))]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<Value>, ApiError> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();
    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("all fields required".into()));
    }

    let cost = state.config.bcrypt_cost;
    let password = req.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| ApiError::internal("password hashing task failed", e))??;

    let user = state
        .store
        .run(move |s| s.users.create(&username, &email, &hash))
        .await?;

    info!(user_id = %user.id, "user registered");
    Ok(Json(json!({ "status": "ok", "username": user.id })))
}

/// Exchange a username or email plus password for a bearer token.
#[instrument(skip_all, fields(identifier = %req.username))]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let invalid = || ApiError::Unauthorized("invalid credentials".into());

    let identifier = req.username.trim().to_string();
    let Some(user) = state
        .store
        .run(move |s| s.users.find_by_login(&identifier))
        .await?
    else {
        return Err(invalid());
    };

    if !password_matches(req.password, user.password_hash.clone()).await? {
        return Err(invalid());
    }

    let token = state.authority.issue(&user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(json!({ "token": token, "user_id": user.id })))
}

/// Identity of the caller.
pub async fn me(AuthUser(user_id): AuthUser) -> Json<Value> {
    Json(json!({ "user_id": user_id }))
}

/// Replace the caller's password after checking the current one.
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn change_password(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    let incorrect = || ApiError::Unauthorized("incorrect old password".into());
    if req.new_password.is_empty() {
        return Err(ApiError::BadRequest("new password required".into()));
    }

    let id = user_id.clone();
    let user = match state.store.run(move |s| s.users.get(&id)).await {
        Ok(user) => user,
        Err(StoreError::UnknownUser(_)) => return Err(incorrect()),
        Err(e) => return Err(e.into()),
    };
    if !password_matches(req.old_password, user.password_hash).await? {
        return Err(incorrect());
    }

    let cost = state.config.bcrypt_cost;
    let password = req.new_password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| ApiError::internal("password hashing task failed", e))??;
    state
        .store
        .run(move |s| s.users.update_password(&user_id, &hash))
        .await?;

    info!("password updated");
    Ok(Json(json!({ "message": "password updated" })))
}

/// Change the caller's identity. Tokens name the old identity, so the client
/// has to log in again.
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn change_username(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ChangeUsernameRequest>,
) -> Result<Json<Value>, ApiError> {
    let new_username = req.new_username.trim().to_string();
    if new_username.is_empty() {
        return Err(ApiError::BadRequest("invalid request".into()));
    }

    let renamed = state
        .store
        .run(move |s| s.users.rename(&user_id, &new_username))
        .await
        .map_err(|e| match e {
            StoreError::Conflict(what) | StoreError::InvalidInput(what) => ApiError::BadRequest(what),
            other => other.into(),
        })?;

    info!(new_id = %renamed, "username updated");
    Ok(Json(json!({ "message": "username updated, please login again" })))
}

/// bcrypt comparison on the blocking pool.
async fn password_matches(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::internal("password check task failed", e))
}
