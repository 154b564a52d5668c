//! Session authentication, registration, and login for the dashboard routes.
//! Out of the proxy's core data path, but needed for `/api/*` to be callable
//! at all.

use axum::{Json, extract::State, http::HeaderMap, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    auth::{
        jwt::SessionClaims,
        password::{hash_password, verify_password},
    },
    error::ApiError,
    middleware::extract_session_token,
    state::AppState,
};

pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<SessionClaims, ApiError> {
    let token = extract_session_token(headers).ok_or(ApiError::Unauthorized)?;
    state.sessions.verify(&token).map_err(|_| ApiError::Unauthorized)
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub token: String,
}

pub async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> Result<impl IntoResponse, ApiError> {
    if req.email.is_empty() || req.password.len() < 8 {
        return Err(ApiError::MalformedRequest("email required, password must be at least 8 characters".into()));
    }
    let password_hash = hash_password(&req.password).map_err(|e| ApiError::Internal(e.to_string()))?;
    let user = state
        .db
        .users()
        .create_user(&req.email, &password_hash, CancellationToken::new())
        .await?;
    let token = state
        .sessions
        .issue(user.id, &user.email)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(SessionResponse { token }))
}

pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_user_by_email(&req.email, CancellationToken::new())
        .await?
        .ok_or(ApiError::Unauthorized)?;
    let ok = verify_password(&req.password, &user.password_hash).map_err(|e| ApiError::Internal(e.to_string()))?;
    if !ok {
        return Err(ApiError::Unauthorized);
    }
    let token = state
        .sessions
        .issue(user.id, &user.email)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(SessionResponse { token }))
}
