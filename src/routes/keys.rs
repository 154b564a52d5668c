//! `/api/keys`. Virtual-key lifecycle management for the authenticated
//! dashboard user.

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::VirtualKey,
    routes::auth::authenticate,
    services::keys::{CreateKeyRequest, UpdateKeyPatch},
    state::AppState,
};

#[derive(Deserialize)]
pub struct CreateKeyBody {
    pub name: String,
    #[serde(default)]
    pub allowed_models: Vec<String>,
    pub budget_cap: Option<f64>,
}

#[derive(Serialize)]
pub struct CreatedKeyBody {
    pub id: Uuid,
    pub name: String,
    pub allowed_models: Vec<String>,
    pub token: String,
}

#[derive(Serialize)]
pub struct KeyBody {
    pub id: Uuid,
    pub name: String,
    pub allowed_models: Vec<String>,
    pub budget_cap: Option<f64>,
    pub current_spend: f64,
    pub revoked: bool,
}

impl From<VirtualKey> for KeyBody {
    fn from(k: VirtualKey) -> Self {
        Self {
            id: k.id,
            name: k.name,
            allowed_models: k.allowed_models,
            budget_cap: k.budget_cap,
            current_spend: k.current_spend,
            revoked: k.revoked_at.is_some(),
        }
    }
}

#[derive(Deserialize, Default)]
pub struct UpdateKeyBody {
    pub name: Option<String>,
    pub allowed_models: Option<Vec<String>>,
    pub budget_cap: Option<Option<f64>>,
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateKeyBody>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = authenticate(&state, &headers).await?;
    let created = state
        .key_service
        .create_key(
            claims.user_id,
            CreateKeyRequest { name: body.name, allowed_models: body.allowed_models, budget_cap: body.budget_cap },
            CancellationToken::new(),
        )
        .await?;
    Ok(Json(CreatedKeyBody {
        id: created.id,
        name: created.name,
        allowed_models: created.allowed_models,
        token: created.token,
    }))
}

pub async fn list(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    let claims = authenticate(&state, &headers).await?;
    let keys = state
        .db
        .virtual_keys()
        .list_virtual_keys_by_user(claims.user_id, CancellationToken::new())
        .await?;
    Ok(Json(keys.into_iter().map(KeyBody::from).collect::<Vec<_>>()))
}

pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = authenticate(&state, &headers).await?;
    let key = state
        .db
        .virtual_keys()
        .get_virtual_key_by_id(id, CancellationToken::new())
        .await?
        .ok_or(ApiError::NotFound)?;
    if key.user_id != claims.user_id {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(KeyBody::from(key)))
}

pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateKeyBody>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = authenticate(&state, &headers).await?;
    state
        .key_service
        .update_key(
            id,
            claims.user_id,
            UpdateKeyPatch { name: body.name, allowed_models: body.allowed_models, budget_cap: body.budget_cap },
            CancellationToken::new(),
        )
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = authenticate(&state, &headers).await?;
    state.key_service.revoke_key(id, claims.user_id, CancellationToken::new()).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
