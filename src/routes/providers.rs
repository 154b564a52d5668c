//! `/api/providers`. Per-user upstream credential management.

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{error::ApiError, models::ProviderKind, routes::auth::authenticate, state::AppState};

#[derive(Deserialize)]
pub struct SetProviderBody {
    pub provider: String,
    pub api_key: String,
}

#[derive(Serialize)]
pub struct ProviderBody {
    pub provider: String,
    pub configured_at: chrono::DateTime<chrono::Utc>,
}

pub async fn list(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    let claims = authenticate(&state, &headers).await?;
    let providers = state
        .db
        .providers()
        .get_user_providers(claims.user_id, CancellationToken::new())
        .await?;
    Ok(Json(
        providers
            .into_iter()
            .map(|p| ProviderBody { provider: p.provider.to_string(), configured_at: p.updated_at })
            .collect::<Vec<_>>(),
    ))
}

pub async fn set(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SetProviderBody>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = authenticate(&state, &headers).await?;
    let kind = ProviderKind::parse(&body.provider)
        .ok_or_else(|| ApiError::MalformedRequest(format!("unknown provider \"{}\"", body.provider)))?;
    state
        .key_service
        .set_user_provider(claims.user_id, kind, &body.api_key, CancellationToken::new())
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = authenticate(&state, &headers).await?;
    let kind = ProviderKind::parse(&provider)
        .ok_or_else(|| ApiError::MalformedRequest(format!("unknown provider \"{provider}\"")))?;
    state
        .key_service
        .remove_user_provider(claims.user_id, kind, CancellationToken::new())
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
