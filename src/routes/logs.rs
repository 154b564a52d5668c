//! `/api/logs`: search and single-entry lookup against the log
//! pipeline's search backend.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, routes::auth::authenticate, state::AppState};

const MAX_PAGE_SIZE: u32 = 100;

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub model: Option<String>,
    pub status: Option<u16>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Serialize)]
pub struct SearchResponse<T> {
    total: u64,
    page: u32,
    size: u32,
    results: Vec<T>,
}

pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authenticate(&state, &headers).await?;

    let page = query.page.unwrap_or(0);
    let size = query.size.unwrap_or(20).min(MAX_PAGE_SIZE);
    let offset = page * size;

    let (entries, total) = state
        .search
        .search(
            query.q.as_deref(),
            query.model.as_deref(),
            query.status,
            query.start,
            query.end,
            offset,
            size,
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(SearchResponse { total, page, size, results: entries }))
}

pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(trace_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    authenticate(&state, &headers).await?;
    let entry = state
        .search
        .get_log(trace_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(entry))
}
