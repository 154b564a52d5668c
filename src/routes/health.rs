//! `GET /health`: liveness plus a best-effort reachability check of the two
//! external stores the proxy path depends on.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    db: &'static str,
    cache: &'static str,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state.db.ping().await;
    let cache_ok = state.cache.get_key_config("__health__").await.is_ok();

    let body = HealthBody {
        status: if db_ok && cache_ok { "ok" } else { "degraded" },
        db: if db_ok { "ok" } else { "down" },
        cache: if cache_ok { "ok" } else { "down" },
    };
    let status = if db_ok && cache_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body))
}
