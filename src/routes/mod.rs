//! HTTP surface assembly. One router composed from the proxy's four
//! routes, the out-of-core dashboard API, and the health check.

pub mod auth;
pub mod execution;
pub mod health;
pub mod keys;
pub mod logs;
pub mod providers;
pub mod stats;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::state::AppState;

/// Bounded request body size for the proxy routes (step 3: "Read body
/// (bounded)"). 10 MiB comfortably covers chat/completions/embeddings
/// payloads without letting a client exhaust memory.
const MAX_PROXY_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let proxy = Router::new()
        .route("/v1/chat/completions", post(execution::chat_completions))
        .route("/v1/completions", post(execution::completions))
        .route("/v1/embeddings", post(execution::embeddings))
        .route("/anthropic/v1/messages", post(execution::anthropic_messages))
        .layer(RequestBodyLimitLayer::new(MAX_PROXY_BODY_BYTES));

    let dashboard = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/keys", post(keys::create).get(keys::list))
        .route(
            "/api/keys/{id}",
            get(keys::get).put(keys::update).delete(keys::delete),
        )
        .route("/api/providers", get(providers::list).post(providers::set))
        .route("/api/providers/{provider}", delete(providers::remove))
        .route("/api/stats/overview", get(stats::overview))
        .route("/api/stats/daily", get(stats::daily))
        .route("/api/logs", get(logs::search))
        .route("/api/logs/{trace_id}", get(logs::get));

    Router::new()
        .route("/health", get(health::health))
        .merge(proxy)
        .merge(dashboard)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
