//! Composition-root state shared across handlers. Every field is an `Arc`,
//! so cloning `AppState` per request is cheap (axum's `State` extractor
//! requires `Clone`).

use std::sync::Arc;

use crate::{
    cache::Cache, config::GatewayConfig, db::DbPool, log_pipeline::LogPipeline,
    providers::ProviderDispatch, services::keys::KeyService, auth::jwt::SessionTokens,
    log_pipeline::SearchSink,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub cache: Arc<dyn Cache>,
    pub key_service: Arc<KeyService>,
    pub log_pipeline: Arc<LogPipeline>,
    pub dispatch: Arc<ProviderDispatch>,
    pub search: Arc<SearchSink>,
    pub sessions: Arc<SessionTokens>,
    pub config: Arc<GatewayConfig>,
}
