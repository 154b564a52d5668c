//! Binary entrypoint: CLI parsing, composition root, graceful shutdown.

use std::{sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use lumina::{
    auth::jwt::SessionTokens,
    cache::{Cache, redis::RedisCache},
    config::GatewayConfig,
    crypto::MasterKey,
    db::DbPool,
    log_pipeline::{LogPipeline, SearchSink},
    providers::ProviderDispatch,
    routes,
    services::keys::KeyService,
    state::AppState,
};

#[derive(Parser)]
#[command(name = "lumina", about = "Reverse-proxying gateway for LLM providers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway server.
    Serve {
        #[arg(long)]
        port: Option<u16>,
        /// Load and validate configuration, then exit without binding a socket.
        #[arg(long)]
        config_check: bool,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { port, config_check } => {
            let mut config = GatewayConfig::from_env().expect("invalid configuration");
            if let Some(port) = port {
                config.port = port;
            }
            if config_check {
                tracing::info!("configuration valid");
                return;
            }
            serve(config).await;
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();
}

async fn serve(config: GatewayConfig) {
    let config = Arc::new(config);

    let db = Arc::new(
        DbPool::from_config(&config.database)
            .await
            .expect("failed to connect to database"),
    );
    db.run_migrations().await.expect("failed to run migrations");

    let cache: Arc<dyn Cache> = Arc::new(
        RedisCache::connect(&config.redis_url)
            .await
            .expect("failed to connect to redis"),
    );
    let master_key = MasterKey::from_bytes(&config.encryption_key).expect("invalid master key");
    let key_service = Arc::new(KeyService::new(&db, cache.clone(), master_key));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_client_timeout_secs))
        .build()
        .expect("failed to build http client");
    let dispatch = Arc::new(ProviderDispatch::new(http.clone(), Duration::from_secs(config.http_client_timeout_secs)));
    let search = Arc::new(SearchSink::new(http, config.opensearch_url.clone()));
    let log_pipeline = Arc::new(LogPipeline::start(search.clone()).await);
    let sessions = Arc::new(SessionTokens::new(&config.jwt_secret));

    let state = AppState {
        db: db.clone(),
        cache,
        key_service,
        log_pipeline: log_pipeline.clone(),
        dispatch,
        search,
        sessions,
        config: config.clone(),
    };

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .expect("failed to bind listener");
    tracing::info!(port = config.port, "lumina listening");

    // In-flight requests get a 30-second grace period to complete after the
    // shutdown signal before the process forces an exit.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });

    tokio::select! {
        result = server => result.expect("server error"),
        _ = async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received, draining in-flight requests");
            let _ = shutdown_tx.send(());
            tokio::time::sleep(Duration::from_secs(30)).await;
        } => {
            tracing::warn!("graceful shutdown grace period elapsed, forcing exit");
        }
    }

    // Server has stopped accepting new connections; let the log pipeline
    // perform its final flush before exit.
    match Arc::try_unwrap(log_pipeline) {
        Ok(pipeline) => pipeline.shutdown().await,
        Err(_) => tracing::warn!("log pipeline still has outstanding references at shutdown, skipping final flush"),
    }
}
