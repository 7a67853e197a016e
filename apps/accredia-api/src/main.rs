//! accredia-api: HTTP service for accreditation submissions.
//!
//! Connects to PostgreSQL, applies migrations and serves the accreditation
//! routes until Ctrl+C or SIGTERM.

mod config;
mod logging;
mod submitter;

use accredia_api_accreditation::{
    accreditation_router, AccreditationEngine, AccreditationState, PgAccreditationStore,
};
use accredia_db::{run_migrations, DbPool};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        port = config.port,
        env = %config.app_env,
        max_batch_rows = config.engine.max_batch_rows,
        identity_chunk_size = config.engine.identity_chunk_size,
        "Starting accredia API"
    );

    let pool = match DbPool::connect_with(&config.database_url, config.db_max_connections).await
    {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("Failed to connect to database: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_migrations(&pool).await {
        tracing::error!("Failed to run migrations: {e}");
        std::process::exit(1);
    }

    let store = Arc::new(PgAccreditationStore::new(pool.inner().clone()));
    let engine = Arc::new(AccreditationEngine::with_backend(store, config.engine));
    let app = build_router(engine);

    let addr: SocketAddr = match config.bind_addr().parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("Invalid bind address '{}': {e}", config.bind_addr());
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to address {addr}: {e}");
            std::process::exit(1);
        }
    };

    info!(%addr, "Server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    pool.inner().close().await;
    info!("Server shutdown complete");
}

fn build_router(engine: Arc<AccreditationEngine>) -> Router {
    accreditation_router(AccreditationState::new(engine))
        .layer(axum::middleware::from_fn(submitter::submitter_middleware))
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
