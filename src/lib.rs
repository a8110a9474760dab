use axum::{extract::DefaultBodyLimit, middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::compression::{predicate::SizeAbove, CompressionLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod api;
pub mod context;
pub mod domains;
pub mod middleware;
pub mod observability;
pub mod security;
pub mod state;
pub mod tasks;

use api::{counter_router, create_api_router, health};
use observability::{metrics_handler, metrics_middleware};
use security::{get_cors_layer, security_headers_middleware};
use state::AppState;

/// Router for the consumer-facing service: every endpoint.
pub fn create_app_router(app_state: Arc<AppState>) -> Router {
    let body_limit = app_state.config.server.max_request_size_mb * 1024 * 1024;
    let cors = get_cors_layer(
        &app_state.config.redemption.landing_base_url,
        app_state.config.is_development(),
    );

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .merge(create_api_router(app_state.clone()))
        .with_state(app_state)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CompressionLayer::new()
                .gzip(true)
                .deflate(true)
                .compress_when(SizeAbove::new(1024)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum_middleware::from_fn(security_headers_middleware))
}

/// Router for the counter service: scanning and merchant reporting only.
pub fn create_counter_router(app_state: Arc<AppState>) -> Router {
    let body_limit = app_state.config.server.max_request_size_mb * 1024 * 1024;

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .nest("/api/v1/counter", counter_router(app_state.clone()))
        .with_state(app_state)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(security_headers_middleware))
}

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over
/// `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Signal received, starting graceful shutdown");
}
