use anyhow::Result;
use dealdrop::{create_app_router, init_tracing, shutdown_signal, state::AppState, tasks::start_claim_sweeper};
use shared::Config;
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.app.log_level);

    info!(
        environment = %config.app.environment,
        claim_ttl_seconds = config.redemption.claim_ttl_seconds,
        entitlement_policy = ?config.redemption.entitlement_policy,
        daily_limit_tz = %config.redemption.daily_limit_tz,
        "Starting dealdrop API"
    );

    let port = config.server.port;
    let sweep_cron = config.redemption.sweep_cron.clone();
    let app_state = Arc::new(AppState::new(config).await?);
    info!("🚀 Application state initialized");

    let mut sweeper = start_claim_sweeper(app_state.store.clone(), app_state.clock.clone(), &sweep_cron).await?;

    let app = create_app_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = sweeper.shutdown().await {
        tracing::warn!("Claim sweeper did not stop cleanly: {}", e);
    }
    Ok(())
}
