// ============================================================================
// DEALDROP COUNTER SERVER - scanning service for merchant staff
// ============================================================================
// Serves only the counter endpoints:
// - POST  /api/v1/counter/redeem
// - POST  /api/v1/counter/scan-image
// - GET   /api/v1/counter/redemptions
// - GET   /api/v1/counter/stats
// - PATCH /api/v1/counter/offers/:offer_id
// ============================================================================

use anyhow::Result;
use dealdrop::{create_counter_router, init_tracing, shutdown_signal, state::AppState};
use shared::Config;
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.app.log_level);

    let port = config.server.counter_port;
    let app_state = Arc::new(AppState::new(config).await?);
    let app = create_counter_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("🏪 Counter server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
