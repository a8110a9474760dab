// ============================================================================
// HTTP API - consumer and counter endpoints
// ============================================================================

pub mod claims;
pub mod counter;
pub mod errors;
pub mod extract;
pub mod offers;

use axum::{
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::middleware::{extract_context, require_staff};
use crate::state::AppState;

/// Consumer routes: any authenticated caller.
pub fn consumer_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/offers", get(offers::list_offers))
        .route("/offers/:offer_id/claims", post(claims::issue_claim))
        .route("/claims/:claim_id", get(claims::get_claim))
        .route("/claims/:claim_id/qr.png", get(claims::claim_qr_png))
        .route("/me/redemptions", get(claims::my_redemptions))
        .layer(from_fn_with_state(state, extract_context))
}

/// Counter routes: merchant staff and admins.
pub fn counter_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/redeem", post(counter::redeem))
        .route("/scan-image", post(counter::scan_image))
        .route("/redemptions", get(counter::list_redemptions))
        .route("/stats", get(counter::stats))
        .route("/offers/:offer_id", patch(counter::toggle_offer))
        .layer(from_fn(require_staff))
        .layer(from_fn_with_state(state, extract_context))
}

/// Both route groups under `/api/v1`.
pub fn create_api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api/v1",
        consumer_router(state.clone()).nest("/counter", counter_router(state)),
    )
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let store = if state.config.database.url.is_some() {
        "postgres"
    } else {
        "memory"
    };
    Json(json!({
        "ok": true,
        "status": "healthy",
        "store": store,
        "environment": state.config.app.environment,
    }))
}
