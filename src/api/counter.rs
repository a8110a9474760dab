// ============================================================================
// COUNTER ENDPOINTS - merchant staff scanning and reporting
// ============================================================================

use axum::{
    body::Bytes,
    extract::State,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use shared::{AppError, Role};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::api::claims::{HistoryQuery, RedemptionsResponse};
use crate::api::extract::{AppJson, AppPath, AppQuery};
use crate::api::offers::OfferView;
use crate::context::RequestContext;
use crate::domains::redemptions::{day_window, MerchantStats, Redemption, RedemptionError, ScanSession, ScanState};
use crate::state::AppState;

/// Either the text read from the QR code or the typed manual code.
#[derive(Debug, Deserialize, Validate)]
pub struct RedeemBody {
    #[validate(length(min = 1, max = 512))]
    pub payload: Option<String>,
    #[validate(length(min = 1, max = 16))]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub ok: bool,
    pub redemption: Redemption,
    pub trace: Vec<ScanState>,
}

impl RedeemResponse {
    fn from_session(session: ScanSession) -> Result<Self, AppError> {
        let redemption = session.outcome()?;
        Ok(Self {
            ok: true,
            redemption,
            trace: session.trace().to_vec(),
        })
    }
}

/// POST /api/v1/counter/redeem
///
/// # Request Body
/// ```json
/// { "payload": "https://deals.example.com/r/<token>" }
/// ```
/// or
/// ```json
/// { "code": "K7MPX" }
/// ```
///
/// # Returns
/// - 200 OK with the redemption
/// - 403 when the code belongs to another merchant
/// - 404 when no claim matches
/// - 409 when already used or a limit is reached
/// - 410 when the code has expired
pub async fn redeem(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    AppJson(body): AppJson<RedeemBody>,
) -> Result<Json<RedeemResponse>, AppError> {
    body.validate()?;
    let merchant = state.validator.resolve_merchant(&ctx).await?;

    let session = match (body.payload.as_deref(), body.code.as_deref()) {
        (Some(payload), None) => state.scanner.scan_payload(merchant.id, payload).await,
        (None, Some(code)) => state.scanner.enter_code(merchant.id, code).await,
        _ => return Err(AppError::validation("Send either `payload` or `code`")),
    };

    Ok(Json(RedeemResponse::from_session(session)?))
}

/// POST /api/v1/counter/scan-image
///
/// Raw PNG or JPEG camera frame; decoded server-side.
pub async fn scan_image(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<Json<RedeemResponse>, AppError> {
    if body.is_empty() {
        return Err(AppError::validation("Image body is empty"));
    }
    let merchant = state.validator.resolve_merchant(&ctx).await?;
    let session = state.scanner.scan_image(merchant.id, &body).await;
    Ok(Json(RedeemResponse::from_session(session)?))
}

/// GET /api/v1/counter/redemptions
pub async fn list_redemptions(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    AppQuery(query): AppQuery<HistoryQuery>,
) -> Result<Json<RedemptionsResponse>, AppError> {
    let merchant = state.validator.resolve_merchant(&ctx).await?;
    let redemptions = state
        .store
        .list_merchant_redemptions(merchant.id, query.limit())
        .await?;
    Ok(Json(RedemptionsResponse {
        ok: true,
        redemptions,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub ok: bool,
    pub merchant_id: Uuid,
    pub merchant_name: String,
    pub stats: MerchantStats,
}

/// GET /api/v1/counter/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<StatsResponse>, AppError> {
    let merchant = state.validator.resolve_merchant(&ctx).await?;
    let now = state.clock.now();
    let (day_start, day_end) = day_window(now, state.config.redemption.daily_limit_tz());

    let stats = state
        .store
        .merchant_stats(merchant.id, now, day_start, day_end)
        .await?;

    Ok(Json(StatsResponse {
        ok: true,
        merchant_id: merchant.id,
        merchant_name: merchant.name,
        stats,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ToggleOfferBody {
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct ToggleOfferResponse {
    pub ok: bool,
    pub offer: OfferView,
}

/// PATCH /api/v1/counter/offers/:offer_id
///
/// Turns an offer on or off. Merchants may only toggle their own offers.
pub async fn toggle_offer(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    AppPath(offer_id): AppPath<Uuid>,
    AppJson(body): AppJson<ToggleOfferBody>,
) -> Result<Json<ToggleOfferResponse>, AppError> {
    let offer = state
        .store
        .get_offer(offer_id)
        .await?
        .ok_or(RedemptionError::OfferNotFound)?;

    if ctx.role != Role::Admin {
        let merchant = state.validator.resolve_merchant(&ctx).await?;
        if offer.merchant_id != merchant.id {
            return Err(RedemptionError::WrongMerchant.into());
        }
    }

    let offer = state.store.set_offer_active(offer_id, body.is_active).await?;
    info!(offer_id = %offer.id, is_active = offer.is_active, user_id = %ctx.user_id, "Offer toggled");

    Ok(Json(ToggleOfferResponse {
        ok: true,
        offer: offer.into(),
    }))
}
