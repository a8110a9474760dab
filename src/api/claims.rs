use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::AppError;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::api::extract::{AppPath, AppQuery};
use crate::context::RequestContext;
use crate::domains::redemptions::codes::hash_token;
use crate::domains::redemptions::{Claim, ClaimStatus, Redemption};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ClaimView {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub manual_code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ClaimStatus,
    pub consumed_at: Option<DateTime<Utc>>,
    pub seconds_left: i64,
}

impl ClaimView {
    fn at(claim: Claim, now: DateTime<Utc>) -> Self {
        let status = claim.effective_status(now);
        let seconds_left = if status == ClaimStatus::Issued {
            (claim.expires_at - now).num_seconds().max(0)
        } else {
            0
        };
        Self {
            id: claim.id,
            offer_id: claim.offer_id,
            manual_code: claim.manual_code,
            issued_at: claim.issued_at,
            expires_at: claim.expires_at,
            status,
            consumed_at: claim.consumed_at,
            seconds_left,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct IssueClaimQuery {
    #[serde(default)]
    pub include_qr: bool,
}

#[derive(Debug, Serialize)]
pub struct IssueClaimResponse {
    pub ok: bool,
    pub claim: ClaimView,
    /// Bearer token; shown once and never stored in clear.
    pub token: String,
    pub qr_payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_png_base64: Option<String>,
}

/// POST /api/v1/offers/:offer_id/claims
///
/// # Returns
/// - 201 Created with the token, manual code and expiry
/// - 403 when the plan does not include the offer
/// - 404 when the offer does not exist
/// - 409 when a redemption limit is already reached
pub async fn issue_claim(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    AppPath(offer_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<IssueClaimQuery>,
) -> Result<(StatusCode, Json<IssueClaimResponse>), AppError> {
    let issued = state.issuer.issue(&ctx, offer_id).await?;

    // The claim is already stored; a rendering failure only drops the image.
    let qr_png_base64 = if query.include_qr {
        match state.presenter.render_base64(&issued.token) {
            Ok(png) => Some(png),
            Err(e) => {
                tracing::warn!(claim_id = %issued.claim.id, "QR rendering failed: {}", e);
                None
            }
        }
    } else {
        None
    };

    let now = state.clock.now();
    Ok((
        StatusCode::CREATED,
        Json(IssueClaimResponse {
            ok: true,
            qr_payload: state.presenter.payload(&issued.token),
            token: issued.token,
            claim: ClaimView::at(issued.claim, now),
            qr_png_base64,
        }),
    ))
}

async fn owned_claim(state: &AppState, ctx: &RequestContext, claim_id: Uuid) -> Result<Claim, AppError> {
    match state.store.get_claim(claim_id).await? {
        Some(claim) if claim.user_id == ctx.user_id => Ok(claim),
        _ => Err(AppError::not_found("claim")),
    }
}

#[derive(Debug, Serialize)]
pub struct ClaimStatusResponse {
    pub ok: bool,
    pub claim: ClaimView,
}

/// GET /api/v1/claims/:claim_id
pub async fn get_claim(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    AppPath(claim_id): AppPath<Uuid>,
) -> Result<Json<ClaimStatusResponse>, AppError> {
    let claim = owned_claim(&state, &ctx, claim_id).await?;
    Ok(Json(ClaimStatusResponse {
        ok: true,
        claim: ClaimView::at(claim, state.clock.now()),
    }))
}

#[derive(Debug, Deserialize)]
pub struct QrImageQuery {
    /// Token returned at issuance.
    pub t: String,
}

/// GET /api/v1/claims/:claim_id/qr.png?t=<token>
///
/// Only the token hash is stored, so the holder sends the token back to
/// have it rendered. Served while the claim is still open.
pub async fn claim_qr_png(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    AppPath(claim_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<QrImageQuery>,
) -> Result<Response, AppError> {
    let claim = owned_claim(&state, &ctx, claim_id).await?;

    if hash_token(query.t.trim()) != claim.token_hash {
        return Err(AppError::not_found("claim"));
    }
    if !claim.is_open_at(state.clock.now()) {
        return Err(AppError::Gone {
            message: "This code is no longer valid".to_string(),
            reason: Some(claim.effective_status(state.clock.now()).as_str()),
        });
    }

    let png = state.presenter.render_png(query.t.trim())?;
    info!(claim_id = %claim.id, "QR image served");
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

impl HistoryQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 200)
    }
}

#[derive(Debug, Serialize)]
pub struct RedemptionsResponse {
    pub ok: bool,
    pub redemptions: Vec<Redemption>,
}

/// GET /api/v1/me/redemptions
pub async fn my_redemptions(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    AppQuery(query): AppQuery<HistoryQuery>,
) -> Result<Json<RedemptionsResponse>, AppError> {
    let redemptions = state
        .store
        .list_user_redemptions(ctx.user_id, query.limit())
        .await?;
    Ok(Json(RedemptionsResponse {
        ok: true,
        redemptions,
    }))
}
