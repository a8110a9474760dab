use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::AppError;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::domains::redemptions::Offer;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OfferView {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub title: String,
    pub terms: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub savings_amount: Decimal,
    /// `None` when the offer has no total limit.
    pub remaining: Option<i32>,
    pub daily_limit: Option<i32>,
    pub per_user_limit: Option<i32>,
}

impl From<Offer> for OfferView {
    fn from(offer: Offer) -> Self {
        Self {
            remaining: offer.remaining(),
            id: offer.id,
            merchant_id: offer.merchant_id,
            title: offer.title,
            terms: offer.terms,
            starts_at: offer.starts_at,
            ends_at: offer.ends_at,
            savings_amount: offer.savings_amount,
            daily_limit: offer.daily_limit,
            per_user_limit: offer.per_user_limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OffersResponse {
    pub ok: bool,
    pub offers: Vec<OfferView>,
}

/// GET /api/v1/offers
///
/// Offers that can be claimed right now.
pub async fn list_offers(
    State(state): State<Arc<AppState>>,
    Extension(_ctx): Extension<RequestContext>,
) -> Result<Json<OffersResponse>, AppError> {
    let offers = state.store.list_active_offers(state.clock.now()).await?;

    Ok(Json(OffersResponse {
        ok: true,
        offers: offers.into_iter().map(OfferView::from).collect(),
    }))
}
