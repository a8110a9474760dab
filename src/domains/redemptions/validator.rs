use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::codes::hash_token;
use super::limits::day_window;
use super::models::{ClaimLookup, Merchant, RedeemRequest, Redemption, RedemptionError, ScanInput};
use super::store::RedemptionStore;
use crate::context::RequestContext;
use crate::observability::metrics::record_validation;

/// Counter-side validation: resolves the scanning merchant and runs the
/// store's atomic redeem.
pub struct Validator {
    store: Arc<dyn RedemptionStore>,
    clock: Arc<dyn Clock>,
    tz: Tz,
}

impl Validator {
    pub fn new(store: Arc<dyn RedemptionStore>, clock: Arc<dyn Clock>, tz: Tz) -> Self {
        Self { store, clock, tz }
    }

    /// The active merchant the caller acts for, taken from the token claim
    /// or, failing that, from the caller's profile.
    pub async fn resolve_merchant(&self, ctx: &RequestContext) -> Result<Merchant, RedemptionError> {
        let merchant_id = match ctx.merchant_id {
            Some(id) => Some(id),
            None => self
                .store
                .get_profile(ctx.user_id)
                .await?
                .and_then(|p| p.merchant_id),
        };

        let merchant_id = merchant_id.ok_or(RedemptionError::MerchantNotLinked)?;
        match self.store.get_merchant(merchant_id).await? {
            Some(merchant) if merchant.is_active => Ok(merchant),
            _ => Err(RedemptionError::MerchantNotLinked),
        }
    }

    pub async fn redeem(&self, ctx: &RequestContext, input: ScanInput) -> Result<Redemption, RedemptionError> {
        let merchant = self.resolve_merchant(ctx).await?;
        self.redeem_for_merchant(merchant.id, input).await
    }

    pub async fn redeem_for_merchant(
        &self,
        merchant_id: Uuid,
        input: ScanInput,
    ) -> Result<Redemption, RedemptionError> {
        let started = Instant::now();
        let entry = input.entry();
        let lookup = match input {
            ScanInput::Token(token) => ClaimLookup::TokenHash(hash_token(&token)),
            ScanInput::ManualCode(code) => ClaimLookup::ManualCode(code),
        };

        let now = self.clock.now();
        let (day_start, day_end) = day_window(now, self.tz);
        let request = RedeemRequest {
            lookup,
            merchant_id,
            entry,
            now,
            day_start,
            day_end,
        };

        let result = self.store.redeem(&request).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(redemption) => {
                record_validation("redeemed", entry.as_str(), elapsed);
                info!(
                    claim_id = %redemption.claim_id,
                    offer_id = %redemption.offer_id,
                    merchant_id = %merchant_id,
                    entry = entry.as_str(),
                    "Claim redeemed"
                );
            }
            Err(RedemptionError::Store(e)) => {
                record_validation("store_error", entry.as_str(), elapsed);
                error!(merchant_id = %merchant_id, "Redemption failed in store: {}", e);
            }
            Err(e) => {
                record_validation(e.reason(), entry.as_str(), elapsed);
                warn!(merchant_id = %merchant_id, entry = entry.as_str(), reason = e.reason(), "Scan rejected");
            }
        }

        result
    }
}
