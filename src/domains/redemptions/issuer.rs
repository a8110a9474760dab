use chrono::Duration;
use shared::config::{RedemptionConfig, MAX_CLAIM_TTL_SECONDS, MIN_CLAIM_TTL_SECONDS};
use shared::{EntitlementPolicy, Plan};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::codes::{generate_manual_code, generate_token, hash_token};
use super::limits::{check_limits, day_window};
use super::models::{Claim, ClaimStatus, IssuedClaim, RedemptionError};
use super::store::RedemptionStore;
use crate::context::RequestContext;
use crate::observability::metrics::record_claim_issued;

/// Attempts at finding a free manual code before giving up.
const MAX_CODE_ATTEMPTS: usize = 5;

/// Creates claims for consumers.
pub struct TokenIssuer {
    store: Arc<dyn RedemptionStore>,
    clock: Arc<dyn Clock>,
    config: RedemptionConfig,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn RedemptionStore>, clock: Arc<dyn Clock>, config: RedemptionConfig) -> Self {
        Self { store, clock, config }
    }

    /// Claim lifetime, held to the 2 to 5 minute window whatever the config says.
    pub fn ttl(&self) -> Duration {
        Duration::seconds(
            self.config
                .claim_ttl_seconds
                .clamp(MIN_CLAIM_TTL_SECONDS, MAX_CLAIM_TTL_SECONDS),
        )
    }

    /// Issues a claim on `offer_id` for the calling user.
    pub async fn issue(&self, ctx: &RequestContext, offer_id: Uuid) -> Result<IssuedClaim, RedemptionError> {
        let result = self.try_issue(ctx, offer_id).await;
        match &result {
            Ok(issued) => {
                record_claim_issued("issued");
                info!(
                    claim_id = %issued.claim.id,
                    offer_id = %offer_id,
                    user_id = %ctx.user_id,
                    expires_at = %issued.claim.expires_at,
                    "Claim issued"
                );
            }
            Err(RedemptionError::Store(e)) => {
                record_claim_issued("store_error");
                tracing::error!(offer_id = %offer_id, "Claim issuance failed: {}", e);
            }
            Err(e) => {
                record_claim_issued(e.reason());
                warn!(offer_id = %offer_id, user_id = %ctx.user_id, reason = e.reason(), "Claim refused");
            }
        }
        result
    }

    async fn try_issue(&self, ctx: &RequestContext, offer_id: Uuid) -> Result<IssuedClaim, RedemptionError> {
        let now = self.clock.now();

        let offer = self
            .store
            .get_offer(offer_id)
            .await?
            .ok_or(RedemptionError::OfferNotFound)?;

        if !offer.is_currently_active(now) {
            return Err(RedemptionError::OfferInactive);
        }

        if self.config.entitlement_policy == EntitlementPolicy::Paid {
            let plan = self
                .store
                .get_profile(ctx.user_id)
                .await?
                .map(|p| p.plan)
                .unwrap_or_default();
            if plan != Plan::Paid {
                return Err(RedemptionError::NotEntitled);
            }
        }

        let (day_start, day_end) = day_window(now, self.config.daily_limit_tz());
        let usage = self
            .store
            .limit_usage(offer.id, ctx.user_id, day_start, day_end)
            .await?;
        check_limits(&offer, &usage)?;

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let token = generate_token();
            let claim = Claim {
                id: Uuid::new_v4(),
                offer_id: offer.id,
                user_id: ctx.user_id,
                token_hash: hash_token(&token),
                manual_code: generate_manual_code(),
                issued_at: now,
                expires_at: now + self.ttl(),
                status: ClaimStatus::Issued,
                consumed_at: None,
            };

            match self.store.insert_claim(&claim).await {
                Ok(()) => return Ok(IssuedClaim { claim, token }),
                Err(RedemptionError::ManualCodeTaken) => {
                    warn!(attempt, "Manual code collision, regenerating");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(RedemptionError::Store(
            "could not allocate a unique manual code".to_string(),
        ))
    }
}
