use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::limits::LimitUsage;
use super::models::{
    Claim, Merchant, MerchantStats, Offer, Profile, RedeemRequest, Redemption, RedemptionError,
};

/// Data layer behind the redemption flow.
///
/// `redeem` is the single atomic check-and-consume: implementations must
/// guarantee that two concurrent calls resolving to the same claim cannot
/// both succeed.
#[async_trait]
pub trait RedemptionStore: Send + Sync {
    async fn get_offer(&self, offer_id: Uuid) -> Result<Option<Offer>, RedemptionError>;

    async fn list_active_offers(&self, now: DateTime<Utc>) -> Result<Vec<Offer>, RedemptionError>;

    async fn set_offer_active(&self, offer_id: Uuid, is_active: bool) -> Result<Offer, RedemptionError>;

    async fn get_merchant(&self, merchant_id: Uuid) -> Result<Option<Merchant>, RedemptionError>;

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, RedemptionError>;

    /// Counters for the issuance pre-check.
    async fn limit_usage(
        &self,
        offer_id: Uuid,
        user_id: Uuid,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<LimitUsage, RedemptionError>;

    /// Persists a new claim and expires any claim the same user still holds
    /// for the same offer. Fails with `ManualCodeTaken` when another issued
    /// claim already uses the manual code.
    async fn insert_claim(&self, claim: &Claim) -> Result<(), RedemptionError>;

    async fn get_claim(&self, claim_id: Uuid) -> Result<Option<Claim>, RedemptionError>;

    /// Atomically validates and consumes a claim, writing exactly one
    /// redemption. A claim found past its expiry is marked expired before
    /// the error is returned.
    async fn redeem(&self, request: &RedeemRequest) -> Result<Redemption, RedemptionError>;

    /// Marks issued claims past their expiry as expired. Returns how many
    /// claims changed.
    async fn expire_stale_claims(&self, now: DateTime<Utc>) -> Result<u64, RedemptionError>;

    async fn list_user_redemptions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Redemption>, RedemptionError>;

    async fn list_merchant_redemptions(
        &self,
        merchant_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Redemption>, RedemptionError>;

    async fn merchant_stats(
        &self,
        merchant_id: Uuid,
        now: DateTime<Utc>,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<MerchantStats, RedemptionError>;
}
