use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use super::limits::{check_limits, LimitUsage};
use super::models::{
    Claim, ClaimLookup, ClaimStatus, Merchant, MerchantStats, Offer, Profile, RedeemRequest,
    Redemption, RedemptionError,
};
use super::store::RedemptionStore;

/// Fixture data for running without a database.
#[derive(Debug, Default, Deserialize)]
pub struct MemorySeed {
    #[serde(default)]
    pub merchants: Vec<Merchant>,
    #[serde(default)]
    pub offers: Vec<Offer>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

#[derive(Default)]
struct Inner {
    offers: HashMap<Uuid, Offer>,
    merchants: HashMap<Uuid, Merchant>,
    profiles: HashMap<Uuid, Profile>,
    claims: HashMap<Uuid, Claim>,
    token_index: HashMap<String, Uuid>,
    redemptions: Vec<Redemption>,
}

impl Inner {
    fn find_claim_id(&self, lookup: &ClaimLookup) -> Option<Uuid> {
        match lookup {
            ClaimLookup::TokenHash(hash) => self.token_index.get(hash).copied(),
            // Codes are reused once a claim is closed; the newest holder wins.
            ClaimLookup::ManualCode(code) => self
                .claims
                .values()
                .filter(|c| &c.manual_code == code)
                .max_by_key(|c| c.issued_at)
                .map(|c| c.id),
        }
    }

    fn usage(&self, offer: &Offer, user_id: Uuid, day_start: DateTime<Utc>, day_end: DateTime<Utc>) -> LimitUsage {
        let of_offer = self.redemptions.iter().filter(|r| r.offer_id == offer.id);
        let mut usage = LimitUsage {
            total: offer.redeemed_count as i64,
            ..Default::default()
        };
        for r in of_offer {
            if r.redeemed_at >= day_start && r.redeemed_at < day_end {
                usage.today += 1;
            }
            if r.user_id == user_id {
                usage.by_user += 1;
            }
        }
        usage
    }
}

/// Store kept in process memory.
///
/// Every operation runs inside one mutex critical section with no await
/// point, which makes `redeem` a plain compare-and-set.
///
/// Claims are never pruned and lookups scan every claim, so memory and
/// lookup cost grow with each issuance. Meant for tests, seeded demos and
/// local runs, not long-running deployments.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: MemorySeed) -> Self {
        let store = Self::new();
        for merchant in seed.merchants {
            store.insert_merchant(merchant);
        }
        for offer in seed.offers {
            store.insert_offer(offer);
        }
        for profile in seed.profiles {
            store.insert_profile(profile);
        }
        store
    }

    pub fn load_seed_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let seed: MemorySeed = serde_json::from_str(&raw)?;
        tracing::info!(
            merchants = seed.merchants.len(),
            offers = seed.offers.len(),
            profiles = seed.profiles.len(),
            "Loaded in-memory seed from {}",
            path.as_ref().display()
        );
        Ok(Self::from_seed(seed))
    }

    pub fn insert_offer(&self, offer: Offer) {
        self.inner.lock().offers.insert(offer.id, offer);
    }

    pub fn insert_merchant(&self, merchant: Merchant) {
        self.inner.lock().merchants.insert(merchant.id, merchant);
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.inner.lock().profiles.insert(profile.user_id, profile);
    }

    pub fn redemption_count(&self) -> usize {
        self.inner.lock().redemptions.len()
    }
}

#[async_trait]
impl RedemptionStore for MemoryStore {
    async fn get_offer(&self, offer_id: Uuid) -> Result<Option<Offer>, RedemptionError> {
        Ok(self.inner.lock().offers.get(&offer_id).cloned())
    }

    async fn list_active_offers(&self, now: DateTime<Utc>) -> Result<Vec<Offer>, RedemptionError> {
        let inner = self.inner.lock();
        let mut offers: Vec<Offer> = inner
            .offers
            .values()
            .filter(|o| o.is_currently_active(now))
            .cloned()
            .collect();
        offers.sort_by(|a, b| b.starts_at.cmp(&a.starts_at));
        Ok(offers)
    }

    async fn set_offer_active(&self, offer_id: Uuid, is_active: bool) -> Result<Offer, RedemptionError> {
        let mut inner = self.inner.lock();
        let offer = inner
            .offers
            .get_mut(&offer_id)
            .ok_or(RedemptionError::OfferNotFound)?;
        offer.is_active = is_active;
        Ok(offer.clone())
    }

    async fn get_merchant(&self, merchant_id: Uuid) -> Result<Option<Merchant>, RedemptionError> {
        Ok(self.inner.lock().merchants.get(&merchant_id).cloned())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, RedemptionError> {
        Ok(self.inner.lock().profiles.get(&user_id).cloned())
    }

    async fn limit_usage(
        &self,
        offer_id: Uuid,
        user_id: Uuid,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<LimitUsage, RedemptionError> {
        let inner = self.inner.lock();
        let offer = inner.offers.get(&offer_id).ok_or(RedemptionError::OfferNotFound)?;
        Ok(inner.usage(offer, user_id, day_start, day_end))
    }

    async fn insert_claim(&self, claim: &Claim) -> Result<(), RedemptionError> {
        let mut inner = self.inner.lock();

        let code_taken = inner.claims.values().any(|c| {
            c.status == ClaimStatus::Issued
                && c.manual_code == claim.manual_code
                && !(c.user_id == claim.user_id && c.offer_id == claim.offer_id)
        });
        if code_taken {
            return Err(RedemptionError::ManualCodeTaken);
        }

        for held in inner.claims.values_mut() {
            if held.user_id == claim.user_id
                && held.offer_id == claim.offer_id
                && held.status == ClaimStatus::Issued
            {
                held.status = ClaimStatus::Expired;
            }
        }

        inner.token_index.insert(claim.token_hash.clone(), claim.id);
        inner.claims.insert(claim.id, claim.clone());
        Ok(())
    }

    async fn get_claim(&self, claim_id: Uuid) -> Result<Option<Claim>, RedemptionError> {
        Ok(self.inner.lock().claims.get(&claim_id).cloned())
    }

    async fn redeem(&self, request: &RedeemRequest) -> Result<Redemption, RedemptionError> {
        let mut inner = self.inner.lock();

        let claim_id = inner
            .find_claim_id(&request.lookup)
            .ok_or(RedemptionError::ClaimNotFound)?;
        let claim = inner
            .claims
            .get(&claim_id)
            .cloned()
            .ok_or(RedemptionError::ClaimNotFound)?;
        let offer = inner
            .offers
            .get(&claim.offer_id)
            .cloned()
            .ok_or(RedemptionError::OfferNotFound)?;

        if offer.merchant_id != request.merchant_id {
            return Err(RedemptionError::WrongMerchant);
        }

        match claim.status {
            ClaimStatus::Redeemed => return Err(RedemptionError::AlreadyUsed),
            ClaimStatus::Expired => return Err(RedemptionError::Expired),
            ClaimStatus::Issued => {}
        }

        if claim.is_expired_at(request.now) {
            if let Some(stale) = inner.claims.get_mut(&claim_id) {
                stale.status = ClaimStatus::Expired;
            }
            return Err(RedemptionError::Expired);
        }

        if !offer.is_currently_active(request.now) {
            return Err(RedemptionError::OfferInactive);
        }

        let usage = inner.usage(&offer, claim.user_id, request.day_start, request.day_end);
        check_limits(&offer, &usage)?;

        let redemption = Redemption {
            id: Uuid::new_v4(),
            claim_id,
            offer_id: offer.id,
            user_id: claim.user_id,
            merchant_id: offer.merchant_id,
            redeemed_at: request.now,
            savings_amount: offer.savings_amount,
            entry: request.entry,
        };

        if let Some(consumed) = inner.claims.get_mut(&claim_id) {
            consumed.status = ClaimStatus::Redeemed;
            consumed.consumed_at = Some(request.now);
        }
        if let Some(counted) = inner.offers.get_mut(&offer.id) {
            counted.redeemed_count += 1;
        }
        inner.redemptions.push(redemption.clone());

        Ok(redemption)
    }

    async fn expire_stale_claims(&self, now: DateTime<Utc>) -> Result<u64, RedemptionError> {
        let mut inner = self.inner.lock();
        let mut expired = 0;
        for claim in inner.claims.values_mut() {
            if claim.status == ClaimStatus::Issued && claim.is_expired_at(now) {
                claim.status = ClaimStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn list_user_redemptions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Redemption>, RedemptionError> {
        let inner = self.inner.lock();
        Ok(inner
            .redemptions
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_merchant_redemptions(
        &self,
        merchant_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Redemption>, RedemptionError> {
        let inner = self.inner.lock();
        Ok(inner
            .redemptions
            .iter()
            .rev()
            .filter(|r| r.merchant_id == merchant_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn merchant_stats(
        &self,
        merchant_id: Uuid,
        now: DateTime<Utc>,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<MerchantStats, RedemptionError> {
        let inner = self.inner.lock();
        let mut stats = MerchantStats {
            total_savings: Decimal::ZERO,
            ..Default::default()
        };
        for r in inner.redemptions.iter().filter(|r| r.merchant_id == merchant_id) {
            stats.total_redemptions += 1;
            stats.total_savings += r.savings_amount;
            if r.redeemed_at >= day_start && r.redeemed_at < day_end {
                stats.today_redemptions += 1;
            }
        }
        stats.active_offers = inner
            .offers
            .values()
            .filter(|o| o.merchant_id == merchant_id && o.is_currently_active(now))
            .count() as i64;
        Ok(stats)
    }
}
