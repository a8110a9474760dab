// ============================================================================
// REDEMPTION FLOW TESTS - issuance through counter validation
// ============================================================================

use chrono::{Duration, TimeZone, Utc};
use dealdrop::context::RequestContext;
use dealdrop::domains::redemptions::{
    ClaimStatus, Clock, EntryMethod, IssuedClaim, LimitScope, ManualClock, MemoryStore, Merchant, Offer,
    RedemptionError, RedemptionStore, ScanInput, TokenIssuer, Validator,
};
use rust_decimal::Decimal;
use shared::config::RedemptionConfig;
use std::sync::Arc;
use uuid::Uuid;

// ========================================================================
// HELPERS
// ========================================================================

struct Fixture {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    issuer: TokenIssuer,
    validator: Arc<Validator>,
    merchant: Merchant,
    offer: Offer,
}

impl Fixture {
    fn new() -> Self {
        Self::with(RedemptionConfig::default(), |_| {})
    }

    fn with(config: RedemptionConfig, tweak: impl FnOnce(&mut Offer)) -> Self {
        let start = Utc.with_ymd_and_hms(2026, 5, 4, 15, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryStore::new());

        let merchant = Merchant {
            id: Uuid::new_v4(),
            name: "Corner Cafe".to_string(),
            town_id: Some(Uuid::new_v4()),
            pin: "4821".to_string(),
            is_active: true,
        };
        let mut offer = Offer {
            id: Uuid::new_v4(),
            merchant_id: merchant.id,
            title: "Free pastry with any coffee".to_string(),
            terms: None,
            starts_at: start - Duration::days(7),
            ends_at: Some(start + Duration::days(30)),
            savings_amount: Decimal::new(275, 2),
            total_limit: None,
            daily_limit: None,
            per_user_limit: None,
            redeemed_count: 0,
            is_active: true,
        };
        tweak(&mut offer);

        store.insert_merchant(merchant.clone());
        store.insert_offer(offer.clone());

        let tz = config.daily_limit_tz();
        let issuer = TokenIssuer::new(store.clone(), clock.clone(), config);
        let validator = Arc::new(Validator::new(store.clone(), clock.clone(), tz));

        Self {
            store,
            clock,
            issuer,
            validator,
            merchant,
            offer,
        }
    }

    async fn claim(&self, user_id: Uuid) -> IssuedClaim {
        self.issuer
            .issue(&RequestContext::consumer(user_id), self.offer.id)
            .await
            .expect("claim should be issued")
    }

    async fn redeem_token(&self, token: &str) -> Result<dealdrop::domains::redemptions::Redemption, RedemptionError> {
        self.validator
            .redeem_for_merchant(self.merchant.id, ScanInput::Token(token.to_string()))
            .await
    }

    async fn redeemed_count(&self) -> i32 {
        self.store
            .get_offer(self.offer.id)
            .await
            .unwrap()
            .unwrap()
            .redeemed_count
    }
}

// ========================================================================
// TTL
// ========================================================================

#[tokio::test]
async fn test_redeem_within_ttl_then_replay_is_already_used() {
    let f = Fixture::new();
    let issued = f.claim(Uuid::new_v4()).await;

    f.clock.advance(Duration::seconds(60));
    let redemption = f.redeem_token(&issued.token).await.unwrap();
    assert_eq!(redemption.claim_id, issued.claim.id);
    assert_eq!(redemption.entry, EntryMethod::Qr);
    assert_eq!(f.store.redemption_count(), 1);

    f.clock.advance(Duration::seconds(1));
    let err = f.redeem_token(&issued.token).await.unwrap_err();
    assert_eq!(err, RedemptionError::AlreadyUsed);
    assert_eq!(err.to_string(), "This code was already used");
    assert_eq!(f.store.redemption_count(), 1);
}

#[tokio::test]
async fn test_redeem_after_ttl_is_expired() {
    let f = Fixture::new();
    let issued = f.claim(Uuid::new_v4()).await;

    f.clock.advance(Duration::seconds(121));
    let err = f.redeem_token(&issued.token).await.unwrap_err();
    assert_eq!(err, RedemptionError::Expired);
    assert_eq!(err.to_string(), "This code has expired");

    assert_eq!(f.store.redemption_count(), 0);
    let stored = f.store.get_claim(issued.claim.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ClaimStatus::Expired, "expiry is persisted");
}

#[tokio::test]
async fn test_expiry_boundary_is_exclusive() {
    let f = Fixture::new();
    let issued = f.claim(Uuid::new_v4()).await;

    f.clock.advance(Duration::seconds(120));
    assert_eq!(f.redeem_token(&issued.token).await.unwrap_err(), RedemptionError::Expired);
}

#[tokio::test]
async fn test_configured_ttl_applies() {
    let config = RedemptionConfig {
        claim_ttl_seconds: 300,
        ..Default::default()
    };
    let f = Fixture::with(config, |_| {});
    let issued = f.claim(Uuid::new_v4()).await;

    assert_eq!(issued.claim.expires_at - issued.claim.issued_at, Duration::seconds(300));
    f.clock.advance(Duration::seconds(301));
    assert_eq!(f.redeem_token(&issued.token).await.unwrap_err(), RedemptionError::Expired);
}

#[tokio::test]
async fn test_short_configured_ttl_is_raised_to_two_minutes() {
    let config = RedemptionConfig {
        claim_ttl_seconds: 30,
        ..Default::default()
    };
    let f = Fixture::with(config, |_| {});
    let issued = f.claim(Uuid::new_v4()).await;

    assert_eq!(issued.claim.expires_at - issued.claim.issued_at, Duration::seconds(120));
    f.clock.advance(Duration::seconds(31));
    assert!(f.redeem_token(&issued.token).await.is_ok());
}

// ========================================================================
// AT-MOST-ONCE
// ========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redeems_succeed_exactly_once() {
    let f = Fixture::new();
    let issued = f.claim(Uuid::new_v4()).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let validator = f.validator.clone();
        let merchant_id = f.merchant.id;
        let input = if i % 2 == 0 {
            ScanInput::Token(issued.token.clone())
        } else {
            ScanInput::ManualCode(issued.claim.manual_code.clone())
        };
        handles.push(tokio::spawn(async move {
            validator.redeem_for_merchant(merchant_id, input).await
        }));
    }

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => assert_eq!(e, RedemptionError::AlreadyUsed),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(f.store.redemption_count(), 1);
    assert_eq!(f.redeemed_count().await, 1);
}

#[tokio::test]
async fn test_manual_code_and_qr_are_interchangeable() {
    let f = Fixture::new();
    let issued = f.claim(Uuid::new_v4()).await;

    let redemption = f
        .validator
        .redeem_for_merchant(
            f.merchant.id,
            ScanInput::ManualCode(issued.claim.manual_code.clone()),
        )
        .await
        .unwrap();
    assert_eq!(redemption.claim_id, issued.claim.id);
    assert_eq!(redemption.entry, EntryMethod::Manual);

    // The same claim is now consumed for the QR path too.
    assert_eq!(f.redeem_token(&issued.token).await.unwrap_err(), RedemptionError::AlreadyUsed);
}

// ========================================================================
// LIMITS
// ========================================================================

#[tokio::test]
async fn test_total_limit_stops_redemptions_and_count() {
    let f = Fixture::with(RedemptionConfig::default(), |o| o.total_limit = Some(2));

    // Three claims issued while the limit still has room.
    let first = f.claim(Uuid::new_v4()).await;
    let second = f.claim(Uuid::new_v4()).await;
    let third = f.claim(Uuid::new_v4()).await;

    f.redeem_token(&first.token).await.unwrap();
    f.redeem_token(&second.token).await.unwrap();
    assert_eq!(f.redeemed_count().await, 2);

    let err = f.redeem_token(&third.token).await.unwrap_err();
    assert_eq!(err, RedemptionError::LimitReached { scope: LimitScope::Total, limit: 2 });
    assert_eq!(f.redeemed_count().await, 2);

    let err = f
        .issuer
        .issue(&RequestContext::consumer(Uuid::new_v4()), f.offer.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RedemptionError::LimitReached { .. }));
}

#[tokio::test]
async fn test_daily_limit_resets_at_local_midnight() {
    let config = RedemptionConfig {
        daily_limit_tz: "America/Panama".to_string(),
        ..Default::default()
    };
    let f = Fixture::with(config, |o| o.daily_limit = Some(1));

    // 2026-05-04 15:00 UTC is 10:00 in Panama.
    let a = f.claim(Uuid::new_v4()).await;
    let b = f.claim(Uuid::new_v4()).await;
    f.redeem_token(&a.token).await.unwrap();

    let err = f.redeem_token(&b.token).await.unwrap_err();
    assert_eq!(err, RedemptionError::LimitReached { scope: LimitScope::Daily, limit: 1 });

    let err = f
        .issuer
        .issue(&RequestContext::consumer(Uuid::new_v4()), f.offer.id)
        .await
        .unwrap_err();
    assert_eq!(err, RedemptionError::LimitReached { scope: LimitScope::Daily, limit: 1 });

    // 05:00 UTC next day is midnight in Panama.
    f.clock.set(Utc.with_ymd_and_hms(2026, 5, 5, 5, 0, 0).unwrap());
    let c = f.claim(Uuid::new_v4()).await;
    f.redeem_token(&c.token).await.unwrap();
    assert_eq!(f.redeemed_count().await, 2);
}

#[tokio::test]
async fn test_per_user_limit_counts_only_that_user() {
    let f = Fixture::with(RedemptionConfig::default(), |o| o.per_user_limit = Some(1));
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let first = f.claim(alice).await;
    f.redeem_token(&first.token).await.unwrap();

    let err = f
        .issuer
        .issue(&RequestContext::consumer(alice), f.offer.id)
        .await
        .unwrap_err();
    assert_eq!(err, RedemptionError::LimitReached { scope: LimitScope::PerUser, limit: 1 });

    let bobs = f.claim(bob).await;
    assert!(f.redeem_token(&bobs.token).await.is_ok());
}

// ========================================================================
// OWNERSHIP & LIFECYCLE
// ========================================================================

#[tokio::test]
async fn test_superseded_claim_cannot_be_redeemed() {
    let f = Fixture::new();
    let user = Uuid::new_v4();

    let old = f.claim(user).await;
    f.clock.advance(Duration::seconds(10));
    let new = f.claim(user).await;

    assert_eq!(f.redeem_token(&old.token).await.unwrap_err(), RedemptionError::Expired);
    assert!(f.redeem_token(&new.token).await.is_ok());
}

#[tokio::test]
async fn test_other_merchant_cannot_redeem() {
    let f = Fixture::new();
    let issued = f.claim(Uuid::new_v4()).await;

    let err = f
        .validator
        .redeem_for_merchant(Uuid::new_v4(), ScanInput::Token(issued.token.clone()))
        .await
        .unwrap_err();
    assert_eq!(err, RedemptionError::WrongMerchant);

    // Still redeemable by its own merchant.
    assert!(f.redeem_token(&issued.token).await.is_ok());
}

#[tokio::test]
async fn test_deactivated_offer_rejects_open_claims() {
    let f = Fixture::new();
    let issued = f.claim(Uuid::new_v4()).await;

    f.store.set_offer_active(f.offer.id, false).await.unwrap();
    assert_eq!(f.redeem_token(&issued.token).await.unwrap_err(), RedemptionError::OfferInactive);

    let stored = f.store.get_claim(issued.claim.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ClaimStatus::Issued);
}

#[tokio::test]
async fn test_redemption_records_savings_and_merchant() {
    let f = Fixture::new();
    let user = Uuid::new_v4();
    let issued = f.claim(user).await;
    let redemption = f.redeem_token(&issued.token).await.unwrap();

    assert_eq!(redemption.user_id, user);
    assert_eq!(redemption.merchant_id, f.merchant.id);
    assert_eq!(redemption.savings_amount, Decimal::new(275, 2));
    assert_eq!(redemption.redeemed_at, f.clock.now());

    let history = f.store.list_user_redemptions(user, 10).await.unwrap();
    assert_eq!(history, vec![redemption]);
}
