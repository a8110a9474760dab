// ============================================================================
// POSTGRES STORE TESTS - need a live database
// ============================================================================
//
// Run with: DATABASE_URL=postgres://... cargo test --test pg_store_tests -- --ignored

use chrono::{DateTime, Duration, Utc};
use dealdrop::domains::redemptions::codes::{generate_manual_code, generate_token, hash_token};
use dealdrop::domains::redemptions::pg_store::connect;
use dealdrop::domains::redemptions::{
    day_window, Claim, ClaimLookup, ClaimStatus, EntryMethod, LimitScope, PgStore, RedeemRequest,
    RedemptionError, RedemptionStore,
};
use rust_decimal::Decimal;
use shared::config::DatabaseConfig;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

// ========================================================================
// HELPERS
// ========================================================================

async fn setup_test_db() -> PgPool {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
    let config = DatabaseConfig {
        url: Some(database_url.clone()),
        max_connections: 20,
        min_connections: 1,
        acquire_timeout_seconds: 10,
        seed_file: None,
    };
    connect(&config, &database_url)
        .await
        .expect("Failed to connect to test database")
}

struct Seeded {
    merchant_id: Uuid,
    offer_id: Uuid,
}

async fn create_test_offer(db: &PgPool, total_limit: Option<i32>) -> Seeded {
    let merchant_id = Uuid::new_v4();
    let offer_id = Uuid::new_v4();

    sqlx::query("INSERT INTO merchants (id, name, pin) VALUES ($1, $2, $3)")
        .bind(merchant_id)
        .bind("Test Merchant")
        .bind("1234")
        .execute(db)
        .await
        .expect("Failed to create test merchant");

    sqlx::query(
        r#"
        INSERT INTO offers (id, merchant_id, title, starts_at, savings_amount, total_limit)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(offer_id)
    .bind(merchant_id)
    .bind("Test Offer")
    .bind(Utc::now() - Duration::days(1))
    .bind(Decimal::new(500, 2))
    .bind(total_limit)
    .execute(db)
    .await
    .expect("Failed to create test offer");

    Seeded { merchant_id, offer_id }
}

async fn cleanup_test_data(db: &PgPool, seeded: &Seeded) {
    let _ = sqlx::query("DELETE FROM redemptions WHERE offer_id = $1")
        .bind(seeded.offer_id)
        .execute(db)
        .await;
    let _ = sqlx::query("DELETE FROM claims WHERE offer_id = $1")
        .bind(seeded.offer_id)
        .execute(db)
        .await;
    let _ = sqlx::query("DELETE FROM offers WHERE id = $1")
        .bind(seeded.offer_id)
        .execute(db)
        .await;
    let _ = sqlx::query("DELETE FROM merchants WHERE id = $1")
        .bind(seeded.merchant_id)
        .execute(db)
        .await;
}

fn new_claim(offer_id: Uuid, user_id: Uuid, issued_at: DateTime<Utc>) -> (Claim, String) {
    let token = generate_token();
    let claim = Claim {
        id: Uuid::new_v4(),
        offer_id,
        user_id,
        token_hash: hash_token(&token),
        manual_code: generate_manual_code(),
        issued_at,
        expires_at: issued_at + Duration::seconds(120),
        status: ClaimStatus::Issued,
        consumed_at: None,
    };
    (claim, token)
}

fn redeem_request(merchant_id: Uuid, token: &str, now: DateTime<Utc>) -> RedeemRequest {
    let (day_start, day_end) = day_window(now, chrono_tz::UTC);
    RedeemRequest {
        lookup: ClaimLookup::TokenHash(hash_token(token)),
        merchant_id,
        entry: EntryMethod::Qr,
        now,
        day_start,
        day_end,
    }
}

// ========================================================================
// REDEEM
// ========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_concurrent_redeems_commit_once() {
    let db = setup_test_db().await;
    let seeded = create_test_offer(&db, None).await;
    let store = Arc::new(PgStore::new(db.clone()));
    let now = Utc::now();

    let (claim, token) = new_claim(seeded.offer_id, Uuid::new_v4(), now);
    store.insert_claim(&claim).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        let request = redeem_request(seeded.merchant_id, &token, now);
        handles.push(tokio::spawn(async move { store.redeem(&request).await }));
    }

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => assert_eq!(e, RedemptionError::AlreadyUsed),
        }
    }
    assert_eq!(ok, 1);

    let offer = store.get_offer(seeded.offer_id).await.unwrap().unwrap();
    assert_eq!(offer.redeemed_count, 1);
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM redemptions WHERE claim_id = $1")
        .bind(claim.id)
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(rows, 1);

    cleanup_test_data(&db, &seeded).await;
}

#[tokio::test]
#[ignore]
async fn test_replay_is_already_used() {
    let db = setup_test_db().await;
    let seeded = create_test_offer(&db, None).await;
    let store = PgStore::new(db.clone());
    let now = Utc::now();

    let (claim, token) = new_claim(seeded.offer_id, Uuid::new_v4(), now);
    store.insert_claim(&claim).await.unwrap();

    let redemption = store.redeem(&redeem_request(seeded.merchant_id, &token, now)).await.unwrap();
    assert_eq!(redemption.claim_id, claim.id);

    let later = now + Duration::seconds(5);
    let err = store.redeem(&redeem_request(seeded.merchant_id, &token, later)).await.unwrap_err();
    assert_eq!(err, RedemptionError::AlreadyUsed);

    let stored = store.get_claim(claim.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ClaimStatus::Redeemed);

    cleanup_test_data(&db, &seeded).await;
}

#[tokio::test]
#[ignore]
async fn test_expired_claim_is_persisted_as_expired() {
    let db = setup_test_db().await;
    let seeded = create_test_offer(&db, None).await;
    let store = PgStore::new(db.clone());
    let issued_at = Utc::now() - Duration::minutes(10);

    let (claim, token) = new_claim(seeded.offer_id, Uuid::new_v4(), issued_at);
    store.insert_claim(&claim).await.unwrap();

    let err = store
        .redeem(&redeem_request(seeded.merchant_id, &token, Utc::now()))
        .await
        .unwrap_err();
    assert_eq!(err, RedemptionError::Expired);

    let stored = store.get_claim(claim.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ClaimStatus::Expired);
    let offer = store.get_offer(seeded.offer_id).await.unwrap().unwrap();
    assert_eq!(offer.redeemed_count, 0);

    cleanup_test_data(&db, &seeded).await;
}

#[tokio::test]
#[ignore]
async fn test_total_limit_is_enforced_under_lock() {
    let db = setup_test_db().await;
    let seeded = create_test_offer(&db, Some(1)).await;
    let store = PgStore::new(db.clone());
    let now = Utc::now();

    let (first, first_token) = new_claim(seeded.offer_id, Uuid::new_v4(), now);
    let (second, second_token) = new_claim(seeded.offer_id, Uuid::new_v4(), now);
    store.insert_claim(&first).await.unwrap();
    store.insert_claim(&second).await.unwrap();

    store
        .redeem(&redeem_request(seeded.merchant_id, &first_token, now))
        .await
        .unwrap();
    let err = store
        .redeem(&redeem_request(seeded.merchant_id, &second_token, now))
        .await
        .unwrap_err();
    assert_eq!(err, RedemptionError::LimitReached { scope: LimitScope::Total, limit: 1 });

    let offer = store.get_offer(seeded.offer_id).await.unwrap().unwrap();
    assert_eq!(offer.redeemed_count, 1);
    let untouched = store.get_claim(second.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, ClaimStatus::Issued);

    cleanup_test_data(&db, &seeded).await;
}

// ========================================================================
// ISSUANCE
// ========================================================================

#[tokio::test]
#[ignore]
async fn test_manual_code_collision_rolls_back_supersede() {
    let db = setup_test_db().await;
    let seeded = create_test_offer(&db, None).await;
    let store = PgStore::new(db.clone());
    let now = Utc::now();

    let (holder, _) = new_claim(seeded.offer_id, Uuid::new_v4(), now);
    store.insert_claim(&holder).await.unwrap();

    let other_user = Uuid::new_v4();
    let (prior, _) = new_claim(seeded.offer_id, other_user, now);
    store.insert_claim(&prior).await.unwrap();

    let (mut colliding, _) = new_claim(seeded.offer_id, other_user, now + Duration::seconds(1));
    colliding.manual_code = holder.manual_code.clone();
    let err = store.insert_claim(&colliding).await.unwrap_err();
    assert_eq!(err, RedemptionError::ManualCodeTaken);

    assert!(store.get_claim(colliding.id).await.unwrap().is_none());
    let prior = store.get_claim(prior.id).await.unwrap().unwrap();
    assert_eq!(prior.status, ClaimStatus::Issued, "supersede must roll back with the failed insert");

    cleanup_test_data(&db, &seeded).await;
}

#[tokio::test]
#[ignore]
async fn test_new_claim_supersedes_previous_one() {
    let db = setup_test_db().await;
    let seeded = create_test_offer(&db, None).await;
    let store = PgStore::new(db.clone());
    let now = Utc::now();
    let user = Uuid::new_v4();

    let (first, _) = new_claim(seeded.offer_id, user, now);
    store.insert_claim(&first).await.unwrap();
    let (second, _) = new_claim(seeded.offer_id, user, now + Duration::seconds(1));
    store.insert_claim(&second).await.unwrap();

    assert_eq!(store.get_claim(first.id).await.unwrap().unwrap().status, ClaimStatus::Expired);
    assert_eq!(store.get_claim(second.id).await.unwrap().unwrap().status, ClaimStatus::Issued);

    cleanup_test_data(&db, &seeded).await;
}
