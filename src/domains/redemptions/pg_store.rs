use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::config::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

use super::limits::{check_limits, LimitUsage};
use super::models::{
    Claim, ClaimLookup, ClaimStatus, Merchant, MerchantStats, Offer, Profile, RedeemRequest,
    Redemption, RedemptionError,
};
use super::store::RedemptionStore;

/// Opens the pool and applies pending migrations.
pub async fn connect(config: &DatabaseConfig, url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .connect(url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("✅ Database connected, migrations applied");
    Ok(pool)
}

const OFFER_COLUMNS: &str = "id, merchant_id, title, terms, starts_at, ends_at, savings_amount, \
     total_limit, daily_limit, per_user_limit, redeemed_count, is_active";

const CLAIM_COLUMNS: &str = "id, offer_id, user_id, token_hash, manual_code, issued_at, \
     expires_at, status, consumed_at";

const REDEMPTION_COLUMNS: &str =
    "id, claim_id, offer_id, user_id, merchant_id, redeemed_at, savings_amount, entry";

#[derive(FromRow)]
struct OfferRow {
    id: Uuid,
    merchant_id: Uuid,
    title: String,
    terms: Option<String>,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
    savings_amount: Decimal,
    total_limit: Option<i32>,
    daily_limit: Option<i32>,
    per_user_limit: Option<i32>,
    redeemed_count: i32,
    is_active: bool,
}

impl From<OfferRow> for Offer {
    fn from(row: OfferRow) -> Self {
        Offer {
            id: row.id,
            merchant_id: row.merchant_id,
            title: row.title,
            terms: row.terms,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            savings_amount: row.savings_amount,
            total_limit: row.total_limit,
            daily_limit: row.daily_limit,
            per_user_limit: row.per_user_limit,
            redeemed_count: row.redeemed_count,
            is_active: row.is_active,
        }
    }
}

#[derive(FromRow)]
struct ClaimRow {
    id: Uuid,
    offer_id: Uuid,
    user_id: Uuid,
    token_hash: String,
    manual_code: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: String,
    consumed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ClaimRow> for Claim {
    type Error = RedemptionError;

    fn try_from(row: ClaimRow) -> Result<Self, Self::Error> {
        Ok(Claim {
            id: row.id,
            offer_id: row.offer_id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            manual_code: row.manual_code,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            status: row.status.parse()?,
            consumed_at: row.consumed_at,
        })
    }
}

#[derive(FromRow)]
struct RedemptionRow {
    id: Uuid,
    claim_id: Uuid,
    offer_id: Uuid,
    user_id: Uuid,
    merchant_id: Uuid,
    redeemed_at: DateTime<Utc>,
    savings_amount: Decimal,
    entry: String,
}

impl TryFrom<RedemptionRow> for Redemption {
    type Error = RedemptionError;

    fn try_from(row: RedemptionRow) -> Result<Self, Self::Error> {
        Ok(Redemption {
            id: row.id,
            claim_id: row.claim_id,
            offer_id: row.offer_id,
            user_id: row.user_id,
            merchant_id: row.merchant_id,
            redeemed_at: row.redeemed_at,
            savings_amount: row.savings_amount,
            entry: row.entry.parse()?,
        })
    }
}

#[derive(FromRow)]
struct MerchantRow {
    id: Uuid,
    name: String,
    town_id: Option<Uuid>,
    pin: String,
    is_active: bool,
}

#[derive(FromRow)]
struct ProfileRow {
    user_id: Uuid,
    role: String,
    merchant_id: Option<Uuid>,
    plan: String,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = RedemptionError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Profile {
            user_id: row.user_id,
            role: row.role.parse().map_err(RedemptionError::Store)?,
            merchant_id: row.merchant_id,
            plan: row.plan.parse().map_err(RedemptionError::Store)?,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

/// Postgres-backed store. `redeem` runs in one transaction holding row
/// locks on the claim and its offer.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn lock_claim(
        tx: &mut Transaction<'_, Postgres>,
        lookup: &ClaimLookup,
    ) -> Result<Option<Claim>, RedemptionError> {
        let row: Option<ClaimRow> = match lookup {
            ClaimLookup::TokenHash(hash) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM claims WHERE token_hash = $1 FOR UPDATE",
                    CLAIM_COLUMNS
                ))
                .bind(hash)
                .fetch_optional(&mut **tx)
                .await?
            }
            ClaimLookup::ManualCode(code) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM claims WHERE manual_code = $1 \
                     ORDER BY issued_at DESC LIMIT 1 FOR UPDATE",
                    CLAIM_COLUMNS
                ))
                .bind(code)
                .fetch_optional(&mut **tx)
                .await?
            }
        };
        row.map(Claim::try_from).transpose()
    }

    async fn usage_in(
        tx: &mut Transaction<'_, Postgres>,
        offer: &Offer,
        user_id: Uuid,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<LimitUsage, RedemptionError> {
        let (today, by_user): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE redeemed_at >= $2 AND redeemed_at < $3),
                COUNT(*) FILTER (WHERE user_id = $4)
            FROM redemptions
            WHERE offer_id = $1
            "#,
        )
        .bind(offer.id)
        .bind(day_start)
        .bind(day_end)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(LimitUsage {
            total: offer.redeemed_count as i64,
            today,
            by_user,
        })
    }
}

#[async_trait]
impl RedemptionStore for PgStore {
    async fn get_offer(&self, offer_id: Uuid) -> Result<Option<Offer>, RedemptionError> {
        let row: Option<OfferRow> =
            sqlx::query_as(&format!("SELECT {} FROM offers WHERE id = $1", OFFER_COLUMNS))
                .bind(offer_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(row.map(Offer::from))
    }

    async fn list_active_offers(&self, now: DateTime<Utc>) -> Result<Vec<Offer>, RedemptionError> {
        let rows: Vec<OfferRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM offers
            WHERE is_active = TRUE
              AND starts_at <= $1
              AND (ends_at IS NULL OR ends_at > $1)
            ORDER BY starts_at DESC
            "#,
            OFFER_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Offer::from).collect())
    }

    async fn set_offer_active(&self, offer_id: Uuid, is_active: bool) -> Result<Offer, RedemptionError> {
        let row: Option<OfferRow> = sqlx::query_as(&format!(
            "UPDATE offers SET is_active = $2 WHERE id = $1 RETURNING {}",
            OFFER_COLUMNS
        ))
        .bind(offer_id)
        .bind(is_active)
        .fetch_optional(&self.db)
        .await?;
        row.map(Offer::from).ok_or(RedemptionError::OfferNotFound)
    }

    async fn get_merchant(&self, merchant_id: Uuid) -> Result<Option<Merchant>, RedemptionError> {
        let row: Option<MerchantRow> = sqlx::query_as(
            "SELECT id, name, town_id, pin, is_active FROM merchants WHERE id = $1",
        )
        .bind(merchant_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(|r| Merchant {
            id: r.id,
            name: r.name,
            town_id: r.town_id,
            pin: r.pin,
            is_active: r.is_active,
        }))
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, RedemptionError> {
        let row: Option<ProfileRow> = sqlx::query_as(
            "SELECT user_id, role, merchant_id, plan FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Profile::try_from).transpose()
    }

    async fn limit_usage(
        &self,
        offer_id: Uuid,
        user_id: Uuid,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<LimitUsage, RedemptionError> {
        let (total, today, by_user): (i32, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                o.redeemed_count,
                (SELECT COUNT(*) FROM redemptions r
                  WHERE r.offer_id = o.id AND r.redeemed_at >= $3 AND r.redeemed_at < $4),
                (SELECT COUNT(*) FROM redemptions r
                  WHERE r.offer_id = o.id AND r.user_id = $2)
            FROM offers o
            WHERE o.id = $1
            "#,
        )
        .bind(offer_id)
        .bind(user_id)
        .bind(day_start)
        .bind(day_end)
        .fetch_optional(&self.db)
        .await?
        .ok_or(RedemptionError::OfferNotFound)?;

        Ok(LimitUsage {
            total: total as i64,
            today,
            by_user,
        })
    }

    async fn insert_claim(&self, claim: &Claim) -> Result<(), RedemptionError> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE claims SET status = 'expired'
            WHERE user_id = $1 AND offer_id = $2 AND status = 'issued'
            "#,
        )
        .bind(claim.user_id)
        .bind(claim.offer_id)
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO claims (
                id, offer_id, user_id, token_hash, manual_code,
                issued_at, expires_at, status, consumed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(claim.id)
        .bind(claim.offer_id)
        .bind(claim.user_id)
        .bind(&claim.token_hash)
        .bind(&claim.manual_code)
        .bind(claim.issued_at)
        .bind(claim.expires_at)
        .bind(claim.status.as_str())
        .bind(claim.consumed_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            // Dropping the transaction rolls back the supersede as well.
            Err(e) if is_unique_violation(&e) => Err(RedemptionError::ManualCodeTaken),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_claim(&self, claim_id: Uuid) -> Result<Option<Claim>, RedemptionError> {
        let row: Option<ClaimRow> =
            sqlx::query_as(&format!("SELECT {} FROM claims WHERE id = $1", CLAIM_COLUMNS))
                .bind(claim_id)
                .fetch_optional(&self.db)
                .await?;
        row.map(Claim::try_from).transpose()
    }

    async fn redeem(&self, request: &RedeemRequest) -> Result<Redemption, RedemptionError> {
        let mut tx = self.db.begin().await?;

        let claim = Self::lock_claim(&mut tx, &request.lookup)
            .await?
            .ok_or(RedemptionError::ClaimNotFound)?;

        let offer: Offer = sqlx::query_as::<_, OfferRow>(&format!(
            "SELECT {} FROM offers WHERE id = $1 FOR UPDATE",
            OFFER_COLUMNS
        ))
        .bind(claim.offer_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Offer::from)
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
            sqlx::query("UPDATE claims SET status = 'expired' WHERE id = $1 AND status = 'issued'")
                .bind(claim.id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Err(RedemptionError::Expired);
        }

        if !offer.is_currently_active(request.now) {
            return Err(RedemptionError::OfferInactive);
        }

        let usage = Self::usage_in(&mut tx, &offer, claim.user_id, request.day_start, request.day_end).await?;
        check_limits(&offer, &usage)?;

        let consumed = sqlx::query(
            r#"
            UPDATE claims SET status = 'redeemed', consumed_at = $2
            WHERE id = $1 AND status = 'issued'
            "#,
        )
        .bind(claim.id)
        .bind(request.now)
        .execute(&mut *tx)
        .await?;

        if consumed.rows_affected() != 1 {
            return Err(RedemptionError::AlreadyUsed);
        }

        let row: RedemptionRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO redemptions (
                id, claim_id, offer_id, user_id, merchant_id, redeemed_at, savings_amount, entry
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            REDEMPTION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(claim.id)
        .bind(offer.id)
        .bind(claim.user_id)
        .bind(offer.merchant_id)
        .bind(request.now)
        .bind(offer.savings_amount)
        .bind(request.entry.as_str())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE offers SET redeemed_count = redeemed_count + 1 WHERE id = $1")
            .bind(offer.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Redemption::try_from(row)
    }

    async fn expire_stale_claims(&self, now: DateTime<Utc>) -> Result<u64, RedemptionError> {
        let result = sqlx::query(
            "UPDATE claims SET status = 'expired' WHERE status = 'issued' AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_user_redemptions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Redemption>, RedemptionError> {
        let rows: Vec<RedemptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM redemptions WHERE user_id = $1 ORDER BY redeemed_at DESC LIMIT $2",
            REDEMPTION_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Redemption::try_from).collect()
    }

    async fn list_merchant_redemptions(
        &self,
        merchant_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Redemption>, RedemptionError> {
        let rows: Vec<RedemptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM redemptions WHERE merchant_id = $1 ORDER BY redeemed_at DESC LIMIT $2",
            REDEMPTION_COLUMNS
        ))
        .bind(merchant_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Redemption::try_from).collect()
    }

    async fn merchant_stats(
        &self,
        merchant_id: Uuid,
        now: DateTime<Utc>,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<MerchantStats, RedemptionError> {
        let (total_redemptions, today_redemptions, total_savings): (i64, i64, Decimal) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE redeemed_at >= $2 AND redeemed_at < $3),
                    COALESCE(SUM(savings_amount), 0)
                FROM redemptions
                WHERE merchant_id = $1
                "#,
            )
            .bind(merchant_id)
            .bind(day_start)
            .bind(day_end)
            .fetch_one(&self.db)
            .await?;

        let active_offers: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM offers
            WHERE merchant_id = $1
              AND is_active = TRUE
              AND starts_at <= $2
              AND (ends_at IS NULL OR ends_at > $2)
            "#,
        )
        .bind(merchant_id)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        Ok(MerchantStats {
            total_redemptions,
            today_redemptions,
            total_savings,
            active_offers,
        })
    }
}
