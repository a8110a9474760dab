//! Models for the deal redemption flow

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{Plan, Role};
use std::str::FromStr;
use uuid::Uuid;

// ======================================================================
// OFFERS
// ======================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub terms: Option<String>,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    pub savings_amount: Decimal,
    #[serde(default)]
    pub total_limit: Option<i32>,
    #[serde(default)]
    pub daily_limit: Option<i32>,
    #[serde(default)]
    pub per_user_limit: Option<i32>,
    #[serde(default)]
    pub redeemed_count: i32,
    pub is_active: bool,
}

impl Offer {
    /// Toggled on and inside its active window.
    pub fn is_currently_active(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.starts_at <= now && self.ends_at.map_or(true, |end| now < end)
    }

    /// Redemptions left before the total limit, `None` when unlimited.
    pub fn remaining(&self) -> Option<i32> {
        self.total_limit
            .map(|limit| (limit - self.redeemed_count).max(0))
    }
}

// ======================================================================
// CLAIMS
// ======================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Issued,
    Redeemed,
    Expired,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issued => "issued",
            Self::Redeemed => "redeemed",
            Self::Expired => "expired",
        }
    }
}

impl FromStr for ClaimStatus {
    type Err = RedemptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issued" => Ok(Self::Issued),
            "redeemed" => Ok(Self::Redeemed),
            "expired" => Ok(Self::Expired),
            other => Err(RedemptionError::Store(format!("unknown claim status: {}", other))),
        }
    }
}

/// Time-limited permission for one user to redeem one offer once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 of the bearer token; the token itself is never stored.
    #[serde(skip_serializing, default)]
    pub token_hash: String,
    pub manual_code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ClaimStatus,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl Claim {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Still redeemable at `now`.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ClaimStatus::Issued && !self.is_expired_at(now)
    }

    /// Status as the holder should see it; an issued claim past its expiry
    /// reads as expired even before the sweeper persists it.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ClaimStatus {
        match self.status {
            ClaimStatus::Issued if self.is_expired_at(now) => ClaimStatus::Expired,
            status => status,
        }
    }
}

/// A freshly issued claim together with its bearer token. The token is
/// returned to the holder once and cannot be recovered afterwards.
#[derive(Debug, Clone)]
pub struct IssuedClaim {
    pub claim: Claim,
    pub token: String,
}

/// How the counter identified the claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanInput {
    Token(String),
    ManualCode(String),
}

impl ScanInput {
    pub fn entry(&self) -> EntryMethod {
        match self {
            ScanInput::Token(_) => EntryMethod::Qr,
            ScanInput::ManualCode(_) => EntryMethod::Manual,
        }
    }
}

/// Store-level key for a claim lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimLookup {
    TokenHash(String),
    ManualCode(String),
}

// ======================================================================
// REDEMPTIONS
// ======================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryMethod {
    Qr,
    Manual,
}

impl EntryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qr => "qr",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for EntryMethod {
    type Err = RedemptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qr" => Ok(Self::Qr),
            "manual" => Ok(Self::Manual),
            other => Err(RedemptionError::Store(format!("unknown entry method: {}", other))),
        }
    }
}

/// Permanent record of a consumed claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Redemption {
    pub id: Uuid,
    pub claim_id: Uuid,
    pub offer_id: Uuid,
    pub user_id: Uuid,
    pub merchant_id: Uuid,
    pub redeemed_at: DateTime<Utc>,
    pub savings_amount: Decimal,
    pub entry: EntryMethod,
}

/// Everything the store needs for one atomic check-and-consume.
#[derive(Debug, Clone)]
pub struct RedeemRequest {
    pub lookup: ClaimLookup,
    pub merchant_id: Uuid,
    pub entry: EntryMethod,
    pub now: DateTime<Utc>,
    /// Bounds of the current daily-limit window.
    pub day_start: DateTime<Utc>,
    pub day_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MerchantStats {
    pub total_redemptions: i64,
    pub today_redemptions: i64,
    pub total_savings: Decimal,
    pub active_offers: i64,
}

// ======================================================================
// MERCHANTS & PROFILES
// ======================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Merchant {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub town_id: Option<Uuid>,
    /// Staff identifier printed at the counter.
    pub pin: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub user_id: Uuid,
    pub role: Role,
    #[serde(default)]
    pub merchant_id: Option<Uuid>,
    #[serde(default)]
    pub plan: Plan,
}

// ======================================================================
// ERRORS
// ======================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    Total,
    Daily,
    PerUser,
}

impl std::fmt::Display for LimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitScope::Total => f.write_str("total"),
            LimitScope::Daily => f.write_str("daily"),
            LimitScope::PerUser => f.write_str("per-user"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum RedemptionError {
    #[error("Offer not found")]
    OfferNotFound,

    #[error("This offer is not active right now")]
    OfferInactive,

    #[error("Your plan does not include this offer")]
    NotEntitled,

    #[error("This offer has reached its {scope} redemption limit ({limit})")]
    LimitReached { scope: LimitScope, limit: i32 },

    #[error("Code not found")]
    ClaimNotFound,

    #[error("This code has expired")]
    Expired,

    #[error("This code was already used")]
    AlreadyUsed,

    #[error("This code belongs to a different merchant")]
    WrongMerchant,

    #[error("Your account is not linked to an active merchant")]
    MerchantNotLinked,

    #[error("Invalid code: {0}")]
    InvalidCode(String),

    #[error("No QR code could be read; enter the manual code instead")]
    DetectorUnsupported,

    #[error("Manual code already in use")]
    ManualCodeTaken,

    #[error("Store error: {0}")]
    Store(String),

    #[error("QR rendering failed: {0}")]
    Presentation(String),
}

impl RedemptionError {
    /// Stable identifier for clients and metrics labels.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::OfferNotFound => "offer_not_found",
            Self::OfferInactive => "offer_inactive",
            Self::NotEntitled => "not_entitled",
            Self::LimitReached { .. } => "limit_reached",
            Self::ClaimNotFound => "claim_not_found",
            Self::Expired => "expired",
            Self::AlreadyUsed => "already_used",
            Self::WrongMerchant => "wrong_merchant",
            Self::MerchantNotLinked => "merchant_not_linked",
            Self::InvalidCode(_) => "invalid_code",
            Self::DetectorUnsupported => "detector_unsupported",
            Self::ManualCodeTaken => "manual_code_taken",
            Self::Store(_) => "store_error",
            Self::Presentation(_) => "presentation_error",
        }
    }
}

impl From<sqlx::Error> for RedemptionError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}
