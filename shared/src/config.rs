//! Configuration management for the dealdrop services

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Shortest and longest claim lifetime.
pub const MIN_CLAIM_TTL_SECONDS: i64 = 120;
pub const MAX_CLAIM_TTL_SECONDS: i64 = 300;

/// Signing secret used when `JWT_SECRET` is unset. Refused in production.
pub const DEV_JWT_SECRET: &str = "dealdrop-dev-secret-change-me";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub redemption: RedemptionConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub counter_port: u16,
    pub max_request_size_mb: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `None` runs the service on the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    /// JSON fixture loaded into the in-memory store.
    #[serde(default)]
    pub seed_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionConfig {
    pub claim_ttl_seconds: i64,
    pub entitlement_policy: EntitlementPolicy,
    /// IANA zone used to cut the per-offer daily window.
    pub daily_limit_tz: String,
    pub landing_base_url: String,
    pub sweep_cron: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub log_level: String,
}

/// Who may request a claim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementPolicy {
    /// Every authenticated consumer.
    #[default]
    Open,
    /// Only profiles on the paid plan.
    Paid,
}

impl FromStr for EntitlementPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "unconditional" => Ok(EntitlementPolicy::Open),
            "paid" | "plan" => Ok(EntitlementPolicy::Paid),
            other => Err(anyhow::anyhow!("unknown ENTITLEMENT_POLICY: {}", other)),
        }
    }
}

impl Default for RedemptionConfig {
    fn default() -> Self {
        Self {
            claim_ttl_seconds: 120,
            entitlement_policy: EntitlementPolicy::Open,
            daily_limit_tz: "UTC".to_string(),
            landing_base_url: "https://dealdrop.local".to_string(),
            sweep_cron: "0 * * * * *".to_string(),
        }
    }
}

impl RedemptionConfig {
    pub fn daily_limit_tz(&self) -> chrono_tz::Tz {
        self.daily_limit_tz.parse().unwrap_or(chrono_tz::UTC)
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let claim_ttl_seconds: i64 = env::var("CLAIM_TTL_SECONDS")
            .unwrap_or_else(|_| "120".to_string())
            .parse()?;
        let claim_ttl_seconds = claim_ttl_seconds.clamp(MIN_CLAIM_TTL_SECONDS, MAX_CLAIM_TTL_SECONDS);

        let daily_limit_tz = env::var("DAILY_LIMIT_TZ").unwrap_or_else(|_| "UTC".to_string());
        daily_limit_tz
            .parse::<chrono_tz::Tz>()
            .map_err(|e| anyhow::anyhow!("invalid DAILY_LIMIT_TZ {}: {}", daily_limit_tz, e))?;

        let config = Config {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()?,
                counter_port: env::var("COUNTER_PORT")
                    .unwrap_or_else(|_| "8001".to_string())
                    .parse()?,
                max_request_size_mb: env::var("MAX_REQUEST_SIZE_MB")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok().filter(|u| !u.trim().is_empty()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
                acquire_timeout_seconds: env::var("DATABASE_ACQUIRE_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                seed_file: env::var("SEED_FILE").ok().filter(|p| !p.trim().is_empty()),
            },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET")
                    .unwrap_or_else(|_| DEV_JWT_SECRET.to_string()),
            },
            redemption: RedemptionConfig {
                claim_ttl_seconds,
                entitlement_policy: env::var("ENTITLEMENT_POLICY")
                    .unwrap_or_else(|_| "open".to_string())
                    .parse()?,
                daily_limit_tz,
                landing_base_url: env::var("LANDING_BASE_URL")
                    .unwrap_or_else(|_| "https://dealdrop.local".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                sweep_cron: env::var("SWEEP_CRON")
                    .unwrap_or_else(|_| "0 * * * * *".to_string()),
            },
            app: AppConfig {
                environment: env::var("ENVIRONMENT")
                    .unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "info".to_string()),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that are only acceptable outside production.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.is_production() && self.auth.jwt_secret == DEV_JWT_SECRET {
            anyhow::bail!("JWT_SECRET must be set when ENVIRONMENT=production");
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.app.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 8000,
                counter_port: 8001,
                max_request_size_mb: 5,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                min_connections: 1,
                acquire_timeout_seconds: 10,
                seed_file: None,
            },
            auth: AuthConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
            },
            redemption: RedemptionConfig::default(),
            app: AppConfig {
                environment: "development".to_string(),
                log_level: "info".to_string(),
            },
        }
    }
}
