//! Access tokens minted by the managed auth provider
//!
//! The services never sign users in; they only verify bearer tokens and read
//! the caller's identity from them.

use crate::{error::AppError, types::Role, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid, // Subject (user ID)
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<Uuid>,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(jwt_secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
        }
    }

    /// Mint an access token. Used by tooling and tests; production tokens
    /// come from the auth provider with the same secret.
    pub fn issue(
        &self,
        user_id: Uuid,
        role: Role,
        merchant_id: Option<Uuid>,
        ttl: Duration,
    ) -> Result<String> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user_id,
            role,
            merchant_id,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to sign access token: {}", e)))
    }

    /// Validate and decode a token
    pub fn validate(&self, token: &str) -> Result<AccessClaims> {
        let validation = Validation::new(JWT_ALGORITHM);

        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::authentication("Your session has expired. Please sign in again.")
                }
                _ => AppError::authentication("Could not validate credentials"),
            })
    }
}
