//! # JWT bearer tokens
//!
//! HS256 implementation of `AuthProvider`. Tokens carry the account id, an
//! expiry and an optional token version.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use domains::{AppError, AuthProvider, Identity, Result, UserId};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub id: String,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

pub struct JwtAuthProvider {
    secret: SecretString,
    validation: Validation,
}

impl JwtAuthProvider {
    pub fn new(secret: SecretString) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self { secret, validation }
    }

    /// Signs a token for `user` that expires after `ttl`.
    pub fn issue(&self, user: &UserId, ttl: Duration) -> Result<String> {
        let claims = Claims {
            id: user.0.clone(),
            exp: (Utc::now() + ttl).timestamp(),
            version: None,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(|e| AppError::Unauthorized(format!("could not sign token: {e}")))
    }
}

#[async_trait]
impl AuthProvider for JwtAuthProvider {
    async fn verify_credential(&self, token: &str) -> Result<Identity> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token);
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &self.validation,
        )
        .map_err(|e| {
            debug!(error = %e, "token rejected");
            AppError::Unauthorized("invalid or expired token".into())
        })?;
        if data.claims.id.trim().is_empty() {
            return Err(AppError::Unauthorized("token has no account id".into()));
        }
        Ok(Identity {
            user_id: UserId(data.claims.id),
        })
    }
}
