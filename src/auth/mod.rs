//! Token issuance/validation and password hashing.
//!
//! Access tokens are short-lived and carry id/email/role; refresh tokens are
//! long-lived, carry the id only, and are signed with a separate secret. The
//! currently valid refresh token is also persisted on the user record so a
//! rotated-away token cannot be replayed.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config;
use crate::models::{Role, User};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token generation failed: {0}")]
    TokenGeneration(String),

    #[error("crypto error: {0}")]
    Crypto(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub exp: i64,
    pub iat: i64,
}

fn signing_key(secret: &str) -> Result<EncodingKey, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::TokenGeneration(
            "JWT secret not configured".to_string(),
        ));
    }
    Ok(EncodingKey::from_secret(secret.as_bytes()))
}

pub fn issue_access_token(user: &User) -> Result<String, AuthError> {
    let now = Utc::now();
    let ttl = config::config().security.access_token_ttl_mins;
    let claims = AccessClaims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role,
        exp: (now + Duration::minutes(ttl)).timestamp(),
        iat: now.timestamp(),
    };
    let key = signing_key(&config::config().security.access_token_secret)?;
    encode(&Header::default(), &claims, &key)
        .map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

pub fn issue_refresh_token(user_id: Uuid) -> Result<String, AuthError> {
    let now = Utc::now();
    let ttl = config::config().security.refresh_token_ttl_days;
    let claims = RefreshClaims {
        sub: user_id,
        exp: (now + Duration::days(ttl)).timestamp(),
        iat: now.timestamp(),
    };
    let key = signing_key(&config::config().security.refresh_token_secret)?;
    encode(&Header::default(), &claims, &key)
        .map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

fn decode_claims<C: serde::de::DeserializeOwned>(token: &str, secret: &str) -> Result<C, AuthError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    decode::<C>(token, &key, &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(e.to_string()),
        })
}

pub fn decode_access_token(token: &str) -> Result<AccessClaims, AuthError> {
    decode_claims(token, &config::config().security.access_token_secret)
}

pub fn decode_refresh_token(token: &str) -> Result<RefreshClaims, AuthError> {
    decode_claims(token, &config::config().security.refresh_token_secret)
}

/// Hash a password with Argon2id into PHC string format.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Crypto(format!("hashing failed: {e}")))
}

/// Verify a plaintext password against a stored PHC-format hash. Returns
/// `Ok(false)` on mismatch; errors only on a malformed stored hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::Crypto(format!("invalid hash format: {e}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Crypto(format!("verify error: {e}"))),
    }
}
