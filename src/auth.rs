//! Token service: issues and verifies signed, time-limited credentials.
//!
//! Tokens are HS256 JWTs carrying `{sub, iat, exp}`. Verification is stateless;
//! nothing is stored server-side and tokens are never revoked before expiry.

use crate::config::AuthConfig;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signing algorithm for every token
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

const BEARER_PREFIX: &str = "Bearer ";

/// Credential rejection reasons.
///
/// All three map to 401; the distinction is kept for logs.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Token is missing")]
    Missing,

    #[error("Token is invalid")]
    Invalid,

    #[error("Token has expired")]
    Expired,
}

impl AuthError {
    /// Short label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Missing => "missing",
            AuthError::Invalid => "invalid",
            AuthError::Expired => "expired",
        }
    }
}

/// Token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Principal the token was issued to
    pub sub: String,
    /// Issue time, unix seconds
    pub iat: i64,
    /// Expiry, unix seconds; valid strictly before this instant
    pub exp: i64,
}

/// Issues and verifies tokens with one process-wide secret
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_secs: i64,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        let mut validation = Validation::new(TOKEN_ALGORITHM);
        // Expiry is checked against our own clock in `verify_at`.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl_secs,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.jwt_secret.as_bytes(), config.token_ttl_secs)
    }

    /// Token lifetime in seconds
    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Issue a token for `subject` expiring `ttl_secs` from now
    pub fn issue(&self, subject: &str) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(subject, Utc::now().timestamp())
    }

    /// Issue a token as if the current time were `now` (unix seconds)
    pub fn issue_at(&self, subject: &str, now: i64) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::new(TOKEN_ALGORITHM), &claims, &self.encoding_key)
    }

    /// Check signature and expiry against the current time
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Check signature and expiry against `now` (unix seconds)
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            }
        })?;

        if now >= data.claims.exp {
            return Err(AuthError::Expired);
        }

        Ok(data.claims)
    }

    /// Verify the raw `Authorization` header value.
    ///
    /// An absent or empty header is [`AuthError::Missing`]. The `Bearer ` prefix
    /// is stripped when present; a bare token is accepted as-is.
    pub fn verify_header(&self, header: Option<&str>) -> Result<Claims, AuthError> {
        let token = bearer_token(header)?;
        self.verify(token)
    }
}

/// Pull the token out of an `Authorization` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    match header {
        None | Some("") => Err(AuthError::Missing),
        Some(value) => Ok(value.strip_prefix(BEARER_PREFIX).unwrap_or(value)),
    }
}

/// The single username/password pair accepted by `/login`
#[derive(Clone)]
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.username.clone(), config.password.clone())
    }

    /// Exact comparison of both fields; callers learn only match or no match
    pub fn matches(&self, username: Option<&str>, password: Option<&str>) -> bool {
        username == Some(self.username.as_str()) && password == Some(self.password.as_str())
    }
}
