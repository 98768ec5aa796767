//! JWT token generation and validation
//!
//! This module provides the Token Issuer using the jsonwebtoken crate.
//! Tokens are signed with a server-held HMAC secret; there is no
//! server-side token store, so validity is a pure function of the signature
//! and the claims.
//!
//! A token is in exactly one of three states: valid, expired, or invalid.
//! Only expired tokens can be refreshed.

use crate::claims::{AccessClaims, TokenSubject};
use crate::error::{AuthError, AuthResult};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default token validity (7 days).
pub const DEFAULT_TOKEN_DURATION_HOURS: i64 = 168;

/// JWT configuration for token generation and validation.
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing
    pub secret: String,

    /// Algorithm to use
    pub algorithm: JwtAlgorithm,

    /// Token validity duration
    pub token_duration: Duration,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("token_duration", &self.token_duration)
            .finish()
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            algorithm: JwtAlgorithm::HS256,
            token_duration: Duration::hours(DEFAULT_TOKEN_DURATION_HOURS),
        }
    }
}

/// Supported JWT algorithms.
///
/// Only the symmetric HMAC family is supported.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JwtAlgorithm {
    /// HMAC using SHA-256
    #[default]
    HS256,
    /// HMAC using SHA-384
    HS384,
    /// HMAC using SHA-512
    HS512,
}

impl JwtAlgorithm {
    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "HS256" => Some(JwtAlgorithm::HS256),
            "HS384" => Some(JwtAlgorithm::HS384),
            "HS512" => Some(JwtAlgorithm::HS512),
            _ => None,
        }
    }
}

impl From<JwtAlgorithm> for Algorithm {
    fn from(alg: JwtAlgorithm) -> Self {
        match alg {
            JwtAlgorithm::HS256 => Algorithm::HS256,
            JwtAlgorithm::HS384 => Algorithm::HS384,
            JwtAlgorithm::HS512 => Algorithm::HS512,
        }
    }
}

/// Mint, validate and refresh bearer tokens.
///
/// Implementations must be safe for unsynchronized concurrent use.
pub trait TokenIssuer: Send + Sync {
    /// Mint a new token for the subject, valid from now.
    fn mint(&self, subject: &TokenSubject) -> AuthResult<String>;

    /// Validate a token and return its claims.
    ///
    /// Rejects tokens whose `is_active` snapshot is false even when the
    /// signature is valid.
    fn validate(&self, token: &str) -> AuthResult<AccessClaims>;

    /// Mint a fresh token carrying the same identity.
    ///
    /// Succeeds for valid tokens and for tokens whose only fault is expiry.
    fn refresh(&self, token: &str) -> AuthResult<String>;

    /// Validity window of newly minted tokens.
    fn lifetime(&self) -> Duration;
}

/// JWT service for token operations.
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("config", &self.config)
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

impl JwtService {
    /// Create a new JWT service with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the secret is empty or the
    /// duration is not positive.
    pub fn new(config: JwtConfig) -> AuthResult<Self> {
        if config.secret.is_empty() {
            return Err(AuthError::ConfigError(
                "JWT secret is required but not configured. Set JWT_SECRET environment variable"
                    .to_string(),
            ));
        }
        if config.token_duration <= Duration::zero() {
            return Err(AuthError::ConfigError(
                "JWT duration must be positive".to_string(),
            ));
        }

        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
        })
    }

    /// Create with a simple secret (HS256, default duration).
    pub fn with_secret(secret: impl Into<String>) -> AuthResult<Self> {
        Self::new(JwtConfig {
            secret: secret.into(),
            ..Default::default()
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Mint a token as if issued at `issued_at`.
    pub fn mint_at(&self, subject: &TokenSubject, issued_at: DateTime<Utc>) -> AuthResult<String> {
        let claims = AccessClaims::new(subject, issued_at, self.config.token_duration);
        self.encode_claims(&claims)
    }

    /// Encode existing claims.
    pub fn encode_claims(&self, claims: &AccessClaims) -> AuthResult<String> {
        let header = Header::new(self.config.algorithm.into());
        encode(&header, claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenIssue(e.to_string()))
    }

    fn validation(&self, check_expiry: bool) -> Validation {
        let mut validation = Validation::new(self.config.algorithm.into());
        validation.leeway = 0;
        validation.validate_exp = check_expiry;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "iat", "nbf"]);
        validation
    }

    fn decode_claims(&self, token: &str, check_expiry: bool) -> AuthResult<AccessClaims> {
        decode::<AccessClaims>(token, &self.decoding_key, &self.validation(check_expiry))
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::ImmatureSignature => {
                    AuthError::InvalidToken("Token not yet valid".to_string())
                }
                ErrorKind::InvalidToken => AuthError::InvalidToken("Malformed token".to_string()),
                ErrorKind::InvalidSignature => {
                    AuthError::InvalidToken("Invalid signature".to_string())
                }
                ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidToken("Unexpected signing algorithm".to_string())
                }
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}

impl TokenIssuer for JwtService {
    fn mint(&self, subject: &TokenSubject) -> AuthResult<String> {
        self.mint_at(subject, Utc::now())
    }

    fn validate(&self, token: &str) -> AuthResult<AccessClaims> {
        let claims = self.decode_claims(token, true)?;

        if !claims.is_active {
            return Err(AuthError::AccountInactive);
        }

        Ok(claims)
    }

    fn refresh(&self, token: &str) -> AuthResult<String> {
        let claims = match self.validate(token) {
            Ok(claims) => claims,
            Err(AuthError::TokenExpired) => {
                // Signature and nbf are still enforced; only expiry is waived.
                let claims = self.decode_claims(token, false)?;
                if !claims.is_active {
                    return Err(AuthError::AccountInactive);
                }
                claims
            }
            Err(e) => return Err(e),
        };

        debug!(user_id = claims.user_id, "Refreshing token");
        self.mint(&claims.subject())
    }

    fn lifetime(&self) -> Duration {
        self.config.token_duration
    }
}
