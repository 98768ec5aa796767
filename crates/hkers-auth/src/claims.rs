//! JWT claims for internally issued bearer tokens
//!
//! The claim names are a stable wire contract shared with API clients:
//! `user_id`, `email`, `oidc_sub`, `username`, `is_active`, `exp`, `iat`, `nbf`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::LocalAccount;

/// The local-account identity a token is minted for.
///
/// This is everything in [`AccessClaims`] except the temporal claims, and
/// is what survives a refresh unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSubject {
    /// Database user ID
    pub user_id: i32,

    /// User email (empty when the account has none)
    pub email: String,

    /// OIDC subject identifier
    pub oidc_sub: String,

    /// Username
    pub username: String,

    /// Account active status at mint time
    pub is_active: bool,
}

impl From<&LocalAccount> for TokenSubject {
    fn from(account: &LocalAccount) -> Self {
        Self {
            user_id: account.id,
            email: account.email.clone().unwrap_or_default(),
            oidc_sub: account.oidc_sub.clone(),
            username: account.username.clone(),
            is_active: account.is_active,
        }
    }
}

/// Claims embedded in an issued bearer token.
///
/// `is_active` is a snapshot taken when the token was minted. Deactivating
/// the account afterwards does not affect tokens already issued; they stay
/// valid until they expire. There is no revocation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Database user ID
    pub user_id: i32,

    /// User email
    #[serde(default)]
    pub email: String,

    /// OIDC subject identifier
    pub oidc_sub: String,

    /// Username
    pub username: String,

    /// Account active status
    pub is_active: bool,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,
}

impl AccessClaims {
    /// Create claims for a subject, valid from `issued_at` for `duration`.
    pub fn new(subject: &TokenSubject, issued_at: DateTime<Utc>, duration: Duration) -> Self {
        let exp = issued_at + duration;

        Self {
            user_id: subject.user_id,
            email: subject.email.clone(),
            oidc_sub: subject.oidc_sub.clone(),
            username: subject.username.clone(),
            is_active: subject.is_active,
            exp: exp.timestamp(),
            iat: issued_at.timestamp(),
            nbf: issued_at.timestamp(),
        }
    }

    /// The identity part of the claims.
    pub fn subject(&self) -> TokenSubject {
        TokenSubject {
            user_id: self.user_id,
            email: self.email.clone(),
            oidc_sub: self.oidc_sub.clone(),
            username: self.username.clone(),
            is_active: self.is_active,
        }
    }

    /// Check if the token is expired.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    /// Get expiration as DateTime.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }

    /// Get issue time as DateTime.
    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or_default()
    }
}
