//! Error types for authentication operations
//!
//! This module defines all error types that can occur during the login
//! flow, token validation, and identity provider interactions.
//!
//! Account-gating results (pending approval, freshly registered) are not
//! errors; they are modelled as [`crate::flow::AccessDenial`].

use thiserror::Error;

/// Authentication error types.
///
/// Only [`AuthError::TokenExpired`] permits a token refresh; every other
/// token failure is final.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The OIDC provider is not configured or discovery failed at startup
    #[error("OIDC authentication is not configured")]
    OidcNotConfigured,

    /// Callback `state` does not match the stored login attempt
    #[error("Invalid state parameter")]
    StateMismatch,

    /// No PKCE verifier was stored for this login attempt
    #[error("Missing PKCE verifier")]
    MissingVerifier,

    /// Malformed request (missing query parameter, bad header)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Provider redirected back with an error instead of a code
    #[error("Provider denied authorization: {0}")]
    ProviderDenied(String),

    /// Authorization code exchange was rejected
    #[error("Code exchange failed: {0}")]
    ExchangeFailed(String),

    /// Identity token missing or failed verification
    #[error("Identity token verification failed: {0}")]
    IdTokenInvalid(String),

    /// Identity token is missing a required claim
    #[error("Missing required claim: {0}")]
    MissingClaim(String),

    /// JWT token has expired
    #[error("Token has expired")]
    TokenExpired,

    /// JWT token is invalid (malformed, bad signature, wrong algorithm, etc.)
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Access token could not be signed
    #[error("Token issuance failed: {0}")]
    TokenIssue(String),

    /// Token carries an inactive account snapshot
    #[error("User account is not active")]
    AccountInactive,

    /// Authorization header missing or malformed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User directory backend failure
    #[error("User directory error: {0}")]
    Directory(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Check if this error should be logged at error level.
    ///
    /// CSRF rejections, expired tokens and the like are expected client
    /// behaviour and are logged as warnings.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            AuthError::IdTokenInvalid(_)
                | AuthError::MissingClaim(_)
                | AuthError::TokenIssue(_)
                | AuthError::Directory(_)
                | AuthError::ConfigError(_)
                | AuthError::Internal(_)
        )
    }

    /// Whether a token rejected with this error may still be refreshed.
    pub fn is_refreshable(&self) -> bool {
        matches!(self, AuthError::TokenExpired)
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::OidcNotConfigured => 503,

            AuthError::StateMismatch | AuthError::MissingVerifier | AuthError::BadRequest(_) => {
                400
            }

            AuthError::ProviderDenied(_)
            | AuthError::ExchangeFailed(_)
            | AuthError::TokenExpired
            | AuthError::InvalidToken(_)
            | AuthError::AccountInactive
            | AuthError::Unauthorized(_) => 401,

            AuthError::IdTokenInvalid(_)
            | AuthError::MissingClaim(_)
            | AuthError::TokenIssue(_)
            | AuthError::Directory(_)
            | AuthError::ConfigError(_)
            | AuthError::Internal(_) => 500,
        }
    }

    /// Get error code for API responses and log fields.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::OidcNotConfigured => "OIDC_NOT_CONFIGURED",
            AuthError::StateMismatch => "STATE_MISMATCH",
            AuthError::MissingVerifier => "MISSING_VERIFIER",
            AuthError::BadRequest(_) => "BAD_REQUEST",
            AuthError::ProviderDenied(_) => "PROVIDER_DENIED",
            AuthError::ExchangeFailed(_) => "EXCHANGE_FAILED",
            AuthError::IdTokenInvalid(_) => "ID_TOKEN_INVALID",
            AuthError::MissingClaim(_) => "MISSING_CLAIM",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::InvalidToken(_) => "INVALID_TOKEN",
            AuthError::TokenIssue(_) => "TOKEN_ISSUE_FAILED",
            AuthError::AccountInactive => "ACCOUNT_INACTIVE",
            AuthError::Unauthorized(_) => "UNAUTHORIZED",
            AuthError::Directory(_) => "DIRECTORY_ERROR",
            AuthError::ConfigError(_) => "CONFIG_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to API clients.
    ///
    /// Provider responses, key material and backend details stay in logs.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::OidcNotConfigured => "OIDC authentication is not configured. Please configure \
                OIDC_ISSUER, OIDC_CLIENT_ID, OIDC_CLIENT_SECRET, and OIDC_REDIRECT_URL environment variables."
                .to_string(),
            AuthError::StateMismatch => "Invalid state parameter".to_string(),
            AuthError::MissingVerifier => "Missing PKCE verifier".to_string(),
            AuthError::BadRequest(msg) | AuthError::Unauthorized(msg) => msg.clone(),
            AuthError::ProviderDenied(_) => "Authorization was denied by the identity provider".to_string(),
            AuthError::ExchangeFailed(_) => "Failed to exchange authorization code".to_string(),
            AuthError::IdTokenInvalid(_) => "Failed to verify ID token".to_string(),
            AuthError::MissingClaim(claim) if claim == "sub" => {
                "Invalid OIDC token: missing sub claim".to_string()
            }
            AuthError::MissingClaim(_) => "Failed to extract claims".to_string(),
            AuthError::TokenExpired | AuthError::InvalidToken(_) | AuthError::AccountInactive => {
                "Invalid or expired token".to_string()
            }
            AuthError::TokenIssue(_) => "Failed to generate access token".to_string(),
            AuthError::Directory(_) => "Failed to validate user".to_string(),
            AuthError::ConfigError(_) | AuthError::Internal(_) => "Internal server error".to_string(),
        }
    }
}
