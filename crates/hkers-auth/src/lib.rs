//! # HKERS Authentication
//!
//! Login and session handoff for the HKERS backend: an OpenID Connect
//! authorization-code flow with PKCE, account gating against the local
//! user directory, and the internally issued bearer tokens that secure the
//! JSON API.
//!
//! ## Overview
//!
//! - **PKCE**: CSRF state and verifier/challenge generation
//! - **OIDC**: provider contract plus a discovery-backed client (feature `oidc`)
//! - **Identity**: subject → login decision, self-service registration
//! - **JWT**: mint, validate and refresh HMAC-signed access tokens
//! - **Flow**: the login/callback/logout/refresh orchestration
//!
//! ## Features
//!
//! - `oidc` (default): [`DiscoveredProvider`], built on `openidconnect`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hkers_auth::{JwtService, TokenIssuer, TokenSubject};
//!
//! let service = JwtService::with_secret("your-secret-key").unwrap();
//!
//! let subject = TokenSubject {
//!     user_id: 42,
//!     email: "donor@example.com".to_string(),
//!     oidc_sub: "provider|42".to_string(),
//!     username: "donor".to_string(),
//!     is_active: true,
//! };
//!
//! let token = service.mint(&subject).unwrap();
//! let claims = service.validate(&token).unwrap();
//! assert_eq!(claims.user_id, 42);
//! ```
//!
//! ## Token claims
//!
//! Issued tokens carry `user_id`, `email`, `oidc_sub`, `username`,
//! `is_active`, `exp`, `iat` and `nbf`. `is_active` is a snapshot taken at
//! issuance: deactivating an account does not revoke tokens already issued.

pub mod attempt;
pub mod claims;
pub mod config;
pub mod directory;
#[cfg(feature = "oidc")]
pub mod discovery;
pub mod error;
pub mod flow;
pub mod identity;
pub mod jwt;
pub mod oidc;
pub mod pkce;

// Re-export main types
pub use attempt::{AttemptStore, AuthorizationAttempt, MemoryAttemptStore};
pub use claims::{AccessClaims, TokenSubject};
pub use config::{parse_duration, split_list, AuthConfig, ConfigError};
pub use directory::{DirectoryError, DirectoryResult, MemoryDirectory, NewAccount, UserDirectory};
pub use error::{AuthError, AuthResult};
pub use flow::{
    bearer_token, AccessDenial, AuthFlow, BearerError, CallbackOutcome, CallbackParams,
    LoginSuccess, RefreshedToken, TOKEN_TYPE,
};
pub use identity::{ExternalIdentity, IdentityResolver, LocalAccount, LoginDecision, Provisioned};
pub use jwt::{JwtAlgorithm, JwtConfig, JwtService, TokenIssuer};
pub use oidc::{OidcConfig, OidcProvider, ProviderTokens, VerifiedIdentityToken};
pub use pkce::{generate_pkce, generate_state, PkcePair};

#[cfg(feature = "oidc")]
pub use discovery::DiscoveredProvider;
