//! Login flow orchestration
//!
//! Sequences the PKCE generator, the provider client, the identity resolver
//! and the token issuer for each auth endpoint:
//!
//! ```text
//! begin_login ──► AwaitingCallback ──► complete_callback ──► LoggedIn
//!                                                       └──► Denied / Err
//! ```
//!
//! The flow holds no per-request state of its own. The only state between
//! requests is the [`AuthorizationAttempt`], kept in an [`AttemptStore`]
//! under an opaque browser key chosen by the HTTP layer.

use crate::attempt::{AttemptStore, AuthorizationAttempt};
use crate::claims::{AccessClaims, TokenSubject};
use crate::error::{AuthError, AuthResult};
use crate::identity::{ExternalIdentity, IdentityResolver, LocalAccount, LoginDecision};
use crate::jwt::TokenIssuer;
use crate::oidc::OidcProvider;
use crate::pkce::{generate_pkce, generate_state};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default lifetime of a stored login attempt.
pub const DEFAULT_ATTEMPT_TTL: Duration = Duration::from_secs(600);

/// Token type reported in token responses.
pub const TOKEN_TYPE: &str = "Bearer";

/// Query parameters of the provider's redirect back to us.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,

    /// CSRF state echoed by the provider
    pub state: Option<String>,

    /// Provider error code, instead of a code
    pub error: Option<String>,

    /// Human-readable provider error
    pub error_description: Option<String>,
}

/// A completed login.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    /// Signed bearer token
    pub access_token: String,

    /// Always [`TOKEN_TYPE`]
    pub token_type: &'static str,

    /// Token lifetime in seconds
    pub expires_in: i64,

    /// The logged-in account
    pub account: LocalAccount,

    /// Raw provider identity token, usable as a logout hint
    pub id_token: String,
}

/// Account-gating outcome that ends a callback without a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenial {
    /// Account exists and awaits activation
    PendingApproval,

    /// Account was created by this callback and awaits activation
    Registered,

    /// Account exists but is not active
    NotActive,
}

impl AccessDenial {
    /// HTTP status for every denial.
    pub const STATUS: u16 = 403;

    /// Message shown to the user.
    pub fn message(&self) -> &'static str {
        match self {
            AccessDenial::PendingApproval => {
                "Your account is pending approval. Please contact an administrator."
            }
            AccessDenial::Registered => {
                "Your account has been registered and is pending approval. Please contact an administrator."
            }
            AccessDenial::NotActive => "Your account is not active. Please contact an administrator.",
        }
    }
}

/// Result of a callback that passed CSRF and provider checks.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    /// Token issued
    LoggedIn(LoginSuccess),

    /// No token; the account is not (yet) allowed in
    Denied(AccessDenial),
}

/// A freshly issued replacement token.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    /// Signed bearer token
    pub access_token: String,

    /// Always [`TOKEN_TYPE`]
    pub token_type: &'static str,

    /// Token lifetime in seconds
    pub expires_in: i64,
}

/// Problems with an `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BearerError {
    /// No header
    Missing,

    /// Scheme is not `Bearer`
    Malformed,

    /// `Bearer` with nothing after it
    Empty,
}

/// Extract the token from a `Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, BearerError> {
    let header = header.ok_or(BearerError::Missing)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(BearerError::Malformed)?
        .trim();
    if token.is_empty() {
        return Err(BearerError::Empty);
    }
    Ok(token)
}

/// Login flow orchestrator.
#[derive(Clone)]
pub struct AuthFlow {
    provider: Option<Arc<dyn OidcProvider>>,
    resolver: IdentityResolver,
    tokens: Arc<dyn TokenIssuer>,
    attempts: Arc<dyn AttemptStore>,
    attempt_ttl: Duration,
}

impl std::fmt::Debug for AuthFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthFlow")
            .field("oidc_configured", &self.is_configured())
            .field("attempt_ttl", &self.attempt_ttl)
            .finish_non_exhaustive()
    }
}

impl AuthFlow {
    /// Create a flow without a provider. Login endpoints report
    /// [`AuthError::OidcNotConfigured`] until one is attached.
    pub fn new(
        resolver: IdentityResolver,
        tokens: Arc<dyn TokenIssuer>,
        attempts: Arc<dyn AttemptStore>,
    ) -> Self {
        Self {
            provider: None,
            resolver,
            tokens,
            attempts,
            attempt_ttl: DEFAULT_ATTEMPT_TTL,
        }
    }

    /// Attach the identity provider.
    pub fn with_provider(mut self, provider: Arc<dyn OidcProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the login attempt lifetime.
    pub fn with_attempt_ttl(mut self, ttl: Duration) -> Self {
        self.attempt_ttl = ttl;
        self
    }

    /// Whether a provider is attached.
    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// The token issuer.
    pub fn tokens(&self) -> &Arc<dyn TokenIssuer> {
        &self.tokens
    }

    /// The identity resolver.
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    fn provider(&self) -> AuthResult<&Arc<dyn OidcProvider>> {
        self.provider.as_ref().ok_or(AuthError::OidcNotConfigured)
    }

    /// Start a login: store a fresh attempt under `browser_key` and return
    /// the provider authorization URL to redirect to.
    #[instrument(skip_all)]
    pub async fn begin_login(&self, browser_key: &str) -> AuthResult<String> {
        let provider = self.provider()?;

        let state = generate_state()?;
        let pkce = generate_pkce()?;
        let url = provider.authorization_url(&state, &pkce.challenge)?;

        self.attempts
            .insert(
                browser_key,
                AuthorizationAttempt::new(state, pkce.verifier),
                self.attempt_ttl,
            )
            .await?;

        debug!("Login attempt stored, redirecting to provider");
        Ok(url)
    }

    /// Finish a login from the provider's redirect.
    ///
    /// The stored attempt is consumed as soon as the state matches, so a
    /// replayed callback always fails.
    #[instrument(skip_all)]
    pub async fn complete_callback(
        &self,
        browser_key: Option<&str>,
        params: &CallbackParams,
    ) -> AuthResult<CallbackOutcome> {
        let provider = self.provider()?;

        let attempt = match browser_key {
            Some(key) => self.attempts.get(key).await?.map(|a| (key, a)),
            None => None,
        };
        let (key, attempt) = match attempt {
            Some((key, attempt)) if params.state.as_deref() == Some(attempt.state.as_str()) => {
                (key, attempt)
            }
            _ => {
                warn!(
                    has_attempt = browser_key.is_some(),
                    "Callback state does not match a stored login attempt"
                );
                return Err(AuthError::StateMismatch);
            }
        };
        self.attempts.remove(key).await?;

        if attempt.code_verifier.is_empty() {
            return Err(AuthError::MissingVerifier);
        }

        if let Some(error) = &params.error {
            let detail = match &params.error_description {
                Some(description) => format!("{}: {}", error, description),
                None => error.clone(),
            };
            warn!(error = %detail, "Provider returned an authorization error");
            return Err(AuthError::ProviderDenied(detail));
        }

        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::BadRequest("Missing authorization code".to_string()))?;

        let tokens = provider.exchange_code(code, &attempt.code_verifier).await?;
        let verified = provider.verify_identity_token(&tokens).await?;
        let claims = provider.extract_claims(&verified)?;
        let identity = ExternalIdentity::from_claims(&claims)?;

        let account = match self.resolver.resolve(&identity.subject).await? {
            LoginDecision::Allowed(account) => account,
            LoginDecision::PendingApproval => {
                info!(subject = %identity.subject, "Login refused: account pending approval");
                return Ok(CallbackOutcome::Denied(AccessDenial::PendingApproval));
            }
            LoginDecision::NotAllowed => {
                let provisioned = self.resolver.provision_from_profile(&identity).await?;
                if provisioned.newly_created {
                    info!(
                        subject = %identity.subject,
                        user_id = provisioned.account.id,
                        "Login refused: account registered, pending approval"
                    );
                    return Ok(CallbackOutcome::Denied(AccessDenial::Registered));
                }
                // Only an account that resolved as active is logged in.
                info!(
                    subject = %identity.subject,
                    user_id = provisioned.account.id,
                    is_active = provisioned.account.is_active,
                    "Login refused: account not active"
                );
                return Ok(CallbackOutcome::Denied(AccessDenial::NotActive));
            }
        };

        let access_token = self.tokens.mint(&TokenSubject::from(&account))?;
        info!(user_id = account.id, "User logged in");

        Ok(CallbackOutcome::LoggedIn(LoginSuccess {
            access_token,
            token_type: TOKEN_TYPE,
            expires_in: self.tokens.lifetime().num_seconds(),
            account,
            id_token: verified.raw,
        }))
    }

    /// Configured post-logout redirect, if any.
    pub fn post_logout_redirect(&self) -> Option<String> {
        self.provider
            .as_ref()
            .and_then(|p| p.post_logout_redirect())
            .map(str::to_string)
    }

    /// Provider logout URL for the client to follow. Never fails; without a
    /// provider or end-session endpoint the logout is local only.
    pub fn logout(&self, return_to: &str, id_token_hint: &str) -> Option<String> {
        let provider = self.provider.as_ref()?;
        match provider.end_session_url(return_to, id_token_hint) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Could not build end-session URL, logging out locally");
                None
            }
        }
    }

    /// Validate a bearer header for the API gate.
    pub fn authenticate(&self, header: Option<&str>) -> AuthResult<AccessClaims> {
        let token = bearer_token(header).map_err(|e| {
            AuthError::Unauthorized(
                match e {
                    BearerError::Missing => "Authorization header required",
                    BearerError::Malformed => {
                        "Invalid authorization header format. Expected: Bearer <token>"
                    }
                    BearerError::Empty => "Empty token",
                }
                .to_string(),
            )
        })?;
        self.tokens.validate(token)
    }

    /// Exchange a bearer header for a fresh token.
    pub fn refresh(&self, header: Option<&str>) -> AuthResult<RefreshedToken> {
        let token = match bearer_token(header) {
            Ok(token) => token,
            Err(BearerError::Missing) => {
                return Err(AuthError::Unauthorized(
                    "Authorization header required".to_string(),
                ))
            }
            Err(BearerError::Malformed) => {
                return Err(AuthError::Unauthorized(
                    "Invalid authorization header format".to_string(),
                ))
            }
            Err(BearerError::Empty) => "",
        };

        let access_token = self.tokens.refresh(token).map_err(|e| {
            debug!(error = %e, "Token refresh refused");
            AuthError::Unauthorized("Failed to refresh token".to_string())
        })?;

        Ok(RefreshedToken {
            access_token,
            token_type: TOKEN_TYPE,
            expires_in: self.tokens.lifetime().num_seconds(),
        })
    }
}
