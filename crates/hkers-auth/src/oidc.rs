//! OpenID Connect provider contract
//!
//! This module defines the configuration for the single configured identity
//! provider and the [`OidcProvider`] trait the login flow talks to. The
//! discovery-backed implementation lives in [`crate::discovery`]; tests plug
//! in fakes.

use crate::error::{AuthError, AuthResult};
use crate::pkce::CHALLENGE_METHOD;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

/// Default scopes requested from the provider.
pub const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "email"];

/// Default bound on provider discovery.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on the code exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OIDC provider configuration.
#[derive(Clone)]
pub struct OidcConfig {
    /// Issuer URL, used for discovery
    pub issuer: String,

    /// Client ID
    pub client_id: String,

    /// Client secret
    pub client_secret: String,

    /// Redirect URL registered with the provider
    pub redirect_url: String,

    /// Scopes to request
    pub scopes: Vec<String>,

    /// Provider end-session (logout) endpoint
    pub end_session_url: Option<String>,

    /// Where the provider should send the browser after logout
    pub post_logout_redirect_url: Option<String>,

    /// Bound on discovery at startup
    pub discovery_timeout: Duration,

    /// Bound on the code exchange
    pub request_timeout: Duration,
}

impl OidcConfig {
    /// Create a configuration with default scopes and timeouts.
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: redirect_url.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            end_session_url: None,
            post_logout_redirect_url: None,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the end-session endpoint.
    pub fn with_end_session_url(mut self, url: impl Into<String>) -> Self {
        self.end_session_url = Some(url.into());
        self
    }

    /// Set the post-logout redirect.
    pub fn with_post_logout_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.post_logout_redirect_url = Some(url.into());
        self
    }

    /// Check that every required field is present.
    pub fn validate(&self) -> AuthResult<()> {
        let missing: Vec<&str> = [
            ("OIDC_ISSUER", &self.issuer),
            ("OIDC_CLIENT_ID", &self.client_id),
            ("OIDC_CLIENT_SECRET", &self.client_secret),
            ("OIDC_REDIRECT_URL", &self.redirect_url),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuthError::ConfigError(format!(
                "missing required OIDC settings: {}",
                missing.join(", ")
            )))
        }
    }
}

impl std::fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcConfig")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_url", &self.redirect_url)
            .field("scopes", &self.scopes)
            .field("end_session_url", &self.end_session_url)
            .field("post_logout_redirect_url", &self.post_logout_redirect_url)
            .field("discovery_timeout", &self.discovery_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Token response from the provider's token endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderTokens {
    /// Provider access token
    pub access_token: String,

    /// Token type (usually "Bearer")
    pub token_type: String,

    /// Expires in seconds
    pub expires_in: Option<u64>,

    /// Refresh token (if provided)
    pub refresh_token: Option<String>,

    /// Raw identity token, absent if the provider did not issue one
    pub id_token: Option<String>,
}

impl std::fmt::Debug for ProviderTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderTokens")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .finish()
    }
}

/// Identity token whose signature and standard claims have been checked.
#[derive(Clone)]
pub struct VerifiedIdentityToken {
    /// Compact-serialized token, kept for `id_token_hint`
    pub raw: String,

    /// Decoded claim set
    pub claims: Map<String, Value>,
}

impl std::fmt::Debug for VerifiedIdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedIdentityToken")
            .field("raw", &"[REDACTED]")
            .field("sub", &self.claims.get("sub"))
            .finish()
    }
}

/// Client for the configured identity provider.
#[async_trait]
pub trait OidcProvider: Send + Sync {
    /// Build the authorization endpoint URL for a login attempt.
    fn authorization_url(&self, state: &str, code_challenge: &str) -> AuthResult<String>;

    /// Exchange an authorization code, attaching the PKCE verifier.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> AuthResult<ProviderTokens>;

    /// Verify the identity token carried by an exchange result.
    async fn verify_identity_token(
        &self,
        tokens: &ProviderTokens,
    ) -> AuthResult<VerifiedIdentityToken>;

    /// Claim set of a verified token. Fails if `sub` is missing.
    fn extract_claims(&self, token: &VerifiedIdentityToken) -> AuthResult<Map<String, Value>> {
        match token.claims.get("sub").and_then(Value::as_str) {
            Some(sub) if !sub.is_empty() => Ok(token.claims.clone()),
            _ => Err(AuthError::MissingClaim("sub".to_string())),
        }
    }

    /// Provider logout URL, or `None` when no end-session endpoint is
    /// configured.
    fn end_session_url(&self, return_to: &str, id_token_hint: &str) -> AuthResult<Option<String>>;

    /// Configured post-logout redirect.
    fn post_logout_redirect(&self) -> Option<&str>;
}

/// Build an authorization request URL (authorization code flow, PKCE S256).
pub fn build_authorization_url(
    endpoint: &Url,
    client_id: &str,
    redirect_url: &str,
    scopes: &[String],
    state: &str,
    code_challenge: &str,
) -> String {
    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_url)
        .append_pair("scope", &scopes.join(" "))
        .append_pair("state", state)
        .append_pair("code_challenge", code_challenge)
        .append_pair("code_challenge_method", CHALLENGE_METHOD);
    url.into()
}

/// Build an end-session URL. Empty parameters are left out.
pub fn build_end_session_url(
    endpoint: &str,
    return_to: &str,
    id_token_hint: &str,
) -> AuthResult<String> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| AuthError::ConfigError(format!("Invalid end session URL: {}", e)))?;

    let existing: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "post_logout_redirect_uri" && k != "id_token_hint")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.extend_pairs(existing);
        if !return_to.is_empty() {
            pairs.append_pair("post_logout_redirect_uri", return_to);
        }
        if !id_token_hint.is_empty() {
            pairs.append_pair("id_token_hint", id_token_hint);
        }
    }

    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(url: &str) -> Vec<(String, String)> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_validate_lists_missing_fields() {
        let config = OidcConfig::new("https://issuer.example.com", "", " ", "");
        let err = config.validate().unwrap_err().to_string();

        assert!(err.contains("OIDC_CLIENT_ID"));
        assert!(err.contains("OIDC_CLIENT_SECRET"));
        assert!(err.contains("OIDC_REDIRECT_URL"));
        assert!(!err.contains("OIDC_ISSUER"));
    }

    #[test]
    fn test_debug_redacts_client_secret() {
        let config = OidcConfig::new("https://issuer", "client", "top-secret", "https://app/cb");
        assert!(!format!("{:?}", config).contains("top-secret"));
    }

    #[test]
    fn test_authorization_url_parameters() {
        let endpoint = Url::parse("https://issuer.example.com/authorize").unwrap();
        let scopes: Vec<String> = DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect();
        let url = build_authorization_url(
            &endpoint,
            "client-1",
            "http://localhost:3000/auth/callback",
            &scopes,
            "state+/=",
            "challenge",
        );

        let pairs = query(&url);
        let get = |k: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("client_id"), Some("client-1"));
        assert_eq!(get("redirect_uri"), Some("http://localhost:3000/auth/callback"));
        assert_eq!(get("scope"), Some("openid profile email"));
        assert_eq!(get("state"), Some("state+/="));
        assert_eq!(get("code_challenge"), Some("challenge"));
        assert_eq!(get("code_challenge_method"), Some("S256"));
    }

    #[test]
    fn test_end_session_url() {
        let url = build_end_session_url(
            "https://issuer.example.com/logout?client_id=abc",
            "https://app.example.com",
            "id.token.value",
        )
        .unwrap();

        assert_eq!(
            query(&url),
            vec![
                ("client_id".to_string(), "abc".to_string()),
                (
                    "post_logout_redirect_uri".to_string(),
                    "https://app.example.com".to_string()
                ),
                ("id_token_hint".to_string(), "id.token.value".to_string()),
            ]
        );
    }

    #[test]
    fn test_end_session_url_skips_empty_params() {
        let url = build_end_session_url("https://issuer.example.com/logout", "", "").unwrap();
        assert_eq!(url, "https://issuer.example.com/logout");

        assert!(build_end_session_url("not a url", "", "").is_err());
    }

    struct ClaimsOnly;

    #[async_trait]
    impl OidcProvider for ClaimsOnly {
        fn authorization_url(&self, _: &str, _: &str) -> AuthResult<String> {
            unimplemented!()
        }
        async fn exchange_code(&self, _: &str, _: &str) -> AuthResult<ProviderTokens> {
            unimplemented!()
        }
        async fn verify_identity_token(&self, _: &ProviderTokens) -> AuthResult<VerifiedIdentityToken> {
            unimplemented!()
        }
        fn end_session_url(&self, _: &str, _: &str) -> AuthResult<Option<String>> {
            Ok(None)
        }
        fn post_logout_redirect(&self) -> Option<&str> {
            None
        }
    }

    #[test]
    fn test_extract_claims_requires_sub() {
        let token = |claims: Value| VerifiedIdentityToken {
            raw: "raw".to_string(),
            claims: claims.as_object().cloned().unwrap(),
        };

        let claims = ClaimsOnly
            .extract_claims(&token(serde_json::json!({"sub": "abc", "email": "a@b.c"})))
            .unwrap();
        assert_eq!(claims["email"], "a@b.c");

        for bad in [
            serde_json::json!({"email": "a@b.c"}),
            serde_json::json!({"sub": ""}),
            serde_json::json!({"sub": 42}),
        ] {
            assert!(matches!(
                ClaimsOnly.extract_claims(&token(bad)),
                Err(AuthError::MissingClaim(_))
            ));
        }
    }
}
