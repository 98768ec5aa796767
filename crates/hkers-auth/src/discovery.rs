//! Discovery-backed OIDC provider
//!
//! Provider metadata and signing keys are fetched at construction. When an
//! identity token names a signing key the cached set does not contain, the
//! key set is fetched again once and the client rebuilt, so provider key
//! rotation does not need a restart.

use crate::error::{AuthError, AuthResult};
use crate::oidc::{
    build_authorization_url, build_end_session_url, OidcConfig, OidcProvider, ProviderTokens,
    VerifiedIdentityToken,
};
use async_trait::async_trait;
use openidconnect::core::{CoreClient, CoreIdToken, CoreJsonWebKeySet, CoreProviderMetadata};
use openidconnect::reqwest::async_http_client;
use openidconnect::{
    AuthorizationCode, ClaimsVerificationError, ClientId, ClientSecret, IssuerUrl, Nonce,
    OAuth2TokenResponse, PkceCodeVerifier, RedirectUrl, SignatureVerificationError,
    TokenResponse,
};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// OIDC provider backed by `openidconnect` discovery.
pub struct DiscoveredProvider {
    client: RwLock<CoreClient>,
    metadata: CoreProviderMetadata,
    credentials: (ClientId, ClientSecret),
    redirect: RedirectUrl,
    authorization_endpoint: Url,
    client_id: String,
    redirect_url: String,
    scopes: Vec<String>,
    end_session_url: Option<String>,
    post_logout_redirect_url: Option<String>,
    request_timeout: Duration,
}

impl std::fmt::Debug for DiscoveredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveredProvider")
            .field("authorization_endpoint", &self.authorization_endpoint.as_str())
            .field("client_id", &self.client_id)
            .field("redirect_url", &self.redirect_url)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl DiscoveredProvider {
    /// Validate the configuration and run provider discovery.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigError`] if a required field is empty, a URL
    /// does not parse, or discovery fails or exceeds
    /// `config.discovery_timeout`.
    #[instrument(skip(config), fields(issuer = %config.issuer))]
    pub async fn discover(config: &OidcConfig) -> AuthResult<Self> {
        config.validate()?;

        let issuer = IssuerUrl::new(config.issuer.trim().to_string())
            .map_err(|e| AuthError::ConfigError(format!("Invalid issuer URL: {}", e)))?;
        let redirect = RedirectUrl::new(config.redirect_url.trim().to_string())
            .map_err(|e| AuthError::ConfigError(format!("Invalid redirect URL: {}", e)))?;

        let metadata = tokio::time::timeout(
            config.discovery_timeout,
            CoreProviderMetadata::discover_async(issuer, async_http_client),
        )
        .await
        .map_err(|_| {
            AuthError::ConfigError(format!(
                "OIDC discovery timed out after {:?}",
                config.discovery_timeout
            ))
        })?
        .map_err(|e| AuthError::ConfigError(format!("OIDC discovery failed: {}", e)))?;

        let authorization_endpoint = metadata.authorization_endpoint().url().clone();

        let credentials = (
            ClientId::new(config.client_id.trim().to_string()),
            ClientSecret::new(config.client_secret.trim().to_string()),
        );
        let client = build_client(metadata.clone(), &credentials, &redirect);

        info!(
            authorization_endpoint = %authorization_endpoint,
            jwks_uri = %metadata.jwks_uri().url(),
            keys = metadata.jwks().keys().len(),
            "OIDC provider discovered"
        );

        Ok(Self {
            client: RwLock::new(client),
            metadata,
            credentials,
            redirect,
            authorization_endpoint,
            client_id: config.client_id.trim().to_string(),
            redirect_url: config.redirect_url.trim().to_string(),
            scopes: config.scopes.clone(),
            end_session_url: config
                .end_session_url
                .clone()
                .filter(|u| !u.trim().is_empty()),
            post_logout_redirect_url: config
                .post_logout_redirect_url
                .clone()
                .filter(|u| !u.trim().is_empty()),
            request_timeout: config.request_timeout,
        })
    }

    /// Fetch the provider key set again and swap in a rebuilt client.
    #[instrument(skip_all)]
    async fn refresh_signing_keys(&self) -> AuthResult<CoreClient> {
        let jwks = tokio::time::timeout(
            self.request_timeout,
            CoreJsonWebKeySet::fetch_async(self.metadata.jwks_uri(), async_http_client),
        )
        .await
        .map_err(|_| {
            AuthError::IdTokenInvalid(format!(
                "signing key fetch timed out after {:?}",
                self.request_timeout
            ))
        })?
        .map_err(|e| AuthError::IdTokenInvalid(format!("signing key fetch failed: {}", e)))?;

        info!(keys = jwks.keys().len(), "Provider signing keys refreshed");

        let client = build_client(
            self.metadata.clone().set_jwks(jwks),
            &self.credentials,
            &self.redirect,
        );
        *self.client.write().await = client.clone();
        Ok(client)
    }
}

fn build_client(
    metadata: CoreProviderMetadata,
    (client_id, client_secret): &(ClientId, ClientSecret),
    redirect: &RedirectUrl,
) -> CoreClient {
    CoreClient::from_provider_metadata(metadata, client_id.clone(), Some(client_secret.clone()))
        .set_redirect_uri(redirect.clone())
}

/// Verify `id_token` with `client`'s keys and flatten its claims.
fn verified_claims(
    client: &CoreClient,
    id_token: &CoreIdToken,
) -> Result<Map<String, Value>, ClaimsVerificationError> {
    // No nonce is sent with the authorization request.
    let claims = id_token.claims(&client.id_token_verifier(), |_: Option<&Nonce>| Ok(()))?;

    match serde_json::to_value(claims) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ClaimsVerificationError::Other(
            "identity token claims are not an object".to_string(),
        )),
        Err(e) => Err(ClaimsVerificationError::Other(e.to_string())),
    }
}

#[async_trait]
impl OidcProvider for DiscoveredProvider {
    fn authorization_url(&self, state: &str, code_challenge: &str) -> AuthResult<String> {
        Ok(build_authorization_url(
            &self.authorization_endpoint,
            &self.client_id,
            &self.redirect_url,
            &self.scopes,
            state,
            code_challenge,
        ))
    }

    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> AuthResult<ProviderTokens> {
        let client = self.client.read().await.clone();
        let request = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(code_verifier.to_string()))
            .request_async(async_http_client);

        let response = tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| {
                AuthError::ExchangeFailed(format!(
                    "token request timed out after {:?}",
                    self.request_timeout
                ))
            })?
            .map_err(|e| {
                warn!(error = %e, "Authorization code exchange rejected");
                AuthError::ExchangeFailed(e.to_string())
            })?;

        let id_token = match response.id_token() {
            Some(token) => match serde_json::to_value(token) {
                Ok(Value::String(raw)) => Some(raw),
                _ => {
                    return Err(AuthError::Internal(
                        "identity token did not serialize to a string".to_string(),
                    ))
                }
            },
            None => None,
        };

        debug!(has_id_token = id_token.is_some(), "Code exchange succeeded");

        Ok(ProviderTokens {
            access_token: response.access_token().secret().clone(),
            token_type: response.token_type().as_ref().to_string(),
            expires_in: response.expires_in().map(|d| d.as_secs()),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            id_token,
        })
    }

    #[instrument(skip_all)]
    async fn verify_identity_token(
        &self,
        tokens: &ProviderTokens,
    ) -> AuthResult<VerifiedIdentityToken> {
        let raw = tokens
            .id_token
            .clone()
            .ok_or_else(|| AuthError::IdTokenInvalid("no id_token in token response".to_string()))?;

        let id_token: CoreIdToken = serde_json::from_value(Value::String(raw.clone()))
            .map_err(|e| AuthError::IdTokenInvalid(format!("malformed id_token: {}", e)))?;

        let client = self.client.read().await.clone();
        let claims = match verified_claims(&client, &id_token) {
            Err(ClaimsVerificationError::SignatureVerification(
                SignatureVerificationError::NoMatchingKey,
            )) => {
                info!("Identity token signed with an unknown key, refreshing provider keys");
                let client = self.refresh_signing_keys().await?;
                verified_claims(&client, &id_token)
            }
            result => result,
        }
        .map_err(|e| AuthError::IdTokenInvalid(e.to_string()))?;

        Ok(VerifiedIdentityToken { raw, claims })
    }

    fn end_session_url(&self, return_to: &str, id_token_hint: &str) -> AuthResult<Option<String>> {
        match &self.end_session_url {
            Some(endpoint) => build_end_session_url(endpoint, return_to, id_token_hint).map(Some),
            None => Ok(None),
        }
    }

    fn post_logout_redirect(&self) -> Option<&str> {
        self.post_logout_redirect_url.as_deref()
    }
}
