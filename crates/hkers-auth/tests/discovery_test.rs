//! Provider client tests against a mock identity provider.
//!
//! wiremock serves the discovery document, the JWKS and the token endpoint
//! so the `openidconnect`-backed client runs its real HTTP paths. Identity
//! tokens are signed with the RSA keys under `tests/fixtures/`.

#![cfg(feature = "oidc")]

use chrono::{DateTime, Utc};
use hkers_auth::{AuthError, DiscoveredProvider, OidcConfig, OidcProvider, ProviderTokens};
use openidconnect::core::{
    CoreIdToken, CoreIdTokenClaims, CoreJsonWebKeySet, CoreJwsSigningAlgorithm,
    CoreRsaPrivateSigningKey,
};
use openidconnect::{
    Audience, EmptyAdditionalClaims, EndUserEmail, IssuerUrl, JsonWebKeyId, PrivateSigningKey,
    StandardClaims, SubjectIdentifier,
};
use serde_json::Value;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REDIRECT_URL: &str = "http://localhost:3000/auth/callback";
const CLIENT_ID: &str = "hkers-client";
const SIGNING_KEY_PEM: &str = include_str!("fixtures/signing_key.pem");
const ROTATED_KEY_PEM: &str = include_str!("fixtures/rotated_key.pem");

fn signing_key(pem: &str, kid: &str) -> CoreRsaPrivateSigningKey {
    CoreRsaPrivateSigningKey::from_pem(pem, Some(JsonWebKeyId::new(kid.to_string())))
        .expect("fixture key should parse")
}

/// JWKS document publishing the public half of `keys`.
fn key_set(keys: &[&CoreRsaPrivateSigningKey]) -> Value {
    let keys = keys.iter().map(|k| k.as_verification_key()).collect();
    serde_json::to_value(CoreJsonWebKeySet::new(keys)).unwrap()
}

/// Sign an identity token for `sub-signed`.
fn sign_id_token(
    key: &CoreRsaPrivateSigningKey,
    issuer: &str,
    audience: &str,
    expires_at: DateTime<Utc>,
) -> String {
    let claims = CoreIdTokenClaims::new(
        IssuerUrl::new(issuer.to_string()).unwrap(),
        vec![Audience::new(audience.to_string())],
        expires_at,
        expires_at - chrono::Duration::hours(1),
        StandardClaims::new(SubjectIdentifier::new("sub-signed".to_string()))
            .set_email(Some(EndUserEmail::new("signed@example.com".to_string()))),
        EmptyAdditionalClaims {},
    );
    let token = CoreIdToken::new(
        claims,
        key,
        CoreJwsSigningAlgorithm::RsaSsaPkcs1V15Sha256,
        None,
        None,
    )
    .unwrap();

    match serde_json::to_value(&token).unwrap() {
        Value::String(raw) => raw,
        other => panic!("identity token serialized as {other}"),
    }
}

fn with_id_token(raw: String) -> ProviderTokens {
    ProviderTokens {
        access_token: "at".to_string(),
        token_type: "Bearer".to_string(),
        expires_in: None,
        refresh_token: None,
        id_token: Some(raw),
    }
}

/// Mock provider plus a matching client configuration.
struct TestFixture {
    server: MockServer,
    config: OidcConfig,
}

impl TestFixture {
    async fn new() -> Self {
        let server = MockServer::start().await;
        let config = OidcConfig::new(server.uri(), CLIENT_ID, "hkers-secret", REDIRECT_URL);
        Self { server, config }
    }

    /// Serve a discovery document and the given key set.
    async fn mount_discovery(&self, jwks: Value) {
        let issuer = self.server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": issuer,
                "authorization_endpoint": format!("{}/authorize", issuer),
                "token_endpoint": format!("{}/token", issuer),
                "jwks_uri": format!("{}/jwks", issuer),
                "response_types_supported": ["code"],
                "subject_types_supported": ["public"],
                "id_token_signing_alg_values_supported": ["RS256"]
            })))
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
            .mount(&self.server)
            .await;
    }

    fn issuer(&self) -> String {
        self.server.uri()
    }

    async fn jwks_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/jwks")
            .count()
    }

    async fn provider(&self) -> DiscoveredProvider {
        let key = signing_key(SIGNING_KEY_PEM, "key-1");
        self.mount_discovery(key_set(&[&key])).await;
        DiscoveredProvider::discover(&self.config)
            .await
            .expect("discovery should succeed")
    }
}

fn query_value(url: &str, key: &str) -> Option<String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn test_discovery_and_authorization_url() {
    let fixture = TestFixture::new().await;
    let provider = fixture.provider().await;

    let url = provider.authorization_url("state-123", "challenge-abc").unwrap();

    assert!(url.starts_with(&format!("{}/authorize?", fixture.server.uri())));
    assert_eq!(query_value(&url, "response_type").as_deref(), Some("code"));
    assert_eq!(query_value(&url, "client_id").as_deref(), Some("hkers-client"));
    assert_eq!(query_value(&url, "redirect_uri").as_deref(), Some(REDIRECT_URL));
    assert_eq!(
        query_value(&url, "scope").as_deref(),
        Some("openid profile email")
    );
    assert_eq!(query_value(&url, "state").as_deref(), Some("state-123"));
    assert_eq!(
        query_value(&url, "code_challenge").as_deref(),
        Some("challenge-abc")
    );
    assert_eq!(
        query_value(&url, "code_challenge_method").as_deref(),
        Some("S256")
    );
}

#[tokio::test]
async fn test_discovery_failure_is_config_error() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&fixture.server)
        .await;

    let result = DiscoveredProvider::discover(&fixture.config).await;
    assert!(matches!(result, Err(AuthError::ConfigError(_))));
}

#[tokio::test]
async fn test_discovery_timeout() {
    let mut fixture = TestFixture::new().await;
    fixture.config.discovery_timeout = Duration::from_millis(200);

    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&fixture.server)
        .await;

    match DiscoveredProvider::discover(&fixture.config).await {
        Err(AuthError::ConfigError(msg)) => assert!(msg.contains("timed out"), "{msg}"),
        other => panic!("expected timeout, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_missing_fields_fail_before_network() {
    let fixture = TestFixture::new().await;
    let mut config = fixture.config.clone();
    config.client_secret = String::new();

    let result = DiscoveredProvider::discover(&config).await;
    assert!(matches!(result, Err(AuthError::ConfigError(ref m)) if m.contains("OIDC_CLIENT_SECRET")));
    assert!(fixture.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_exchange_sends_code_verifier() {
    let fixture = TestFixture::new().await;
    let provider = fixture.provider().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .and(body_string_contains("code_verifier=verifier-xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "provider-access-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let tokens = provider
        .exchange_code("auth-code-1", "verifier-xyz")
        .await
        .unwrap();

    assert_eq!(tokens.access_token, "provider-access-token");
    assert_eq!(tokens.expires_in, Some(3600));
    assert!(tokens.id_token.is_none());

    // No id_token means nothing to verify
    let result = provider.verify_identity_token(&tokens).await;
    assert!(matches!(result, Err(AuthError::IdTokenInvalid(_))));
}

#[tokio::test]
async fn test_rejected_exchange() {
    let fixture = TestFixture::new().await;
    let provider = fixture.provider().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "code already used"
        })))
        .mount(&fixture.server)
        .await;

    let result = provider.exchange_code("reused", "verifier").await;
    assert!(matches!(result, Err(AuthError::ExchangeFailed(_))));
}

#[tokio::test]
async fn test_malformed_id_token_rejected() {
    let fixture = TestFixture::new().await;
    let provider = fixture.provider().await;

    let tokens = with_id_token("not-a-jwt".to_string());

    let result = provider.verify_identity_token(&tokens).await;
    assert!(matches!(result, Err(AuthError::IdTokenInvalid(_))));
}

#[tokio::test]
async fn test_verify_signed_id_token() {
    let fixture = TestFixture::new().await;
    let provider = fixture.provider().await;
    let key = signing_key(SIGNING_KEY_PEM, "key-1");

    let raw = sign_id_token(
        &key,
        &fixture.issuer(),
        CLIENT_ID,
        Utc::now() + chrono::Duration::minutes(5),
    );
    let verified = provider
        .verify_identity_token(&with_id_token(raw.clone()))
        .await
        .unwrap();

    assert_eq!(verified.raw, raw);
    assert_eq!(verified.claims["sub"], "sub-signed");
    assert_eq!(verified.claims["email"], "signed@example.com");
    assert_eq!(verified.claims["iss"], fixture.issuer().as_str());

    let claims = provider.extract_claims(&verified).unwrap();
    assert_eq!(claims["sub"], "sub-signed");
}

#[tokio::test]
async fn test_verification_fails_closed() {
    let fixture = TestFixture::new().await;
    let provider = fixture.provider().await;
    let key = signing_key(SIGNING_KEY_PEM, "key-1");
    let issuer = fixture.issuer();
    let valid_until = Utc::now() + chrono::Duration::minutes(5);

    let cases = [
        (
            "wrong audience",
            sign_id_token(&key, &issuer, "someone-else", valid_until),
        ),
        (
            "wrong issuer",
            sign_id_token(&key, "https://evil.example.com", CLIENT_ID, valid_until),
        ),
        (
            "expired",
            sign_id_token(&key, &issuer, CLIENT_ID, Utc::now() - chrono::Duration::hours(1)),
        ),
        (
            "foreign key reusing the key id",
            sign_id_token(
                &signing_key(ROTATED_KEY_PEM, "key-1"),
                &issuer,
                CLIENT_ID,
                valid_until,
            ),
        ),
        (
            "key id the provider never published",
            sign_id_token(
                &signing_key(ROTATED_KEY_PEM, "unpublished"),
                &issuer,
                CLIENT_ID,
                valid_until,
            ),
        ),
    ];

    for (case, raw) in cases {
        let result = provider.verify_identity_token(&with_id_token(raw)).await;
        assert!(
            matches!(result, Err(AuthError::IdTokenInvalid(_))),
            "{case}: {:?}",
            result.map(|v| v.claims)
        );
    }
}

#[tokio::test]
async fn test_signing_key_rotation_refetches_keys() {
    let fixture = TestFixture::new().await;
    let provider = fixture.provider().await;
    let issuer = fixture.issuer();
    let valid_until = Utc::now() + chrono::Duration::minutes(5);

    let original = signing_key(SIGNING_KEY_PEM, "key-1");
    provider
        .verify_identity_token(&with_id_token(sign_id_token(
            &original, &issuer, CLIENT_ID, valid_until,
        )))
        .await
        .unwrap();

    // Provider rotates to a new key
    let rotated = signing_key(ROTATED_KEY_PEM, "key-2");
    fixture.server.reset().await;
    fixture.mount_discovery(key_set(&[&rotated])).await;
    let fetched_before = fixture.jwks_requests().await;

    let verified = provider
        .verify_identity_token(&with_id_token(sign_id_token(
            &rotated, &issuer, CLIENT_ID, valid_until,
        )))
        .await
        .unwrap();
    assert_eq!(verified.claims["sub"], "sub-signed");
    assert_eq!(fixture.jwks_requests().await, fetched_before + 1);

    // The refreshed keys are kept
    provider
        .verify_identity_token(&with_id_token(sign_id_token(
            &rotated, &issuer, CLIENT_ID, valid_until,
        )))
        .await
        .unwrap();
    assert_eq!(fixture.jwks_requests().await, fetched_before + 1);
}

#[tokio::test]
async fn test_known_key_does_not_refetch() {
    let fixture = TestFixture::new().await;
    let provider = fixture.provider().await;
    let fetched_after_discovery = fixture.jwks_requests().await;

    let raw = sign_id_token(
        &signing_key(SIGNING_KEY_PEM, "key-1"),
        &fixture.issuer(),
        CLIENT_ID,
        Utc::now() + chrono::Duration::minutes(5),
    );
    provider.verify_identity_token(&with_id_token(raw)).await.unwrap();

    assert_eq!(fixture.jwks_requests().await, fetched_after_discovery);
}

#[tokio::test]
async fn test_end_session_url() {
    let mut fixture = TestFixture::new().await;
    fixture.config = fixture
        .config
        .clone()
        .with_end_session_url(format!("{}/logout", fixture.server.uri()))
        .with_post_logout_redirect_url("https://app.example.com/bye");
    let provider = fixture.provider().await;

    assert_eq!(
        provider.post_logout_redirect(),
        Some("https://app.example.com/bye")
    );

    let url = provider
        .end_session_url("https://app.example.com/bye", "raw-id-token")
        .unwrap()
        .unwrap();
    assert_eq!(
        query_value(&url, "post_logout_redirect_uri").as_deref(),
        Some("https://app.example.com/bye")
    );
    assert_eq!(query_value(&url, "id_token_hint").as_deref(), Some("raw-id-token"));
}

#[tokio::test]
async fn test_no_end_session_endpoint() {
    let fixture = TestFixture::new().await;
    let provider = fixture.provider().await;

    assert_eq!(provider.end_session_url("https://app", "hint").unwrap(), None);
    assert_eq!(provider.post_logout_redirect(), None);
}
