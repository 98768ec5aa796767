//! Authentication endpoints
//!
//! The browser is identified between `/auth/login` and `/auth/callback` by
//! an opaque key in an `HttpOnly` cookie. The login attempt itself stays
//! server-side in the attempt store.

use crate::response::{ApiError, ApiResponse};
use crate::state::AppState;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, HOST};
use axum::http::HeaderMap;
use axum::response::Redirect;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use hkers_auth::{AuthError, CallbackOutcome, CallbackParams, LocalAccount};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Public profile of the logged-in account.
#[derive(Debug, Serialize)]
pub struct AccountProfile {
    pub id: i32,
    pub email: Option<String>,
    pub username: String,
    pub oidc_sub: String,
    pub is_active: bool,
    pub trust_points: i32,
    pub created_at: DateTime<Utc>,
}

impl From<LocalAccount> for AccountProfile {
    fn from(account: LocalAccount) -> Self {
        Self {
            id: account.id,
            email: account.email,
            username: account.username,
            oidc_sub: account.oidc_sub,
            is_active: account.is_active,
            trust_points: account.trust_points,
            created_at: account.created_at,
        }
    }
}

/// Body of a successful callback.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: AccountProfile,
}

/// Body of a successful refresh.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// Body of a logout.
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logout_url: Option<String>,
}

/// Optional logout parameters.
#[derive(Debug, Default, Deserialize)]
pub struct LogoutParams {
    /// Provider identity token to pass as `id_token_hint`
    pub id_token_hint: Option<String>,
}

/// `GET /auth/login`: redirect to the provider.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), ApiError> {
    let key = jar
        .get(&state.cookie.name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let url = state.flow.begin_login(&key).await?;

    let cookie = Cookie::build((state.cookie.name.clone(), key))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.cookie.secure)
        .path("/");

    Ok((jar.add(cookie), Redirect::temporary(&url)))
}

/// `GET /auth/callback`: finish the login and issue a bearer token.
#[instrument(skip_all)]
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let Query(params) = query.map_err(|e| {
        warn!(error = %e, "Unparsable callback query");
        AuthError::BadRequest("Invalid callback parameters".to_string())
    })?;
    let key = jar.get(&state.cookie.name).map(|c| c.value().to_string());

    match state.flow.complete_callback(key.as_deref(), &params).await? {
        CallbackOutcome::LoggedIn(success) => Ok(ApiResponse::ok(LoginResponse {
            access_token: success.access_token,
            token_type: success.token_type,
            expires_in: success.expires_in,
            user: success.account.into(),
        })),
        CallbackOutcome::Denied(denial) => Err(denial.into()),
    }
}

/// `POST /auth/logout`: always succeeds.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Option<Query<LogoutParams>>,
) -> Json<ApiResponse<LogoutResponse>> {
    let params = query.map(|Query(params)| params).unwrap_or_default();
    if let Ok(claims) = state.flow.authenticate(header_str(&headers, AUTHORIZATION.as_str())) {
        debug!(user_id = claims.user_id, "User logging out");
    }

    let return_to = state
        .flow
        .post_logout_redirect()
        .unwrap_or_else(|| request_origin(&headers));
    let hint = params.id_token_hint.unwrap_or_default();

    ApiResponse::ok(LogoutResponse {
        message: "Logged out successfully",
        logout_url: state.flow.logout(&return_to, &hint),
    })
}

/// `POST /auth/refresh`: exchange a bearer token for a fresh one.
#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<RefreshResponse>>, ApiError> {
    let refreshed = state
        .flow
        .refresh(header_str(&headers, AUTHORIZATION.as_str()))?;

    Ok(ApiResponse::ok(RefreshResponse {
        access_token: refreshed.access_token,
        token_type: refreshed.token_type,
        expires_in: refreshed.expires_in,
    }))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `{scheme}://{host}` of the incoming request.
fn request_origin(headers: &HeaderMap) -> String {
    let host = match header_str(headers, HOST.as_str()) {
        Some(host) => host,
        None => return String::new(),
    };
    let scheme = header_str(headers, "x-forwarded-proto")
        .and_then(|p| p.split(',').next())
        .map(str::trim)
        .filter(|p| *p == "https" || *p == "http")
        .unwrap_or("http");
    format!("{}://{}", scheme, host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_origin() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_origin(&headers), "");

        headers.insert(HOST, HeaderValue::from_static("hkers.example.com"));
        assert_eq!(request_origin(&headers), "http://hkers.example.com");

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(request_origin(&headers), "https://hkers.example.com");
    }
}
