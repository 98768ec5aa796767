//! Auth configuration loading
//!
//! Configuration is read once at startup from environment variables and
//! handed to constructors. Nothing here is global.

use crate::flow::DEFAULT_ATTEMPT_TTL;
use crate::jwt::{JwtAlgorithm, JwtConfig, DEFAULT_TOKEN_DURATION_HOURS};
use crate::oidc::{OidcConfig, DEFAULT_DISCOVERY_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SCOPES};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Everything the auth core needs at startup.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Identity provider settings (may be incomplete; checked at discovery)
    pub oidc: OidcConfig,

    /// Token issuer settings
    pub jwt: JwtConfig,

    /// Lifetime of a stored login attempt
    pub attempt_ttl: Duration,
}

impl AuthConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `OIDC_ISSUER`, `OIDC_CLIENT_ID`, `OIDC_CLIENT_SECRET`, `OIDC_REDIRECT_URL`
    /// - `OIDC_SCOPES`: comma-separated (default: openid,profile,email)
    /// - `OIDC_END_SESSION_URL`: provider logout endpoint
    /// - `OIDC_POST_LOGOUT_REDIRECT_URL`: where to land after provider logout
    /// - `OIDC_DISCOVERY_TIMEOUT`: default 10s
    /// - `OIDC_REQUEST_TIMEOUT`: default 30s
    /// - `JWT_SECRET`: required
    /// - `JWT_DURATION`: default 168h
    /// - `JWT_ALGORITHM`: HS256, HS384 or HS512 (default: HS256)
    /// - `AUTH_ATTEMPT_TTL`: default 10m
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).unwrap_or_default();
        let optional = |key: &str| Some(get(key)).filter(|v| !v.is_empty());

        let scopes = match optional("OIDC_SCOPES") {
            Some(raw) => split_list(&raw),
            None => DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        };

        let oidc = OidcConfig {
            issuer: get("OIDC_ISSUER"),
            client_id: get("OIDC_CLIENT_ID"),
            client_secret: get("OIDC_CLIENT_SECRET"),
            redirect_url: get("OIDC_REDIRECT_URL"),
            scopes,
            end_session_url: optional("OIDC_END_SESSION_URL"),
            post_logout_redirect_url: optional("OIDC_POST_LOGOUT_REDIRECT_URL"),
            discovery_timeout: duration_or(
                "OIDC_DISCOVERY_TIMEOUT",
                optional("OIDC_DISCOVERY_TIMEOUT"),
                DEFAULT_DISCOVERY_TIMEOUT,
            ),
            request_timeout: duration_or(
                "OIDC_REQUEST_TIMEOUT",
                optional("OIDC_REQUEST_TIMEOUT"),
                DEFAULT_REQUEST_TIMEOUT,
            ),
        };

        let secret =
            optional("JWT_SECRET").ok_or_else(|| ConfigError::MissingEnvVar("JWT_SECRET".into()))?;

        let algorithm = match optional("JWT_ALGORITHM") {
            Some(raw) => JwtAlgorithm::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "JWT_ALGORITHM".to_string(),
                message: format!("unsupported algorithm '{}'", raw),
            })?,
            None => JwtAlgorithm::default(),
        };

        let token_duration = duration_or(
            "JWT_DURATION",
            optional("JWT_DURATION"),
            Duration::from_secs(DEFAULT_TOKEN_DURATION_HOURS as u64 * 3600),
        );
        let token_duration =
            chrono::Duration::from_std(token_duration).map_err(|e| ConfigError::InvalidValue {
                key: "JWT_DURATION".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            oidc,
            jwt: JwtConfig {
                secret,
                algorithm,
                token_duration,
            },
            attempt_ttl: duration_or(
                "AUTH_ATTEMPT_TTL",
                optional("AUTH_ATTEMPT_TTL"),
                DEFAULT_ATTEMPT_TTL,
            ),
        })
    }
}

fn duration_or(key: &str, raw: Option<String>, default: Duration) -> Duration {
    let Some(raw) = raw else {
        return default;
    };
    match parse_duration(&raw) {
        Some(d) if !d.is_zero() => d,
        _ => {
            warn!(key, value = %raw, default = ?default, "Invalid duration, using default");
            default
        }
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a duration such as `168h`, `1h30m`, `1.5h`, `90s` or `500ms`.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `0` is zero.
/// Returns `None` for anything else, including negative values.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input == "0" {
        return Some(Duration::ZERO);
    }
    if input.is_empty() {
        return None;
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];

        total_nanos += value * nanos_per_unit;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total_nanos.round() as u64))
}
