//! Server configuration
//!
//! HTTP-layer settings (session cookie, CORS) plus the auth core's own
//! [`AuthConfig`]. Loaded from environment variables once at startup.

use axum::http::{HeaderName, HeaderValue, Method};
use hkers_auth::{split_list, AuthConfig, ConfigError};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

/// Browser key cookie settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieConfig {
    /// Cookie name
    pub name: String,

    /// Whether to set the `Secure` attribute
    pub secure: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "auth-session".to_string(),
            secure: false,
        }
    }
}

/// CORS policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    /// Accept any origin
    pub allow_all_origins: bool,

    /// Accepted origins when not accepting all
    pub allow_origins: Vec<String>,

    /// Allowed methods
    pub allow_methods: Vec<String>,

    /// Allowed request headers
    pub allow_headers: Vec<String>,

    /// Response headers exposed to scripts
    pub expose_headers: Vec<String>,

    /// Allow cookies and authorization headers
    pub allow_credentials: bool,

    /// Preflight cache lifetime
    pub max_age: Duration,
}

impl Default for CorsConfig {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            allow_all_origins: true,
            allow_origins: Vec::new(),
            allow_methods: list(&["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]),
            allow_headers: list(&["Origin", "Content-Type", "Accept", "Authorization"]),
            expose_headers: list(&["Content-Length"]),
            allow_credentials: true,
            max_age: Duration::from_secs(12 * 3600),
        }
    }
}

impl CorsConfig {
    /// Build the tower-http layer.
    ///
    /// With credentials enabled a wildcard origin is not allowed by
    /// browsers, so "all origins" mirrors the request origin instead.
    /// Unparsable entries are skipped with a warning.
    pub fn layer(&self) -> CorsLayer {
        let origin = if self.allow_all_origins {
            if self.allow_credentials {
                AllowOrigin::mirror_request()
            } else {
                AllowOrigin::any()
            }
        } else {
            AllowOrigin::list(parse_all(&self.allow_origins, "CORS_ALLOW_ORIGINS", |s| {
                HeaderValue::from_str(s).ok()
            }))
        };

        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(parse_all(&self.allow_methods, "CORS_ALLOW_METHODS", |s| {
                Method::from_bytes(s.to_uppercase().as_bytes()).ok()
            }))
            .allow_headers(parse_all(&self.allow_headers, "CORS_ALLOW_HEADERS", |s| {
                HeaderName::from_bytes(s.as_bytes()).ok()
            }))
            .expose_headers(parse_all(&self.expose_headers, "CORS_EXPOSE_HEADERS", |s| {
                HeaderName::from_bytes(s.as_bytes()).ok()
            }))
            .allow_credentials(self.allow_credentials)
            .max_age(self.max_age)
    }
}

fn parse_all<T>(items: &[String], key: &str, parse: impl Fn(&str) -> Option<T>) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| {
            let parsed = parse(item);
            if parsed.is_none() {
                warn!(key, value = %item, "Ignoring invalid CORS entry");
            }
            parsed
        })
        .collect()
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Browser key cookie
    pub cookie: CookieConfig,

    /// CORS policy
    pub cors: CorsConfig,

    /// Auth core settings
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables (besides those read by [`AuthConfig`]):
    /// - `SESSION_COOKIE_NAME`: browser key cookie (default: auth-session)
    /// - `SESSION_COOKIE_SECURE`: set `Secure` on the cookie (default: false)
    /// - `CORS_ALLOW_ALL_ORIGINS`: default true
    /// - `CORS_ALLOW_ORIGINS`: comma-separated origins
    /// - `CORS_ALLOW_METHODS`, `CORS_ALLOW_HEADERS`, `CORS_EXPOSE_HEADERS`
    /// - `CORS_ALLOW_CREDENTIALS`: default true
    /// - `CORS_MAX_AGE`: seconds (default: 43200)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let flag = |key: &str, default: bool| {
            optional(key)
                .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(default)
        };
        let list = |key: &str, default: Vec<String>| {
            optional(key).map(|v| split_list(&v)).unwrap_or(default)
        };

        let cookie_default = CookieConfig::default();
        let cookie = CookieConfig {
            name: optional("SESSION_COOKIE_NAME").unwrap_or(cookie_default.name),
            secure: flag("SESSION_COOKIE_SECURE", cookie_default.secure),
        };

        let cors_default = CorsConfig::default();
        let max_age = match optional("CORS_MAX_AGE").map(|v| v.parse::<i64>()) {
            Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs as u64),
            Some(_) => {
                warn!("Invalid CORS_MAX_AGE, using default");
                cors_default.max_age
            }
            None => cors_default.max_age,
        };
        let cors = CorsConfig {
            allow_all_origins: flag("CORS_ALLOW_ALL_ORIGINS", cors_default.allow_all_origins),
            allow_origins: list("CORS_ALLOW_ORIGINS", cors_default.allow_origins),
            allow_methods: list("CORS_ALLOW_METHODS", cors_default.allow_methods),
            allow_headers: list("CORS_ALLOW_HEADERS", cors_default.allow_headers),
            expose_headers: list("CORS_EXPOSE_HEADERS", cors_default.expose_headers),
            allow_credentials: flag("CORS_ALLOW_CREDENTIALS", cors_default.allow_credentials),
            max_age,
        };

        Ok(Self {
            cookie,
            cors,
            auth: AuthConfig::from_lookup(&lookup)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("JWT_SECRET", "secret")]).unwrap();

        assert_eq!(config.cookie, CookieConfig::default());
        assert_eq!(config.cors, CorsConfig::default());
        assert_eq!(config.cors.max_age, Duration::from_secs(43200));
        assert!(config.cors.allow_all_origins);
    }

    #[test]
    fn test_cors_overrides() {
        let config = load(&[
            ("JWT_SECRET", "secret"),
            ("CORS_ALLOW_ALL_ORIGINS", "false"),
            ("CORS_ALLOW_ORIGINS", "https://a.example.com, https://b.example.com"),
            ("CORS_ALLOW_CREDENTIALS", "0"),
            ("CORS_MAX_AGE", "600"),
        ])
        .unwrap();

        assert!(!config.cors.allow_all_origins);
        assert_eq!(
            config.cors.allow_origins,
            vec!["https://a.example.com", "https://b.example.com"]
        );
        assert!(!config.cors.allow_credentials);
        assert_eq!(config.cors.max_age, Duration::from_secs(600));

        // Builds without panicking
        let _ = config.cors.layer();
    }

    #[test]
    fn test_non_positive_max_age_falls_back() {
        let config = load(&[("JWT_SECRET", "secret"), ("CORS_MAX_AGE", "-5")]).unwrap();
        assert_eq!(config.cors.max_age, Duration::from_secs(43200));
    }

    #[test]
    fn test_cookie_settings() {
        let config = load(&[
            ("JWT_SECRET", "secret"),
            ("SESSION_COOKIE_NAME", "hkers-login"),
            ("SESSION_COOKIE_SECURE", "true"),
        ])
        .unwrap();
        assert_eq!(config.cookie.name, "hkers-login");
        assert!(config.cookie.secure);
    }

    #[test]
    fn test_requires_jwt_secret() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn test_default_cors_layer_builds() {
        let _ = CorsConfig::default().layer();
    }
}
