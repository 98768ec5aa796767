//! # HKERS API
//!
//! HTTP surface of the HKERS backend, built on axum:
//!
//! - `/auth/*`: OIDC login, callback, logout and token refresh
//! - `/api/v1/me` and `/user`: the bearer-authenticated profile
//! - `/health`: liveness
//!
//! The protocol logic lives in `hkers-auth`; this crate adds the JSON
//! envelope, the bearer gate, configuration, the SQLite user directory and
//! the administrative CLI.

pub mod cli;
pub mod config;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod server;
pub mod state;
pub mod store;

pub use config::{AppConfig, CookieConfig, CorsConfig};
pub use response::{ApiError, ApiResponse};
pub use routes::router;
pub use state::AppState;
pub use store::SqliteDirectory;
