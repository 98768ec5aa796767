//! HTTP routes
//!
//! | Method | Path | Auth |
//! |---|---|---|
//! | GET, HEAD | `/`, `/health` | none |
//! | GET | `/auth/login` | none |
//! | GET | `/auth/callback` | state + PKCE |
//! | POST | `/auth/logout` | optional bearer |
//! | POST | `/auth/refresh` | bearer |
//! | GET | `/api/v1/me`, `/user` | bearer |

pub mod auth;
pub mod health;
pub mod user;

use crate::middleware::require_bearer;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    let protected = Router::new()
        .route("/api/v1/me", get(user::me))
        .route("/user", get(user::me))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));

    Router::new()
        .route("/", get(health::health))
        .route("/health", get(health::health))
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/refresh", post(auth::refresh))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
