//! Server bootstrap
//!
//! Builds the shared state from configuration, then serves the router
//! until Ctrl-C.

use crate::config::AppConfig;
use crate::routes;
use crate::state::AppState;
use anyhow::{Context, Result};
use hkers_auth::{
    AuthFlow, DiscoveredProvider, IdentityResolver, JwtService, MemoryAttemptStore, UserDirectory,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// How often expired login attempts are swept.
pub const ATTEMPT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Build the login flow and application state.
///
/// A missing JWT secret is fatal. A provider that is unconfigured or fails
/// discovery is not: the server starts and the auth endpoints answer 503.
pub async fn build_state(
    config: &AppConfig,
    directory: Arc<dyn UserDirectory>,
    attempts: Arc<MemoryAttemptStore>,
) -> Result<AppState> {
    let tokens = JwtService::new(config.auth.jwt.clone()).context("invalid JWT configuration")?;

    let mut flow = AuthFlow::new(
        IdentityResolver::new(directory.clone()),
        Arc::new(tokens),
        attempts,
    )
    .with_attempt_ttl(config.auth.attempt_ttl);

    match DiscoveredProvider::discover(&config.auth.oidc).await {
        Ok(provider) => {
            info!(issuer = %config.auth.oidc.issuer, "OIDC authentication enabled");
            flow = flow.with_provider(Arc::new(provider));
        }
        Err(e) => {
            error!(error = %e, "OIDC authentication disabled, auth endpoints will return 503");
        }
    }

    Ok(AppState::new(flow, directory, config.cookie.clone()))
}

/// Periodically drop expired login attempts.
pub fn spawn_attempt_purge(attempts: Arc<MemoryAttemptStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ATTEMPT_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = attempts.purge_expired().await;
            if purged > 0 {
                debug!(purged, "Purged expired login attempts");
            }
        }
    })
}

/// Serve until Ctrl-C.
pub async fn run(
    config: AppConfig,
    directory: Arc<dyn UserDirectory>,
    host: &str,
    port: u16,
) -> Result<()> {
    let attempts = Arc::new(MemoryAttemptStore::new());
    let state = build_state(&config, directory, attempts.clone()).await?;
    let purge = spawn_attempt_purge(attempts);

    let app = routes::router(state, config.cors.layer());

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "HKERS API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    purge.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
