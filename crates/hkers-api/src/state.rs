//! Shared application state

use crate::config::CookieConfig;
use hkers_auth::{AuthFlow, UserDirectory};
use std::sync::Arc;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Login flow orchestrator
    pub flow: AuthFlow,

    /// User directory
    pub directory: Arc<dyn UserDirectory>,

    /// Browser key cookie settings
    pub cookie: CookieConfig,
}

impl AppState {
    /// Bundle the pieces built at startup.
    pub fn new(flow: AuthFlow, directory: Arc<dyn UserDirectory>, cookie: CookieConfig) -> Self {
        Self {
            flow,
            directory,
            cookie,
        }
    }
}
