//! Transient storage for in-flight login attempts
//!
//! A login attempt (CSRF state + PKCE verifier) lives between the redirect
//! to the provider and the callback. It is keyed by an opaque browser key
//! and must expire on its own so abandoned flows do not retain verifiers.
//!
//! The storage engine is pluggable through [`AttemptStore`]. The in-memory
//! implementation here is suitable for single-process deployments and tests.

use crate::error::AuthResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// One login attempt awaiting its callback.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationAttempt {
    /// CSRF state sent to the provider
    pub state: String,

    /// PKCE code verifier
    pub code_verifier: String,

    /// Created timestamp (Unix seconds)
    pub created_at: i64,
}

impl AuthorizationAttempt {
    /// Create an attempt stamped with the current time.
    pub fn new(state: impl Into<String>, code_verifier: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            code_verifier: code_verifier.into(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

impl std::fmt::Debug for AuthorizationAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationAttempt")
            .field("state", &"[REDACTED]")
            .field("code_verifier", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Key-value store for login attempts with per-entry time-to-live.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Store an attempt, replacing any previous attempt under the same key.
    async fn insert(
        &self,
        key: &str,
        attempt: AuthorizationAttempt,
        ttl: Duration,
    ) -> AuthResult<()>;

    /// Fetch a live attempt. Expired entries are reported as absent.
    async fn get(&self, key: &str) -> AuthResult<Option<AuthorizationAttempt>>;

    /// Delete an attempt. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> AuthResult<()>;
}

struct StoredAttempt {
    attempt: AuthorizationAttempt,
    expires_at: Instant,
}

/// In-memory attempt store.
#[derive(Clone, Default)]
pub struct MemoryAttemptStore {
    entries: Arc<RwLock<HashMap<String, StoredAttempt>>>,
}

impl std::fmt::Debug for MemoryAttemptStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAttemptStore").finish_non_exhaustive()
    }
}

impl MemoryAttemptStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry and return how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, stored| stored.expires_at > now);
        before - entries.len()
    }

    /// Number of stored entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn insert(
        &self,
        key: &str,
        attempt: AuthorizationAttempt,
        ttl: Duration,
    ) -> AuthResult<()> {
        let stored = StoredAttempt {
            attempt,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), stored);
        Ok(())
    }

    async fn get(&self, key: &str) -> AuthResult<Option<AuthorizationAttempt>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|stored| stored.expires_at > Instant::now())
            .map(|stored| stored.attempt.clone()))
    }

    async fn remove(&self, key: &str) -> AuthResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_get_remove() {
        let store = MemoryAttemptStore::new();
        let attempt = AuthorizationAttempt::new("state-1", "verifier-1");

        store
            .insert("browser-a", attempt.clone(), Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(store.get("browser-a").await.unwrap(), Some(attempt));
        assert_eq!(store.get("browser-b").await.unwrap(), None);

        store.remove("browser-a").await.unwrap();
        assert_eq!(store.get("browser-a").await.unwrap(), None);

        // Removing again is fine
        store.remove("browser-a").await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_replaces_previous_attempt() {
        let store = MemoryAttemptStore::new();
        let ttl = Duration::from_secs(600);

        store
            .insert("browser", AuthorizationAttempt::new("old", "v1"), ttl)
            .await
            .unwrap();
        store
            .insert("browser", AuthorizationAttempt::new("new", "v2"), ttl)
            .await
            .unwrap();

        let current = store.get("browser").await.unwrap().unwrap();
        assert_eq!(current.state, "new");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryAttemptStore::new();
        store
            .insert(
                "browser",
                AuthorizationAttempt::new("s", "v"),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get("browser").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("browser").await.unwrap().is_none());

        assert_eq!(store.purge_expired().await, 1);
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let attempt = AuthorizationAttempt::new("csrf-value", "verifier-value");
        let output = format!("{:?}", attempt);
        assert!(!output.contains("csrf-value"));
        assert!(!output.contains("verifier-value"));
    }
}
