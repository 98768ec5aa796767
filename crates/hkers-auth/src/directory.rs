//! User directory contract
//!
//! The directory owns local accounts. This crate only reads accounts by
//! subject and asks for inactive accounts to be created; activation is an
//! administrative action performed outside the login flow.

use crate::error::AuthError;
use crate::identity::LocalAccount;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Directory error types.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// An account already exists for this subject
    #[error("Account already exists for subject: {0}")]
    Conflict(String),

    /// No account with this ID
    #[error("Account not found: {0}")]
    NotFound(i32),

    /// Storage backend failure
    #[error("Directory backend error: {0}")]
    Backend(String),
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        AuthError::Directory(err.to_string())
    }
}

/// Attributes for a new account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    /// OIDC subject identifier
    pub oidc_sub: String,

    /// Username
    pub username: String,

    /// Email, if the provider supplied one
    pub email: Option<String>,
}

/// Account storage used by the identity resolver.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up an account by OIDC subject, active or not.
    async fn find_by_subject(&self, oidc_sub: &str) -> DirectoryResult<Option<LocalAccount>>;

    /// Look up an account by ID.
    async fn find_by_id(&self, id: i32) -> DirectoryResult<Option<LocalAccount>>;

    /// Create an inactive account with zero trust points.
    ///
    /// Fails with [`DirectoryError::Conflict`] if the subject is taken.
    async fn create(&self, account: NewAccount) -> DirectoryResult<LocalAccount>;

    /// Set the active flag and return the updated account.
    async fn set_active(&self, id: i32, active: bool) -> DirectoryResult<LocalAccount>;

    /// All accounts ordered by ID.
    async fn list(&self) -> DirectoryResult<Vec<LocalAccount>>;
}

#[derive(Default)]
struct MemoryDirectoryInner {
    accounts: HashMap<i32, LocalAccount>,
    by_subject: HashMap<String, i32>,
    next_id: i32,
}

/// In-memory user directory.
///
/// Suitable for tests and throwaway deployments; nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<RwLock<MemoryDirectoryInner>>,
}

impl std::fmt::Debug for MemoryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDirectory").finish_non_exhaustive()
    }
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub async fn len(&self) -> usize {
        self.inner.read().await.accounts.len()
    }

    /// Whether the directory holds no accounts.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.accounts.is_empty()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_by_subject(&self, oidc_sub: &str) -> DirectoryResult<Option<LocalAccount>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_subject
            .get(oidc_sub)
            .and_then(|id| inner.accounts.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: i32) -> DirectoryResult<Option<LocalAccount>> {
        Ok(self.inner.read().await.accounts.get(&id).cloned())
    }

    async fn create(&self, account: NewAccount) -> DirectoryResult<LocalAccount> {
        let mut inner = self.inner.write().await;
        if inner.by_subject.contains_key(&account.oidc_sub) {
            return Err(DirectoryError::Conflict(account.oidc_sub));
        }

        inner.next_id += 1;
        let created = LocalAccount {
            id: inner.next_id,
            email: account.email,
            username: account.username,
            oidc_sub: account.oidc_sub,
            is_active: false,
            trust_points: 0,
            created_at: Utc::now(),
        };

        inner
            .by_subject
            .insert(created.oidc_sub.clone(), created.id);
        inner.accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_active(&self, id: i32, active: bool) -> DirectoryResult<LocalAccount> {
        let mut inner = self.inner.write().await;
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or(DirectoryError::NotFound(id))?;
        account.is_active = active;
        Ok(account.clone())
    }

    async fn list(&self) -> DirectoryResult<Vec<LocalAccount>> {
        let inner = self.inner.read().await;
        let mut accounts: Vec<LocalAccount> = inner.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.id);
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(sub: &str) -> NewAccount {
        NewAccount {
            oidc_sub: sub.to_string(),
            username: format!("user-{}", sub),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_create_is_inactive() {
        let directory = MemoryDirectory::new();
        let account = directory.create(new_account("sub-1")).await.unwrap();

        assert_eq!(account.id, 1);
        assert!(!account.is_active);
        assert_eq!(account.trust_points, 0);
        assert_eq!(
            directory.find_by_subject("sub-1").await.unwrap(),
            Some(account)
        );
    }

    #[tokio::test]
    async fn test_duplicate_subject_conflicts() {
        let directory = MemoryDirectory::new();
        directory.create(new_account("sub-1")).await.unwrap();

        let result = directory.create(new_account("sub-1")).await;
        assert!(matches!(result, Err(DirectoryError::Conflict(_))));
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_set_active() {
        let directory = MemoryDirectory::new();
        let account = directory.create(new_account("sub-1")).await.unwrap();

        let activated = directory.set_active(account.id, true).await.unwrap();
        assert!(activated.is_active);

        let missing = directory.set_active(99, true).await;
        assert!(matches!(missing, Err(DirectoryError::NotFound(99))));
    }

    #[tokio::test]
    async fn test_list_is_ordered() {
        let directory = MemoryDirectory::new();
        for sub in ["c", "a", "b"] {
            directory.create(new_account(sub)).await.unwrap();
        }

        let ids: Vec<i32> = directory.list().await.unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
