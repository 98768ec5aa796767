//! Identity resolution and account gating
//!
//! Maps a verified provider subject to a login decision. Reading
//! ("resolve") and writing ("provision") are separate steps so the common
//! case, an already-approved user, never touches the directory for writes.
//!
//! Self-service registration always produces an inactive account. An
//! administrator has to activate it before the user can log in.

use crate::directory::{DirectoryError, NewAccount, UserDirectory};
use crate::error::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// A local account, owned by the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccount {
    /// Database user ID
    pub id: i32,

    /// Email address
    pub email: Option<String>,

    /// Username
    pub username: String,

    /// OIDC subject identifier
    pub oidc_sub: String,

    /// Whether an administrator has approved the account
    pub is_active: bool,

    /// Community trust score
    pub trust_points: i32,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Identity asserted by a verified provider token.
///
/// Exists only for the duration of one callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    /// Provider's stable subject identifier
    pub subject: String,

    /// Email address
    pub email: Option<String>,

    /// Display name (`nickname`, `name` or `preferred_username`)
    pub display_name: Option<String>,
}

fn string_claim(claims: &Map<String, Value>, name: &str) -> Option<String> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl ExternalIdentity {
    /// Build from a verified claim set.
    ///
    /// # Errors
    ///
    /// Fails with `MissingClaim("sub")` when the subject is absent, empty,
    /// or not a string.
    pub fn from_claims(claims: &Map<String, Value>) -> AuthResult<Self> {
        let subject =
            string_claim(claims, "sub").ok_or_else(|| AuthError::MissingClaim("sub".to_string()))?;

        let display_name = ["nickname", "name", "preferred_username"]
            .iter()
            .find_map(|claim| string_claim(claims, claim));

        Ok(Self {
            subject,
            email: string_claim(claims, "email"),
            display_name,
        })
    }

    /// Username for a new account: display name, else the raw subject.
    pub fn username(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| self.subject.clone())
    }
}

/// Outcome of resolving a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginDecision {
    /// Active account; the user may log in
    Allowed(LocalAccount),

    /// Account exists but has not been activated
    PendingApproval,

    /// No account for this subject
    NotAllowed,
}

/// Result of provisioning an account from a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    /// The existing or newly created account
    pub account: LocalAccount,

    /// Whether this call created the account
    pub newly_created: bool,
}

/// Account-gating policy over a user directory.
#[derive(Clone)]
pub struct IdentityResolver {
    directory: Arc<dyn UserDirectory>,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver").finish_non_exhaustive()
    }
}

impl IdentityResolver {
    /// Create a resolver over the given directory.
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    /// Decide whether `subject` may log in.
    pub async fn resolve(&self, subject: &str) -> AuthResult<LoginDecision> {
        let decision = match self.directory.find_by_subject(subject).await? {
            Some(account) if account.is_active => LoginDecision::Allowed(account),
            Some(_) => LoginDecision::PendingApproval,
            None => LoginDecision::NotAllowed,
        };

        debug!(subject, ?decision, "Resolved login decision");
        Ok(decision)
    }

    /// Return the account for the identity, creating an inactive one if none
    /// exists. Idempotent.
    pub async fn provision_from_profile(
        &self,
        identity: &ExternalIdentity,
    ) -> AuthResult<Provisioned> {
        if let Some(account) = self.directory.find_by_subject(&identity.subject).await? {
            return Ok(Provisioned {
                account,
                newly_created: false,
            });
        }

        let new_account = NewAccount {
            oidc_sub: identity.subject.clone(),
            username: identity.username(),
            email: identity.email.clone(),
        };

        match self.directory.create(new_account).await {
            Ok(account) => {
                info!(
                    user_id = account.id,
                    subject = %identity.subject,
                    "Registered new account pending approval"
                );
                Ok(Provisioned {
                    account,
                    newly_created: true,
                })
            }
            Err(DirectoryError::Conflict(_)) => {
                // Lost a race with a concurrent callback for the same subject.
                let account = self
                    .directory
                    .find_by_subject(&identity.subject)
                    .await?
                    .ok_or_else(|| {
                        AuthError::Directory(format!(
                            "account for {} vanished after conflict",
                            identity.subject
                        ))
                    })?;
                Ok(Provisioned {
                    account,
                    newly_created: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
