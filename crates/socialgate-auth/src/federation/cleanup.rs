//! Credential cleanup after an unlink.
//!
//! Credential metadata belongs to the account. It is purged once the account
//! has no identity links left and kept while at least one link remains.

use std::sync::Arc;

use serde::Serialize;

use crate::FederationResult;
use crate::storage::{AccountId, IdentityLinkStore};

/// What the cleanup pass found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupOutcome {
    /// Links the account still has.
    pub remaining: usize,
    /// Whether credential metadata was removed.
    pub credentials_cleared: bool,
}

/// Purges orphaned credential metadata.
pub struct CleanupPolicy {
    links: Arc<dyn IdentityLinkStore>,
}

impl CleanupPolicy {
    /// Creates the policy.
    #[must_use]
    pub fn new(links: Arc<dyn IdentityLinkStore>) -> Self {
        Self { links }
    }

    /// Runs after a link of `account_id` was removed.
    ///
    /// The link count and the purge happen in one store operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn after_unlink(&self, account_id: &AccountId) -> FederationResult<CleanupOutcome> {
        let outcome = self.links.clear_credential_if_unlinked(account_id).await?;
        if outcome.credentials_cleared {
            tracing::info!(account_id = %account_id, "Cleared credentials of account without identities");
        } else {
            tracing::debug!(
                account_id = %account_id,
                remaining = outcome.remaining,
                "Credentials kept"
            );
        }
        Ok(outcome)
    }
}
