//! Identity resolution.
//!
//! The resolver is the single gate between "returning user" and "new user".
//! It never mutates anything.

use std::sync::Arc;

use crate::FederationResult;
use crate::federation::identity::{IdentityKey, IdentityLink};
use crate::storage::{Account, AccountDirectory, IdentityLinkStore};

/// Result of looking up an identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The key is linked to an existing account.
    Found {
        /// The link.
        link: IdentityLink,
        /// The linked account.
        account: Account,
    },
    /// The key is not linked.
    NotFound,
    /// The key is linked, but the host no longer has the account.
    Dangling(IdentityLink),
}

impl Resolution {
    /// Returns the account for a `Found` resolution.
    #[must_use]
    pub fn into_account(self) -> Option<Account> {
        match self {
            Self::Found { account, .. } => Some(account),
            Self::NotFound | Self::Dangling(_) => None,
        }
    }
}

/// Looks up the local account for an identity key.
pub struct IdentityResolver {
    links: Arc<dyn IdentityLinkStore>,
    accounts: Arc<dyn AccountDirectory>,
}

impl IdentityResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(links: Arc<dyn IdentityLinkStore>, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self { links, accounts }
    }

    /// Looks up the identity key with full detail.
    ///
    /// # Errors
    ///
    /// Returns an error if either store fails.
    pub async fn lookup(&self, key: &IdentityKey) -> FederationResult<Resolution> {
        let Some(link) = self.links.find_by_key(key).await? else {
            tracing::debug!(identity_key = %key, "Identity key is not linked");
            return Ok(Resolution::NotFound);
        };

        match self.accounts.find_account(&link.account_id).await? {
            Some(account) => Ok(Resolution::Found { link, account }),
            None => {
                tracing::warn!(
                    identity_key = %key,
                    account_id = %link.account_id,
                    "Identity link points at a missing account"
                );
                Ok(Resolution::Dangling(link))
            }
        }
    }

    /// Returns the account linked to the identity key, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if either store fails.
    pub async fn resolve(&self, key: &IdentityKey) -> FederationResult<Option<Account>> {
        Ok(self.lookup(key).await?.into_account())
    }
}
