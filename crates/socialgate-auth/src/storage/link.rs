//! Identity link storage.
//!
//! Links map an [`IdentityKey`] to exactly one account. Credential metadata
//! is stored next to the links but is scoped to the account, not to a link,
//! and exists only while the account has at least one link.

use async_trait::async_trait;

use crate::FederationResult;
use crate::error::FederationError;
use crate::federation::cleanup::CleanupOutcome;
use crate::federation::{CredentialMetadata, IdentityKey, IdentityLink, LinkId, Principal};
use crate::storage::AccountId;

/// Storage operations for identity links and account credentials.
///
/// # Atomicity
///
/// [`insert_link`](IdentityLinkStore::insert_link) must fail with
/// `LinkConflict` when a link for the same key already exists, and the check
/// and the insert must happen as one step. Concurrent handshakes for the same
/// new identity rely on this to detect that they lost the race.
///
/// [`save_credential_if_linked`](IdentityLinkStore::save_credential_if_linked)
/// and [`clear_credential_if_unlinked`](IdentityLinkStore::clear_credential_if_unlinked)
/// must likewise count the account's links and write the credential under one
/// lock or transaction, so a concurrent link or unlink cannot leave
/// credentials on an account without links.
///
/// # Example
///
/// ```ignore
/// use socialgate_auth::storage::IdentityLinkStore;
///
/// async fn example(store: &impl IdentityLinkStore, key: &IdentityKey) {
///     if let Some(link) = store.find_by_key(key).await? {
///         println!("{} belongs to {}", key, link.account_id);
///     }
/// }
/// ```
#[async_trait]
pub trait IdentityLinkStore: Send + Sync {
    /// Inserts a link unless one already exists for its key.
    ///
    /// # Errors
    ///
    /// Returns `LinkConflict` if the key is already linked, or an error if
    /// the storage operation fails.
    async fn insert_link(&self, link: IdentityLink) -> FederationResult<IdentityLink>;

    /// Finds the link for an identity key.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_key(&self, key: &IdentityKey) -> FederationResult<Option<IdentityLink>>;

    /// Finds a link by its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, link_id: LinkId) -> FederationResult<Option<IdentityLink>>;

    /// Removes a link, returning it if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove_link(&self, link_id: LinkId) -> FederationResult<Option<IdentityLink>>;

    /// Lists the links of an account, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_links(&self, account_id: &AccountId) -> FederationResult<Vec<IdentityLink>>;

    /// Stores (replacing) the credential metadata of an account, provided the
    /// account still has at least one link.
    ///
    /// Returns `true` if the metadata was stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn save_credential_if_linked(
        &self,
        account_id: &AccountId,
        credential: CredentialMetadata,
    ) -> FederationResult<bool>;

    /// Removes the credential metadata of an account if it has no links left.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn clear_credential_if_unlinked(
        &self,
        account_id: &AccountId,
    ) -> FederationResult<CleanupOutcome>;

    /// Returns the credential metadata of an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_credential(
        &self,
        account_id: &AccountId,
    ) -> FederationResult<Option<CredentialMetadata>>;

    /// Counts the links of an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn count_links(&self, account_id: &AccountId) -> FederationResult<usize> {
        Ok(self.list_links(account_id).await?.len())
    }

    /// Links an identity key to an account.
    ///
    /// # Errors
    ///
    /// Returns `LinkConflict` if the key is already linked.
    async fn link(
        &self,
        account_id: &AccountId,
        key: &IdentityKey,
    ) -> FederationResult<IdentityLink> {
        self.insert_link(IdentityLink::new(account_id.clone(), key.clone()))
            .await
    }

    /// Removes a link on behalf of a principal.
    ///
    /// The link must belong to `account_id`, and the principal must own that
    /// account or hold the manage-users capability. Nothing is mutated when
    /// either check fails.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` or `LinkNotFound`.
    async fn unlink(
        &self,
        link_id: LinkId,
        account_id: &AccountId,
        principal: &Principal,
    ) -> FederationResult<IdentityLink> {
        if !principal.may_manage(account_id) {
            return Err(FederationError::PermissionDenied(format!(
                "account {} may not manage identities of account {}",
                principal.account_id, account_id
            )));
        }

        match self.find_by_id(link_id).await? {
            Some(link) if &link.account_id == account_id => {}
            _ => return Err(FederationError::LinkNotFound(link_id.to_string())),
        }

        self.remove_link(link_id)
            .await?
            .ok_or_else(|| FederationError::LinkNotFound(link_id.to_string()))
    }
}
