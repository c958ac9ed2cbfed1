//! In-memory identity link store.

use std::collections::HashMap;

use async_trait::async_trait;
use socialgate_auth::FederationResult;
use socialgate_auth::error::FederationError;
use socialgate_auth::federation::{
    CleanupOutcome, CredentialMetadata, IdentityKey, IdentityLink, LinkId,
};
use socialgate_auth::storage::{AccountId, IdentityLinkStore};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct LinkTable {
    by_key: HashMap<IdentityKey, IdentityLink>,
    credentials: HashMap<AccountId, CredentialMetadata>,
}

impl LinkTable {
    fn key_for(&self, link_id: LinkId) -> Option<IdentityKey> {
        self.by_key
            .values()
            .find(|link| link.link_id == link_id)
            .map(|link| link.identity_key.clone())
    }

    fn links_of(&self, account_id: &AccountId) -> usize {
        self.by_key
            .values()
            .filter(|link| &link.account_id == account_id)
            .count()
    }
}

/// Identity link store keyed by identity key.
///
/// The uniqueness check and insert of [`insert_link`](IdentityLinkStore::insert_link)
/// run under one write lock, as do the link count and credential write of the
/// conditional credential operations.
#[derive(Debug, Default)]
pub struct InMemoryLinkStore {
    table: RwLock<LinkTable>,
}

impl InMemoryLinkStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of links.
    pub async fn len(&self) -> usize {
        self.table.read().await.by_key.len()
    }

    /// Returns `true` if no links are stored.
    pub async fn is_empty(&self) -> bool {
        self.table.read().await.by_key.is_empty()
    }
}

#[async_trait]
impl IdentityLinkStore for InMemoryLinkStore {
    async fn insert_link(&self, link: IdentityLink) -> FederationResult<IdentityLink> {
        let mut table = self.table.write().await;
        if table.by_key.contains_key(&link.identity_key) {
            return Err(FederationError::LinkConflict(link.identity_key));
        }
        table.by_key.insert(link.identity_key.clone(), link.clone());
        Ok(link)
    }

    async fn find_by_key(&self, key: &IdentityKey) -> FederationResult<Option<IdentityLink>> {
        Ok(self.table.read().await.by_key.get(key).cloned())
    }

    async fn find_by_id(&self, link_id: LinkId) -> FederationResult<Option<IdentityLink>> {
        let table = self.table.read().await;
        Ok(table
            .by_key
            .values()
            .find(|link| link.link_id == link_id)
            .cloned())
    }

    async fn remove_link(&self, link_id: LinkId) -> FederationResult<Option<IdentityLink>> {
        let mut table = self.table.write().await;
        let Some(key) = table.key_for(link_id) else {
            return Ok(None);
        };
        Ok(table.by_key.remove(&key))
    }

    async fn list_links(&self, account_id: &AccountId) -> FederationResult<Vec<IdentityLink>> {
        let table = self.table.read().await;
        let mut links: Vec<IdentityLink> = table
            .by_key
            .values()
            .filter(|link| &link.account_id == account_id)
            .cloned()
            .collect();
        links.sort_by(|a, b| {
            a.linked_at
                .cmp(&b.linked_at)
                .then_with(|| a.identity_key.cmp(&b.identity_key))
        });
        Ok(links)
    }

    async fn save_credential_if_linked(
        &self,
        account_id: &AccountId,
        credential: CredentialMetadata,
    ) -> FederationResult<bool> {
        let mut table = self.table.write().await;
        if table.links_of(account_id) == 0 {
            return Ok(false);
        }
        table.credentials.insert(account_id.clone(), credential);
        Ok(true)
    }

    async fn clear_credential_if_unlinked(
        &self,
        account_id: &AccountId,
    ) -> FederationResult<CleanupOutcome> {
        let mut table = self.table.write().await;
        let remaining = table.links_of(account_id);
        let credentials_cleared =
            remaining == 0 && table.credentials.remove(account_id).is_some();
        Ok(CleanupOutcome {
            remaining,
            credentials_cleared,
        })
    }

    async fn get_credential(
        &self,
        account_id: &AccountId,
    ) -> FederationResult<Option<CredentialMetadata>> {
        Ok(self.table.read().await.credentials.get(account_id).cloned())
    }

    async fn count_links(&self, account_id: &AccountId) -> FederationResult<usize> {
        Ok(self.table.read().await.links_of(account_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socialgate_auth::federation::Principal;

    fn key(provider: &str, id: &str) -> IdentityKey {
        IdentityKey::new(provider, id).unwrap()
    }

    #[tokio::test]
    async fn test_insert_is_unique_per_key() {
        let store = InMemoryLinkStore::new();
        let account = AccountId::new("1");

        store.link(&account, &key("google", "u1")).await.unwrap();
        let err = store
            .link(&AccountId::new("2"), &key("Google", "u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FederationError::LinkConflict(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let store = InMemoryLinkStore::new();
        let account = AccountId::new("1");

        let first = store.link(&account, &key("google", "u1")).await.unwrap();
        store.link(&account, &key("facebook", "f1")).await.unwrap();
        store
            .link(&AccountId::new("2"), &key("twitter", "t1"))
            .await
            .unwrap();

        let links = store.list_links(&account).await.unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().any(|l| l.link_id == first.link_id));
        assert_eq!(store.count_links(&account).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_remove_link() {
        let store = InMemoryLinkStore::new();
        let link = store
            .link(&AccountId::new("1"), &key("google", "u1"))
            .await
            .unwrap();

        let removed = store.remove_link(link.link_id).await.unwrap();
        assert_eq!(removed, Some(link.clone()));
        assert!(store.remove_link(link.link_id).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unlink_checks_owner_and_account() {
        let store = InMemoryLinkStore::new();
        let owner = AccountId::new("1");
        let link = store.link(&owner, &key("google", "u1")).await.unwrap();

        let stranger = Principal::new(AccountId::new("2"));
        let err = store.unlink(link.link_id, &owner, &stranger).await.unwrap_err();
        assert!(matches!(err, FederationError::PermissionDenied(_)));

        // Link exists but under another account.
        let err = store
            .unlink(link.link_id, &AccountId::new("2"), &stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, FederationError::LinkNotFound(_)));
        assert_eq!(store.len().await, 1);

        let admin = Principal::new(AccountId::new("9")).with_capability("manage_users");
        let removed = store.unlink(link.link_id, &owner, &admin).await.unwrap();
        assert_eq!(removed.identity_key, key("google", "u1"));
    }

    fn credential() -> CredentialMetadata {
        CredentialMetadata {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            access_token_expiry: "3600".into(),
            access_token_issued_at: "2024-01-01T00:00:00Z".into(),
            callback: "https://app.example.com/social_login/auth".into(),
        }
    }

    #[tokio::test]
    async fn test_credentials_require_a_link() {
        let store = InMemoryLinkStore::new();
        let account = AccountId::new("1");

        assert!(
            !store
                .save_credential_if_linked(&account, credential())
                .await
                .unwrap()
        );
        assert!(store.get_credential(&account).await.unwrap().is_none());

        store.link(&account, &key("google", "u1")).await.unwrap();
        assert!(
            store
                .save_credential_if_linked(&account, credential())
                .await
                .unwrap()
        );
        assert_eq!(
            store.get_credential(&account).await.unwrap(),
            Some(credential())
        );
        assert!(
            store
                .get_credential(&AccountId::new("2"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_clear_keeps_credentials_while_linked() {
        let store = InMemoryLinkStore::new();
        let account = AccountId::new("1");
        let google = store.link(&account, &key("google", "u1")).await.unwrap();
        let twitter = store.link(&account, &key("twitter", "t1")).await.unwrap();
        store
            .save_credential_if_linked(&account, credential())
            .await
            .unwrap();

        store.remove_link(google.link_id).await.unwrap();
        let outcome = store.clear_credential_if_unlinked(&account).await.unwrap();
        assert_eq!(
            outcome,
            CleanupOutcome {
                remaining: 1,
                credentials_cleared: false
            }
        );
        assert!(store.get_credential(&account).await.unwrap().is_some());

        store.remove_link(twitter.link_id).await.unwrap();
        let outcome = store.clear_credential_if_unlinked(&account).await.unwrap();
        assert_eq!(
            outcome,
            CleanupOutcome {
                remaining: 0,
                credentials_cleared: true
            }
        );
        assert!(store.get_credential(&account).await.unwrap().is_none());

        let outcome = store.clear_credential_if_unlinked(&account).await.unwrap();
        assert!(!outcome.credentials_cleared);
    }

    #[tokio::test]
    async fn test_concurrent_unlink_never_leaves_orphaned_credentials() {
        for _ in 0..200 {
            let store = std::sync::Arc::new(InMemoryLinkStore::new());
            let account = AccountId::new("1");
            let link = store.link(&account, &key("google", "u1")).await.unwrap();

            let saver = {
                let store = store.clone();
                let account = account.clone();
                tokio::spawn(async move {
                    store.save_credential_if_linked(&account, credential()).await
                })
            };
            let remover = {
                let store = store.clone();
                let account = account.clone();
                tokio::spawn(async move {
                    store.remove_link(link.link_id).await?;
                    store.clear_credential_if_unlinked(&account).await
                })
            };
            saver.await.unwrap().unwrap();
            remover.await.unwrap().unwrap();

            assert_eq!(store.count_links(&account).await.unwrap(), 0);
            assert!(store.get_credential(&account).await.unwrap().is_none());
        }
    }
}
