//! In-memory session manager.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use socialgate_auth::FederationResult;
use socialgate_auth::federation::Principal;
use socialgate_auth::storage::{Account, AccountId, SessionGrant, SessionManager};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default session lifetime (8 hours).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Session manager using papaya lock-free HashMap for session lookups.
///
/// Capabilities granted to an account are attached to every principal
/// resolved from its sessions.
#[derive(Debug)]
pub struct InMemorySessionManager {
    sessions: PapayaHashMap<String, SessionGrant>,
    capabilities: RwLock<HashMap<AccountId, BTreeSet<String>>>,
    ttl: Duration,
}

impl Default for InMemorySessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl InMemorySessionManager {
    /// Creates a session manager issuing sessions valid for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: PapayaHashMap::new(),
            capabilities: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Grants a capability (e.g. `manage_users`) to an account.
    pub async fn grant_capability(&self, account_id: &AccountId, capability: impl Into<String>) {
        self.capabilities
            .write()
            .await
            .entry(account_id.clone())
            .or_default()
            .insert(capability.into());
    }

    /// Ends a session. Returns `true` if it existed.
    pub fn end_session(&self, session_id: &str) -> bool {
        self.sessions.pin().remove(session_id).is_some()
    }

    /// Returns the number of live sessions, pruning expired ones.
    pub fn active_sessions(&self) -> usize {
        let guard = self.sessions.pin();
        guard.retain(|_, grant| !grant.is_expired());
        guard.len()
    }
}

#[async_trait]
impl SessionManager for InMemorySessionManager {
    async fn establish_session(&self, account: &Account) -> FederationResult<SessionGrant> {
        let grant = SessionGrant {
            session_id: Uuid::new_v4().simple().to_string(),
            account_id: account.id.clone(),
            expires_at: OffsetDateTime::now_utc() + self.ttl,
        };
        self.sessions
            .pin()
            .insert(grant.session_id.clone(), grant.clone());

        tracing::debug!(account_id = %account.id, "Session established");
        Ok(grant)
    }

    async fn principal_for_session(&self, session_id: &str) -> FederationResult<Option<Principal>> {
        let grant = {
            let guard = self.sessions.pin();
            match guard.get(session_id) {
                Some(grant) if grant.is_expired() => {
                    guard.remove(session_id);
                    return Ok(None);
                }
                Some(grant) => grant.clone(),
                None => return Ok(None),
            }
        };

        let capabilities = self.capabilities.read().await;
        let principal = capabilities
            .get(&grant.account_id)
            .into_iter()
            .flatten()
            .fold(Principal::new(grant.account_id.clone()), |p, cap| {
                p.with_capability(cap.clone())
            });
        Ok(Some(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socialgate_auth::storage::NewAccount;

    fn account(id: &str) -> Account {
        Account::from_new(
            AccountId::new(id),
            &NewAccount {
                login: "jane".into(),
                display_name: "Jane".into(),
                email: "jane@example.com".into(),
                email_synthetic: false,
                given_name: None,
                family_name: None,
                url: None,
                description: None,
                password: "secret".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_session_resolves_principal() {
        let sessions = InMemorySessionManager::default();
        let grant = sessions.establish_session(&account("1")).await.unwrap();
        assert!(!grant.is_expired());

        let principal = sessions
            .principal_for_session(&grant.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(principal.account_id.as_str(), "1");
        assert!(!principal.can_manage_users());
        assert_eq!(sessions.active_sessions(), 1);
    }

    #[tokio::test]
    async fn test_capabilities_attach_to_principal() {
        let sessions = InMemorySessionManager::default();
        let admin = account("7");
        sessions.grant_capability(&admin.id, "manage_users").await;

        let grant = sessions.establish_session(&admin).await.unwrap();
        let principal = sessions
            .principal_for_session(&grant.session_id)
            .await
            .unwrap()
            .unwrap();
        assert!(principal.can_manage_users());
    }

    #[tokio::test]
    async fn test_expired_and_unknown_sessions() {
        let sessions = InMemorySessionManager::new(Duration::ZERO);
        let grant = sessions.establish_session(&account("1")).await.unwrap();

        assert!(
            sessions
                .principal_for_session(&grant.session_id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(sessions.principal_for_session("nope").await.unwrap().is_none());
        assert_eq!(sessions.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_end_session() {
        let sessions = InMemorySessionManager::default();
        let grant = sessions.establish_session(&account("1")).await.unwrap();
        assert!(sessions.end_session(&grant.session_id));
        assert!(!sessions.end_session(&grant.session_id));
    }
}
