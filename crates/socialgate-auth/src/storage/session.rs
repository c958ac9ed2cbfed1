//! Host session collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::FederationResult;
use crate::federation::Principal;
use crate::storage::{Account, AccountId};

/// A session issued by the host after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGrant {
    /// Opaque session handle, sent to the browser as a cookie.
    pub session_id: String,

    /// The signed-in account.
    pub account_id: AccountId,

    /// When the session stops being valid.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl SessionGrant {
    /// Returns `true` if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }
}

/// Session operations provided by the host.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Signs the account in.
    ///
    /// Called exactly once per successful handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be stored.
    async fn establish_session(&self, account: &Account) -> FederationResult<SessionGrant>;

    /// Resolves the principal behind a session handle.
    ///
    /// Returns `None` for unknown or expired sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn principal_for_session(&self, session_id: &str) -> FederationResult<Option<Principal>>;
}
