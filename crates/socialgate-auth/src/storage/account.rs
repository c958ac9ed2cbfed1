//! Host account directory.
//!
//! Accounts are owned by the host application. The federation core reads and
//! creates them through [`AccountDirectory`] and never deletes an account it
//! did not just create itself.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::FederationResult;

// =============================================================================
// Account Types
// =============================================================================

/// Opaque identifier of a host account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wraps a host identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A host account as seen by the federation core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Host identifier.
    pub id: AccountId,

    /// Unique login name.
    pub login: String,

    /// Name shown to other users.
    pub display_name: String,

    /// Unique email address. May be a synthetic placeholder.
    pub email: String,

    /// Whether `email` was synthesized rather than supplied by the provider.
    #[serde(default)]
    pub email_synthetic: bool,

    /// Given (first) name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    /// Family (last) name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,

    /// Personal URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// When the account was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Account {
    /// Materializes a new account from its creation request.
    ///
    /// The password is not carried over; hosts store it separately.
    #[must_use]
    pub fn from_new(id: AccountId, new: &NewAccount) -> Self {
        Self {
            id,
            login: new.login.clone(),
            display_name: new.display_name.clone(),
            email: new.email.clone(),
            email_synthetic: new.email_synthetic,
            given_name: new.given_name.clone(),
            family_name: new.family_name.clone(),
            url: new.url.clone(),
            description: new.description.clone(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Field used to look up an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountField {
    /// The host identifier.
    Id,
    /// The login name.
    Login,
    /// The email address.
    Email,
}

impl AccountField {
    /// Returns the field name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Login => "login",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for AccountField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields for an account about to be created.
#[derive(Clone, PartialEq, Eq)]
pub struct NewAccount {
    /// Unique login name.
    pub login: String,
    /// Display name.
    pub display_name: String,
    /// Unique email address.
    pub email: String,
    /// Whether `email` is a synthetic placeholder.
    pub email_synthetic: bool,
    /// Given name.
    pub given_name: Option<String>,
    /// Family name.
    pub family_name: Option<String>,
    /// Personal URL.
    pub url: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Initial random password. Never shown to the user.
    pub password: String,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("login", &self.login)
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("email_synthetic", &self.email_synthetic)
            .field("given_name", &self.given_name)
            .field("family_name", &self.family_name)
            .field("url", &self.url)
            .field("description", &self.description)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Account Directory Trait
// =============================================================================

/// Host account storage consumed by the federation core.
///
/// # Example
///
/// ```ignore
/// use socialgate_auth::storage::{AccountDirectory, AccountField};
///
/// async fn example(directory: &impl AccountDirectory) {
///     if let Some(account) = directory.find_account_by_field(AccountField::Login, "jane").await? {
///         println!("Found account: {}", account.id);
///     }
/// }
/// ```
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Finds an account by one of its unique fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_account_by_field(
        &self,
        field: AccountField,
        value: &str,
    ) -> FederationResult<Option<Account>>;

    /// Creates an account.
    ///
    /// # Errors
    ///
    /// Returns `NameTaken` if the login or email became taken since it was
    /// checked, or `AccountCreationFailed` if the host rejects the fields.
    async fn create_account(&self, account: NewAccount) -> FederationResult<Account>;

    /// Returns `true` if the login name is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn account_exists(&self, login: &str) -> FederationResult<bool>;

    /// Returns `true` if the email address is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn email_exists(&self, email: &str) -> FederationResult<bool>;

    /// Returns the number of accounts.
    ///
    /// Used to bound the unique-name search.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn account_count(&self) -> FederationResult<usize>;

    /// Removes an account that was created by a provisioning attempt which
    /// then lost the link race.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn discard_account(&self, id: &AccountId) -> FederationResult<()>;

    /// Finds an account by its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_account(&self, id: &AccountId) -> FederationResult<Option<Account>> {
        self.find_account_by_field(AccountField::Id, id.as_str())
            .await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account() -> NewAccount {
        NewAccount {
            login: "Jane Doe".to_string(),
            display_name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            email_synthetic: false,
            given_name: Some("Jane".to_string()),
            family_name: None,
            url: None,
            description: Some("hello".to_string()),
            password: "hunter2hunter2".to_string(),
        }
    }

    #[test]
    fn test_account_id_display() {
        let id = AccountId::new("42");
        assert_eq!(id.to_string(), "42");
        assert_eq!(id.as_str(), "42");
        assert_eq!(AccountId::from("42"), id);
    }

    #[test]
    fn test_new_account_debug_redacts_password() {
        let debug = format!("{:?}", new_account());
        assert!(debug.contains("Jane Doe"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_account_from_new() {
        let new = new_account();
        let account = Account::from_new(AccountId::new("7"), &new);
        assert_eq!(account.id.as_str(), "7");
        assert_eq!(account.login, "Jane Doe");
        assert_eq!(account.email, "jane@example.com");
        assert_eq!(account.description.as_deref(), Some("hello"));
        assert!(!account.email_synthetic);
    }

    #[test]
    fn test_account_serialization_skips_empty_fields() {
        let account = Account::from_new(AccountId::new("7"), &new_account());
        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["id"], "7");
        assert!(json.get("url").is_none());
        assert_eq!(json["given_name"], "Jane");
    }
}
