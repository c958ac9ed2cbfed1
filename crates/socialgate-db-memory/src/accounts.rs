//! In-memory account directory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use socialgate_auth::FederationResult;
use socialgate_auth::error::FederationError;
use socialgate_auth::storage::{Account, AccountDirectory, AccountField, AccountId, NewAccount};
use tokio::sync::RwLock;

#[derive(Debug)]
struct StoredAccount {
    account: Account,
    password_hash: String,
}

/// Accounts plus case-insensitive login and email indexes.
#[derive(Debug, Default)]
struct AccountTable {
    accounts: HashMap<AccountId, StoredAccount>,
    logins: HashMap<String, AccountId>,
    emails: HashMap<String, AccountId>,
}

impl AccountTable {
    fn lookup(&self, field: AccountField, value: &str) -> Option<&StoredAccount> {
        let id = match field {
            AccountField::Id => return self.accounts.get(&AccountId::new(value)),
            AccountField::Login => self.logins.get(&value.to_lowercase())?,
            AccountField::Email => self.emails.get(&value.to_lowercase())?,
        };
        self.accounts.get(id)
    }
}

/// Account directory backed by a `RwLock`-guarded table.
///
/// Logins and emails are unique ignoring case. Account ids are sequential
/// numbers starting at 1. Initial passwords are stored as argon2id hashes.
#[derive(Debug)]
pub struct InMemoryAccountDirectory {
    table: RwLock<AccountTable>,
    next_id: AtomicU64,
}

impl Default for InMemoryAccountDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAccountDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(AccountTable::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> AccountId {
        AccountId::new(self.next_id.fetch_add(1, Ordering::SeqCst).to_string())
    }

    /// Checks a password against the stored hash.
    ///
    /// Returns `false` for unknown accounts.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the stored hash cannot be parsed.
    pub async fn verify_password(&self, id: &AccountId, password: &str) -> FederationResult<bool> {
        let table = self.table.read().await;
        let Some(stored) = table.accounts.get(id) else {
            return Ok(false);
        };

        let parsed = PasswordHash::new(&stored.password_hash)
            .map_err(|e| FederationError::storage(format!("invalid password hash: {e}")))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Lists all accounts ordered by id.
    pub async fn all_accounts(&self) -> Vec<Account> {
        let table = self.table.read().await;
        let mut accounts: Vec<Account> = table
            .accounts
            .values()
            .map(|stored| stored.account.clone())
            .collect();
        accounts.sort_by_key(|a| a.id.as_str().parse::<u64>().unwrap_or(u64::MAX));
        accounts
    }
}

fn hash_password(password: &str) -> FederationResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| FederationError::AccountCreationFailed(format!("password hashing failed: {e}")))
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn find_account_by_field(
        &self,
        field: AccountField,
        value: &str,
    ) -> FederationResult<Option<Account>> {
        let table = self.table.read().await;
        Ok(table.lookup(field, value).map(|stored| stored.account.clone()))
    }

    async fn create_account(&self, account: NewAccount) -> FederationResult<Account> {
        if account.login.trim().is_empty() {
            return Err(FederationError::AccountCreationFailed(
                "login must not be empty".to_string(),
            ));
        }
        if account.email.trim().is_empty() {
            return Err(FederationError::AccountCreationFailed(
                "email must not be empty".to_string(),
            ));
        }

        let password_hash = hash_password(&account.password)?;
        let login_key = account.login.to_lowercase();
        let email_key = account.email.to_lowercase();

        let mut table = self.table.write().await;
        if table.logins.contains_key(&login_key) {
            return Err(FederationError::name_taken(AccountField::Login, account.login));
        }
        if table.emails.contains_key(&email_key) {
            return Err(FederationError::name_taken(AccountField::Email, account.email));
        }

        let id = self.next_id();
        let created = Account::from_new(id.clone(), &account);
        table.logins.insert(login_key, id.clone());
        table.emails.insert(email_key, id.clone());
        table.accounts.insert(
            id,
            StoredAccount {
                account: created.clone(),
                password_hash,
            },
        );

        tracing::debug!(account_id = %created.id, login = %created.login, "Account created");
        Ok(created)
    }

    async fn account_exists(&self, login: &str) -> FederationResult<bool> {
        let table = self.table.read().await;
        Ok(table.logins.contains_key(&login.to_lowercase()))
    }

    async fn email_exists(&self, email: &str) -> FederationResult<bool> {
        let table = self.table.read().await;
        Ok(table.emails.contains_key(&email.to_lowercase()))
    }

    async fn account_count(&self) -> FederationResult<usize> {
        Ok(self.table.read().await.accounts.len())
    }

    async fn discard_account(&self, id: &AccountId) -> FederationResult<()> {
        let mut table = self.table.write().await;
        if let Some(stored) = table.accounts.remove(id) {
            table.logins.remove(&stored.account.login.to_lowercase());
            table.emails.remove(&stored.account.email.to_lowercase());
            tracing::debug!(account_id = %id, "Account discarded");
        }
        Ok(())
    }
}
