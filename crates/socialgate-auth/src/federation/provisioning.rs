//! Account provisioning for unseen identities.
//!
//! When the resolver reports that an identity key is not linked,
//! [`AccountProvisioner::provision`]:
//!
//! 1. **Picks a login name** - the profile username, else
//!    `<username>-<Provider>`, else `<username>-<Provider>-<n>`
//! 2. **Picks an email** - the resolved email, else `<local>-<n>@<domain>`
//! 3. **Creates the account** with a random password
//! 4. **Links the identity** with the store's atomic insert
//!
//! Both name searches re-check the directory on every attempt and stop after
//! `account_count + 1` candidates. A name taken between the check and the
//! insert restarts both searches. If the link insert loses a race with a
//! concurrent handshake for the same key, the new account is discarded and
//! the winner's account is returned instead.
//!
//! # Example
//!
//! ```ignore
//! use socialgate_auth::federation::provisioning::AccountProvisioner;
//!
//! let provisioner = AccountProvisioner::new(accounts, links);
//! let outcome = provisioner.provision(&profile).await?;
//! println!("Signed in as {}", outcome.account().login);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::FederationResult;
use crate::error::FederationError;
use crate::federation::identity::IdentityLink;
use crate::federation::profile::Profile;
use crate::federation::resolver::{IdentityResolver, Resolution};
use crate::storage::{Account, AccountDirectory, IdentityLinkStore, NewAccount};

/// Number of random bytes in a generated password.
const PASSWORD_BYTES: usize = 18;

/// Generates a random password for a provisioned account.
///
/// The password is never shown to the user; the host's reset flow is the way
/// to set a known one.
#[must_use]
pub fn generate_password() -> String {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let mut bytes = [0u8; PASSWORD_BYTES];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Result of provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// A new account was created and linked.
    Created {
        /// The new account.
        account: Account,
        /// The new link.
        link: IdentityLink,
    },

    /// A concurrent handshake linked the key first; its account is used.
    JoinedExisting {
        /// The winner's account.
        account: Account,
        /// The winner's link.
        link: IdentityLink,
    },
}

impl ProvisionOutcome {
    /// Returns the account the identity is now linked to.
    #[must_use]
    pub fn account(&self) -> &Account {
        match self {
            Self::Created { account, .. } | Self::JoinedExisting { account, .. } => account,
        }
    }

    /// Returns the link.
    #[must_use]
    pub fn link(&self) -> &IdentityLink {
        match self {
            Self::Created { link, .. } | Self::JoinedExisting { link, .. } => link,
        }
    }

    /// Consumes the outcome, returning the account.
    #[must_use]
    pub fn into_account(self) -> Account {
        match self {
            Self::Created { account, .. } | Self::JoinedExisting { account, .. } => account,
        }
    }

    /// Returns `true` if a new account was created.
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

impl fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { .. } => write!(f, "created"),
            Self::JoinedExisting { .. } => write!(f, "joined_existing"),
        }
    }
}

/// Creates accounts for identities that are not linked yet.
pub struct AccountProvisioner {
    accounts: Arc<dyn AccountDirectory>,
    links: Arc<dyn IdentityLinkStore>,
    resolver: IdentityResolver,
}

impl AccountProvisioner {
    /// Creates a provisioner.
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountDirectory>, links: Arc<dyn IdentityLinkStore>) -> Self {
        let resolver = IdentityResolver::new(links.clone(), accounts.clone());
        Self {
            accounts,
            links,
            resolver,
        }
    }

    /// Returns a free login name derived from `base`.
    ///
    /// # Errors
    ///
    /// Returns `UniqueNameExhausted` if no candidate was free within the
    /// bound, or a storage error.
    pub async fn unique_login(&self, base: &str, provider: &str) -> FederationResult<String> {
        let base = base.trim();
        if !self.accounts.account_exists(base).await? {
            return Ok(base.to_string());
        }

        let bound = self.accounts.account_count().await? + 1;
        let first = format!("{base}-{provider}");
        for n in 0..bound {
            let candidate = if n == 0 {
                first.clone()
            } else {
                format!("{first}-{n}")
            };
            if !self.accounts.account_exists(&candidate).await? {
                tracing::debug!(base = %base, login = %candidate, "Login name was taken, using suffix");
                return Ok(candidate);
            }
        }

        tracing::error!(base = %base, attempts = bound, "Unique login search exhausted");
        Err(FederationError::UniqueNameExhausted {
            field: "login",
            base: base.to_string(),
            attempts: bound,
        })
    }

    /// Returns a free email address derived from `email`.
    ///
    /// Collisions are resolved by inserting `-<n>` before the `@`, with `n`
    /// starting at 1.
    ///
    /// # Errors
    ///
    /// Returns `UniqueNameExhausted` if no candidate was free within the
    /// bound, or a storage error.
    pub async fn unique_email(&self, email: &str) -> FederationResult<String> {
        let email = email.trim();
        if !self.accounts.email_exists(email).await? {
            return Ok(email.to_string());
        }

        let (local, domain) = email.rsplit_once('@').unwrap_or((email, ""));
        let bound = self.accounts.account_count().await? + 1;
        for n in 1..=bound {
            let candidate = if domain.is_empty() {
                format!("{local}-{n}")
            } else {
                format!("{local}-{n}@{domain}")
            };
            if !self.accounts.email_exists(&candidate).await? {
                return Ok(candidate);
            }
        }

        tracing::error!(attempts = bound, "Unique email search exhausted");
        Err(FederationError::UniqueNameExhausted {
            field: "email",
            base: email.to_string(),
            attempts: bound,
        })
    }

    /// Creates and links an account for the profile.
    ///
    /// If the host reports that the chosen login or email was taken after it
    /// was checked, both searches run again, up to `account_count + 1` times.
    ///
    /// # Errors
    ///
    /// - `AccountCreationFailed` if the host rejects the fields (no link is
    ///   created)
    /// - `LinkConflict` if another handshake linked the key first and its
    ///   account cannot be resolved
    /// - `UniqueNameExhausted` or storage errors
    pub async fn provision(&self, profile: &Profile) -> FederationResult<ProvisionOutcome> {
        let key = &profile.identity_key;
        let account = self.create_with_unique_names(profile).await?;
        tracing::info!(
            identity_key = %key,
            account_id = %account.id,
            login = %account.login,
            "Created account for new identity"
        );

        match self.links.link(&account.id, key).await {
            Ok(link) => Ok(ProvisionOutcome::Created { account, link }),
            Err(FederationError::LinkConflict(_)) => {
                tracing::warn!(
                    identity_key = %key,
                    account_id = %account.id,
                    "Lost identity link race, discarding new account"
                );
                self.discard(&account).await;

                match self.resolver.lookup(key).await? {
                    Resolution::Found { account, link } => {
                        Ok(ProvisionOutcome::JoinedExisting { account, link })
                    }
                    Resolution::NotFound | Resolution::Dangling(_) => {
                        Err(FederationError::LinkConflict(key.clone()))
                    }
                }
            }
            Err(e) => {
                self.discard(&account).await;
                Err(e)
            }
        }
    }

    async fn create_with_unique_names(&self, profile: &Profile) -> FederationResult<Account> {
        let bound = self.accounts.account_count().await? + 1;
        let mut retries = 0;

        loop {
            let login = self
                .unique_login(&profile.username, profile.provider_name())
                .await?;
            let email = self.unique_email(&profile.email.address).await?;

            let new_account = NewAccount {
                display_name: profile.display_name_or_username().to_string(),
                login,
                email,
                email_synthetic: profile.email.synthetic,
                given_name: profile.given_name.clone(),
                family_name: profile.family_name.clone(),
                url: profile.url.clone(),
                description: profile.about_me.clone(),
                password: generate_password(),
            };

            match self.accounts.create_account(new_account).await {
                Ok(account) => return Ok(account),
                Err(FederationError::NameTaken { field, value }) => {
                    retries += 1;
                    if retries > bound {
                        tracing::error!(
                            field = %field,
                            value = %value,
                            attempts = retries,
                            "Account names kept colliding"
                        );
                        return Err(FederationError::UniqueNameExhausted {
                            field: field.as_str(),
                            base: value,
                            attempts: retries,
                        });
                    }
                    tracing::debug!(
                        field = %field,
                        value = %value,
                        "Name was taken concurrently, searching again"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn discard(&self, account: &Account) {
        if let Err(e) = self.accounts.discard_account(&account.id).await {
            tracing::error!(
                account_id = %account.id,
                error = %e,
                "Failed to discard unlinked account"
            );
        }
    }
}
