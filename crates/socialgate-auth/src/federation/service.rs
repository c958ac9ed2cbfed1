//! Handshake orchestration.
//!
//! [`FederationService`] ties the adapter, normalizer, resolver, provisioner
//! and cleanup policy together behind the three operations the HTTP layer
//! needs: sign in, add an identity and remove an identity.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::FederationResult;
use crate::config::{FederationConfig, ProtocolVersion};
use crate::error::FederationError;
use crate::federation::adapter::{ProtocolAdapter, build_adapter};
use crate::federation::cleanup::{CleanupOutcome, CleanupPolicy};
use crate::federation::identity::{IdentityKey, IdentityLink, LinkId, Principal};
use crate::federation::profile::{CredentialMetadata, Profile, ProfileNormalizer};
use crate::federation::provisioning::{AccountProvisioner, ProvisionOutcome};
use crate::federation::resolver::{IdentityResolver, Resolution};
use crate::storage::{Account, AccountDirectory, AccountId, IdentityLinkStore, SessionGrant, SessionManager};

// =============================================================================
// Outcomes
// =============================================================================

/// How the handshake arrived at the signed-in account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeAction {
    /// The identity was already linked.
    Existing,
    /// A new account was provisioned.
    Created,
    /// A concurrent handshake provisioned the account first.
    JoinedExisting,
}

impl HandshakeAction {
    /// Returns `true` if a new account was created.
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }

    /// Returns `true` if an existing account was used.
    #[must_use]
    pub fn is_existing(&self) -> bool {
        matches!(self, Self::Existing | Self::JoinedExisting)
    }
}

impl fmt::Display for HandshakeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Existing => write!(f, "existing"),
            Self::Created => write!(f, "created"),
            Self::JoinedExisting => write!(f, "joined_existing"),
        }
    }
}

/// Result of a sign-in handshake.
#[derive(Debug, Clone)]
pub enum HandshakeOutcome {
    /// The request carried no token.
    NoHandshake,
    /// The provider produced no profile.
    NoProfile,
    /// The user is signed in.
    Authenticated {
        /// The signed-in account.
        account: Account,
        /// The session established by the host.
        session: SessionGrant,
        /// How the account was found.
        action: HandshakeAction,
    },
}

impl HandshakeOutcome {
    /// Returns `true` if a session was established.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// Result of linking an additional identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddIdentityOutcome {
    /// The identity is now linked to the principal's account.
    Linked(IdentityLink),
    /// The identity was already linked to the principal's account.
    AlreadyLinked(IdentityLink),
    /// The request carried no token or the provider produced no profile.
    NoProfile,
}

/// Result of removing an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedIdentity {
    /// The removed link.
    pub link_id: LinkId,
    /// The freed identity key.
    pub identity_key: IdentityKey,
    /// What the cleanup pass did.
    pub cleanup: CleanupOutcome,
}

// =============================================================================
// Service
// =============================================================================

/// Federation handshake and identity management service.
///
/// # Example
///
/// ```ignore
/// use socialgate_auth::federation::{FederationService, HandshakeOutcome};
///
/// let service = FederationService::from_config(&config, accounts, links, sessions)?;
/// match service.authenticate(Some("abc123")).await? {
///     HandshakeOutcome::Authenticated { account, .. } => println!("Welcome {}", account.login),
///     _ => println!("No sign-in"),
/// }
/// ```
pub struct FederationService {
    adapter: Arc<dyn ProtocolAdapter>,
    normalizer: ProfileNormalizer,
    resolver: IdentityResolver,
    provisioner: AccountProvisioner,
    cleanup: CleanupPolicy,
    accounts: Arc<dyn AccountDirectory>,
    links: Arc<dyn IdentityLinkStore>,
    sessions: Arc<dyn SessionManager>,
}

impl FederationService {
    /// Creates the service around an adapter and the host collaborators.
    #[must_use]
    pub fn new(
        adapter: Arc<dyn ProtocolAdapter>,
        accounts: Arc<dyn AccountDirectory>,
        links: Arc<dyn IdentityLinkStore>,
        sessions: Arc<dyn SessionManager>,
    ) -> Self {
        Self {
            normalizer: ProfileNormalizer::new(adapter.version()),
            resolver: IdentityResolver::new(links.clone(), accounts.clone()),
            provisioner: AccountProvisioner::new(accounts.clone(), links.clone()),
            cleanup: CleanupPolicy::new(links.clone()),
            adapter,
            accounts,
            links,
            sessions,
        }
    }

    /// Creates the service with the adapter selected by configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` if the configured domain fails validation.
    pub fn from_config(
        config: &FederationConfig,
        accounts: Arc<dyn AccountDirectory>,
        links: Arc<dyn IdentityLinkStore>,
        sessions: Arc<dyn SessionManager>,
    ) -> FederationResult<Self> {
        Ok(Self::new(build_adapter(config)?, accounts, links, sessions))
    }

    /// Returns the protocol version in use.
    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.adapter.version()
    }

    /// Returns the identity resolver.
    #[must_use]
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    async fn fetch_profile(&self, token: Option<&str>) -> FederationResult<Option<Profile>> {
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let Some(payload) = self.adapter.exchange(token).await? else {
            return Ok(None);
        };

        self.normalizer.normalize(&payload).map(Some)
    }

    /// Runs a sign-in handshake.
    ///
    /// # Errors
    ///
    /// Returns any provider, profile, provisioning or storage error. Nothing
    /// is created or modified when the provider call fails.
    pub async fn authenticate(&self, token: Option<&str>) -> FederationResult<HandshakeOutcome> {
        if token.is_none_or(|t| t.trim().is_empty()) {
            return Ok(HandshakeOutcome::NoHandshake);
        }

        let Some(profile) = self.fetch_profile(token).await? else {
            tracing::debug!("Handshake produced no profile");
            return Ok(HandshakeOutcome::NoProfile);
        };
        let key = &profile.identity_key;

        let (account, action) = match self.resolver.lookup(key).await? {
            Resolution::Found { account, .. } => (account, HandshakeAction::Existing),
            Resolution::Dangling(link) => {
                self.links.remove_link(link.link_id).await?;
                self.provision(&profile).await?
            }
            Resolution::NotFound => self.provision(&profile).await?,
        };

        if let Some(credential) = profile.credential.clone() {
            self.store_credential(&account.id, credential).await?;
        }

        let session = self.sessions.establish_session(&account).await?;
        tracing::info!(
            identity_key = %key,
            account_id = %account.id,
            action = %action,
            "Handshake completed"
        );

        Ok(HandshakeOutcome::Authenticated {
            account,
            session,
            action,
        })
    }

    async fn store_credential(
        &self,
        account_id: &AccountId,
        credential: CredentialMetadata,
    ) -> FederationResult<()> {
        if self
            .links
            .save_credential_if_linked(account_id, credential)
            .await?
        {
            tracing::debug!(account_id = %account_id, "Saved provider credentials");
        } else {
            tracing::warn!(
                account_id = %account_id,
                "Account lost its last identity link, credentials not saved"
            );
        }
        Ok(())
    }

    async fn provision(&self, profile: &Profile) -> FederationResult<(Account, HandshakeAction)> {
        let outcome = self.provisioner.provision(profile).await?;
        let action = match outcome {
            ProvisionOutcome::Created { .. } => HandshakeAction::Created,
            ProvisionOutcome::JoinedExisting { .. } => HandshakeAction::JoinedExisting,
        };
        Ok((outcome.into_account(), action))
    }

    /// Links the identity behind `token` to the principal's account.
    ///
    /// # Errors
    ///
    /// - `NotAuthenticated` if the principal's account does not exist
    /// - `LinkConflict` if the identity belongs to another account
    /// - any provider or profile error
    pub async fn add_identity(
        &self,
        principal: &Principal,
        token: Option<&str>,
    ) -> FederationResult<AddIdentityOutcome> {
        if self
            .accounts
            .find_account(&principal.account_id)
            .await?
            .is_none()
        {
            return Err(FederationError::NotAuthenticated);
        }

        let Some(profile) = self.fetch_profile(token).await? else {
            return Ok(AddIdentityOutcome::NoProfile);
        };
        let key = &profile.identity_key;

        match self.resolver.lookup(key).await? {
            Resolution::Found { link, .. } if link.account_id == principal.account_id => {
                return Ok(AddIdentityOutcome::AlreadyLinked(link));
            }
            Resolution::Found { link, .. } => {
                tracing::warn!(
                    identity_key = %key,
                    account_id = %principal.account_id,
                    owner = %link.account_id,
                    "Identity is linked to another account"
                );
                return Err(FederationError::LinkConflict(key.clone()));
            }
            Resolution::Dangling(link) => {
                self.links.remove_link(link.link_id).await?;
            }
            Resolution::NotFound => {}
        }

        let link = self.links.link(&principal.account_id, key).await?;
        if let Some(credential) = profile.credential {
            self.store_credential(&principal.account_id, credential).await?;
        }

        tracing::info!(
            identity_key = %key,
            account_id = %principal.account_id,
            link_id = %link.link_id,
            "Identity linked"
        );
        Ok(AddIdentityOutcome::Linked(link))
    }

    /// Removes one identity link of an account.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied` if the principal neither owns the account nor
    ///   may manage users
    /// - `LinkNotFound` if the link does not belong to the account
    pub async fn remove_identity(
        &self,
        principal: &Principal,
        account_id: &AccountId,
        link_id: LinkId,
    ) -> FederationResult<RemovedIdentity> {
        let link = match self.links.unlink(link_id, account_id, principal).await {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(
                    principal = %principal.account_id,
                    account_id = %account_id,
                    link_id = %link_id,
                    error = %e,
                    "Identity removal refused"
                );
                return Err(e);
            }
        };

        tracing::info!(
            identity_key = %link.identity_key,
            account_id = %account_id,
            "Identity unlinked"
        );

        let cleanup = self.cleanup.after_unlink(&link.account_id).await?;
        Ok(RemovedIdentity {
            link_id: link.link_id,
            identity_key: link.identity_key,
            cleanup,
        })
    }

    /// Lists the identities linked to an account.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` if the principal neither owns the account
    /// nor may manage users.
    pub async fn list_identities(
        &self,
        principal: &Principal,
        account_id: &AccountId,
    ) -> FederationResult<Vec<IdentityLink>> {
        if !principal.may_manage(account_id) {
            return Err(FederationError::PermissionDenied(format!(
                "account {} may not view identities of account {}",
                principal.account_id, account_id
            )));
        }
        self.links.list_links(account_id).await
    }
}
