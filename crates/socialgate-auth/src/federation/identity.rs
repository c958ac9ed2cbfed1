//! Identity keys, links and acting principals.
//!
//! An [`IdentityKey`] is the composite `Provider|external_id` used to look up
//! the account an external identity belongs to. The provider part is always
//! normalized so that `google.com`, `Google` and ` GOOGLE.COM ` produce the
//! same key.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::FederationResult;
use crate::error::FederationError;
use crate::storage::AccountId;

/// Separator between provider and external id in the key's string form.
pub const KEY_SEPARATOR: char = '|';

/// Capability that lets a principal manage other users' identities.
pub const MANAGE_USERS: &str = "manage_users";

/// Domain suffixes stripped from provider names.
const PROVIDER_SUFFIXES: [&str; 3] = [".com", ".net", ".co"];

/// Normalizes a provider name or domain.
///
/// Trims, lowercases, strips one trailing `.com`, `.net` or `.co`, trims
/// again and uppercases the first character.
///
/// # Example
///
/// ```
/// use socialgate_auth::federation::identity::normalize_provider_name;
///
/// assert_eq!(normalize_provider_name("google.com"), "Google");
/// assert_eq!(normalize_provider_name(" GitHub "), "Github");
/// ```
#[must_use]
pub fn normalize_provider_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let stripped = PROVIDER_SUFFIXES
        .iter()
        .find_map(|suffix| lowered.strip_suffix(suffix))
        .unwrap_or(&lowered)
        .trim();

    let mut chars = stripped.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =============================================================================
// Identity Key
// =============================================================================

/// Lookup key for an external identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityKey {
    provider: String,
    external_id: String,
}

impl IdentityKey {
    /// Builds a key from a raw provider name and external id.
    ///
    /// # Errors
    ///
    /// Returns `MalformedProfile` if the external id is empty or the
    /// provider normalizes to an empty string or contains the separator.
    pub fn new(provider: &str, external_id: &str) -> FederationResult<Self> {
        let provider = normalize_provider_name(provider);
        let external_id = external_id.trim();

        if provider.is_empty() {
            return Err(FederationError::MalformedProfile(
                "provider name is empty".to_string(),
            ));
        }
        if provider.contains(KEY_SEPARATOR) {
            return Err(FederationError::MalformedProfile(format!(
                "provider name '{provider}' contains '{KEY_SEPARATOR}'"
            )));
        }
        if external_id.is_empty() {
            return Err(FederationError::MalformedProfile(
                "external identifier is empty".to_string(),
            ));
        }

        Ok(Self {
            provider,
            external_id: external_id.to_string(),
        })
    }

    /// Parses a key from its stored `Provider|external_id` form.
    ///
    /// The provider part is re-normalized.
    ///
    /// # Errors
    ///
    /// Returns `MalformedProfile` if the separator is missing or either part
    /// is empty.
    pub fn parse(value: &str) -> FederationResult<Self> {
        let (provider, external_id) = value.split_once(KEY_SEPARATOR).ok_or_else(|| {
            FederationError::MalformedProfile(format!("identity key '{value}' has no separator"))
        })?;
        Self::new(provider, external_id)
    }

    /// Returns the normalized provider name.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Returns the provider-scoped external identifier.
    #[must_use]
    pub fn external_id(&self) -> &str {
        &self.external_id
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.provider, KEY_SEPARATOR, self.external_id)
    }
}

impl FromStr for IdentityKey {
    type Err = FederationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for IdentityKey {
    type Error = FederationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<IdentityKey> for String {
    fn from(key: IdentityKey) -> Self {
        key.to_string()
    }
}

// =============================================================================
// Identity Link
// =============================================================================

/// Stable handle of an identity link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(Uuid);

impl LinkId {
    /// Generates a fresh link id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for LinkId {
    type Err = FederationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| FederationError::LinkNotFound(s.to_string()))
    }
}

/// Durable association between an identity key and an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLink {
    /// Stable handle used for targeted removal.
    pub link_id: LinkId,

    /// The account this identity signs in to.
    pub account_id: AccountId,

    /// The linked external identity.
    pub identity_key: IdentityKey,

    /// When the link was created.
    #[serde(with = "time::serde::rfc3339")]
    pub linked_at: OffsetDateTime,
}

impl IdentityLink {
    /// Creates a new link with a fresh id.
    #[must_use]
    pub fn new(account_id: AccountId, identity_key: IdentityKey) -> Self {
        Self {
            link_id: LinkId::new(),
            account_id,
            identity_key,
            linked_at: OffsetDateTime::now_utc(),
        }
    }

    /// Returns the provider name of the linked identity.
    #[must_use]
    pub fn provider(&self) -> &str {
        self.identity_key.provider()
    }
}

// =============================================================================
// Principal
// =============================================================================

/// The authenticated caller of an identity management operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// The caller's own account.
    pub account_id: AccountId,

    /// Capabilities granted by the host.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl Principal {
    /// Creates a principal without capabilities.
    #[must_use]
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            capabilities: BTreeSet::new(),
        }
    }

    /// Grants a capability.
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    /// Returns `true` if the principal holds the given capability.
    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Returns `true` if the principal may manage other users.
    #[must_use]
    pub fn can_manage_users(&self) -> bool {
        self.has_capability(MANAGE_USERS)
    }

    /// Returns `true` if the principal owns or may manage the account.
    #[must_use]
    pub fn may_manage(&self, account_id: &AccountId) -> bool {
        &self.account_id == account_id || self.can_manage_users()
    }
}
