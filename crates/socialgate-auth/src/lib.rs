//! # socialgate-auth
//!
//! Identity federation core for SocialGate.
//!
//! This crate lets a host application sign users in with an identity verified
//! by an external federation provider and keeps a durable, many-to-one mapping
//! between external identities and local accounts.
//!
//! ## Overview
//!
//! A handshake flows through these stages:
//!
//! 1. [`federation::adapter`] exchanges the inbound token for a raw profile
//!    (protocol v1 or v2)
//! 2. [`federation::profile`] normalizes the payload into a [`federation::Profile`]
//! 3. [`federation::resolver`] looks up the account linked to the identity key
//! 4. [`federation::provisioning`] creates an account and link on a miss
//! 5. The host's [`storage::SessionManager`] establishes the session
//!
//! Unlinking goes through [`federation::FederationService::remove_identity`],
//! followed by [`federation::cleanup`] which purges account-scoped OAuth2
//! credentials once no links remain.
//!
//! ## Modules
//!
//! - [`config`] - Federation and redirect configuration
//! - [`error`] - Error taxonomy for federation operations
//! - [`federation`] - Protocol adapters, normalization, resolution, provisioning
//! - [`storage`] - Collaborator traits implemented by the host
//! - [`http`] - Axum handlers for the authentication and identity endpoints

pub mod config;
pub mod error;
pub mod federation;
pub mod http;
pub mod storage;

pub use config::{
    ConfigError, FederationConfig, ProtocolVersion, RedirectConfig, SessionCookieConfig,
};
pub use error::{ErrorCategory, FederationError, ProtocolErrorKind};
pub use federation::{
    FederationService, HandshakeAction, HandshakeOutcome, IdentityKey, IdentityLink, LinkId,
    Principal, Profile,
};
pub use storage::{Account, AccountDirectory, AccountId, IdentityLinkStore, SessionManager};

/// Type alias for federation results.
pub type FederationResult<T> = Result<T, FederationError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use socialgate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::FederationResult;
    pub use crate::config::{
        ConfigError, FederationConfig, ProtocolVersion, RedirectConfig, SessionCookieConfig,
    };
    pub use crate::error::{ErrorCategory, FederationError, ProtocolErrorKind};
    pub use crate::federation::{
        AddIdentityOutcome, CleanupOutcome, CleanupPolicy, CredentialMetadata, FederationService,
        HandshakeAction, HandshakeOutcome, IdentityKey, IdentityLink, LinkId, Principal, Profile,
        RemovedIdentity,
    };
    pub use crate::storage::{
        Account, AccountDirectory, AccountField, AccountId, IdentityLinkStore, NewAccount,
        SessionGrant, SessionManager,
    };
}
