//! Identity federation.
//!
//! This module implements the handshake that turns a provider token into a
//! signed-in local account, and the management of identity links.
//!
//! # Modules
//!
//! - [`endpoint`] - Provider URL validation
//! - [`adapter`] - Protocol v1/v2 token exchange
//! - [`management`] - Provider list and login links
//! - [`profile`] - Payload normalization
//! - [`identity`] - Identity keys, links and principals
//! - [`resolver`] - Identity key to account lookup
//! - [`provisioning`] - Account creation for new identities
//! - [`cleanup`] - Credential purge after unlink
//! - [`service`] - Orchestration of the above

pub mod adapter;
pub mod cleanup;
pub mod endpoint;
pub mod identity;
pub mod management;
pub mod profile;
pub mod provisioning;
pub mod resolver;
pub mod service;

pub use adapter::{OAuth2Adapter, ProtocolAdapter, ProviderHttp, StandardAdapter, build_adapter};
pub use cleanup::{CleanupOutcome, CleanupPolicy};
pub use endpoint::ProviderEndpoint;
pub use identity::{IdentityKey, IdentityLink, LinkId, MANAGE_USERS, Principal, normalize_provider_name};
pub use management::{ProviderCatalog, ProviderDirectoryClient, ProviderLink, ProviderSummary};
pub use profile::{CredentialMetadata, Profile, ProfileNormalizer, ResolvedEmail};
pub use provisioning::{AccountProvisioner, ProvisionOutcome};
pub use resolver::{IdentityResolver, Resolution};
pub use service::{
    AddIdentityOutcome, FederationService, HandshakeAction, HandshakeOutcome, RemovedIdentity,
};
