//! Collaborator traits implemented by the host.
//!
//! This module defines storage interfaces for:
//!
//! - Host accounts ([`AccountDirectory`])
//! - Identity links and account credential metadata ([`IdentityLinkStore`])
//! - Sessions ([`SessionManager`])
//!
//! # Implementations
//!
//! Implementations are provided in separate crates:
//!
//! - `socialgate-db-memory` - in-process storage backend

pub mod account;
pub mod link;
pub mod session;

pub use account::{Account, AccountDirectory, AccountField, AccountId, NewAccount};
pub use link::IdentityLinkStore;
pub use session::{SessionGrant, SessionManager};
