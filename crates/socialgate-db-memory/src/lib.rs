//! In-memory stores for SocialGate.
//!
//! This crate implements the collaborator traits of `socialgate-auth`
//! ([`AccountDirectory`], [`IdentityLinkStore`], [`SessionManager`]) in
//! process memory. It backs the development server and the end-to-end tests.
//!
//! # Example
//!
//! ```ignore
//! use socialgate_db_memory::MemoryBackend;
//! use socialgate_auth::FederationService;
//!
//! let backend = MemoryBackend::default();
//! let service = FederationService::from_config(
//!     &config,
//!     backend.accounts.clone(),
//!     backend.links.clone(),
//!     backend.sessions.clone(),
//! )?;
//! ```

pub mod accounts;
pub mod links;
pub mod sessions;

use std::sync::Arc;
use std::time::Duration;

pub use accounts::InMemoryAccountDirectory;
pub use links::InMemoryLinkStore;
pub use sessions::{DEFAULT_SESSION_TTL, InMemorySessionManager};

// Re-export the traits for convenience
pub use socialgate_auth::storage::{AccountDirectory, IdentityLinkStore, SessionManager};

/// The three in-memory stores, shared behind `Arc`s.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    /// Account directory.
    pub accounts: Arc<InMemoryAccountDirectory>,
    /// Identity links and credentials.
    pub links: Arc<InMemoryLinkStore>,
    /// Sessions.
    pub sessions: Arc<InMemorySessionManager>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl MemoryBackend {
    /// Creates empty stores with the given session lifetime.
    pub fn new(session_ttl: Duration) -> Self {
        Self {
            accounts: Arc::new(InMemoryAccountDirectory::new()),
            links: Arc::new(InMemoryLinkStore::new()),
            sessions: Arc::new(InMemorySessionManager::new(session_ttl)),
        }
    }
}
