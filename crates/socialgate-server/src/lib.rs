//! SocialGate HTTP server.
//!
//! Wires the federation service from `socialgate-auth` to the in-memory
//! stores of `socialgate-db-memory` and serves the social login endpoints.

pub mod config;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use server::{ServerBuilder, SocialGateServer, build_app};
