//! HTTP surface for social login.
//!
//! - [`token`] - Inbound token extraction (form body, then query string)
//! - [`handlers`] - Axum handlers and the [`federation_routes`] router

pub mod handlers;
pub mod token;

pub use handlers::{
    FederationState, IdentitiesResponse, ProvidersResponse, federation_routes,
    handshake_failure_target, redirect_with_error, status_for,
};
pub use token::{TOKEN_PARAM, TokenParams, select_token};
