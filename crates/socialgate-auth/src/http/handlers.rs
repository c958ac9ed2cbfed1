//! Social login endpoint handlers.
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET|POST /social_login/auth` | Sign in with the inbound token |
//! | `GET|POST /social_login/identity/add` | Link another identity to the signed-in account |
//! | `GET /social_login/{account_id}/identity/delete/{link_id}` | Remove one identity link |
//! | `GET /social_login/{account_id}/identities` | List identity links (JSON) |
//! | `GET /social_login/providers` | Provider login links (JSON) |
//!
//! Browser-facing endpoints always answer with a redirect. Failures are
//! reported through an `error=<code>` query parameter on the target page.
//!
//! # Usage
//!
//! ```ignore
//! use socialgate_auth::http::{FederationState, federation_routes};
//!
//! let app = federation_routes(FederationState::new(service, sessions, redirects, cookies));
//! ```

use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use axum_extra::extract::CookieJar;
use cookie::{Cookie, SameSite};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::FederationResult;
use crate::config::{RedirectConfig, SessionCookieConfig};
use crate::error::FederationError;
use crate::federation::{
    AddIdentityOutcome, FederationService, HandshakeOutcome, IdentityLink, LinkId, Principal,
    ProviderDirectoryClient, ProviderLink,
};
use crate::storage::{AccountId, SessionGrant, SessionManager};

use super::token::{TokenParams, select_token};

// =============================================================================
// State Types
// =============================================================================

/// State shared by the social login handlers.
#[derive(Clone)]
pub struct FederationState {
    /// Handshake and identity service.
    pub service: Arc<FederationService>,
    /// Session collaborator, used to resolve the acting principal.
    pub sessions: Arc<dyn SessionManager>,
    /// Provider directory client for the login link listing.
    pub directory: Option<Arc<ProviderDirectoryClient>>,
    /// Redirect targets.
    pub redirects: RedirectConfig,
    /// Session cookie settings.
    pub cookies: SessionCookieConfig,
}

impl FederationState {
    /// Creates the handler state.
    pub fn new(
        service: Arc<FederationService>,
        sessions: Arc<dyn SessionManager>,
        redirects: RedirectConfig,
        cookies: SessionCookieConfig,
    ) -> Self {
        Self {
            service,
            sessions,
            directory: None,
            redirects,
            cookies,
        }
    }

    /// Enables the provider listing endpoint.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<ProviderDirectoryClient>) -> Self {
        self.directory = Some(directory);
        self
    }

    async fn current_principal(&self, jar: &CookieJar) -> FederationResult<Option<Principal>> {
        let Some(cookie) = jar.get(&self.cookies.cookie_name) else {
            return Ok(None);
        };
        self.sessions.principal_for_session(cookie.value()).await
    }
}

/// Builds the social login router.
pub fn federation_routes(state: FederationState) -> Router {
    Router::new()
        .route(
            "/social_login/auth",
            get(authenticate_get).post(authenticate_post),
        )
        .route(
            "/social_login/identity/add",
            get(add_identity_get).post(add_identity_post),
        )
        .route(
            "/social_login/{account_id}/identity/delete/{link_id}",
            get(remove_identity_handler),
        )
        .route(
            "/social_login/{account_id}/identities",
            get(list_identities_handler),
        )
        .route("/social_login/providers", get(providers_handler))
        .with_state(state)
}

// =============================================================================
// Response Helpers
// =============================================================================

/// Appends `error=<code>` to a redirect target.
#[must_use]
pub fn redirect_with_error(target: &str, code: &str) -> String {
    let separator = if target.contains('?') { '&' } else { '?' };
    format!("{target}{separator}error={code}")
}

/// Returns where a failed sign-in handshake sends the browser.
///
/// Provider and transport failures go to the login page. Other failures,
/// such as a malformed profile or an account the host would not create, go
/// where a handshake without a profile goes.
#[must_use]
pub fn handshake_failure_target(redirects: &RedirectConfig, error: &FederationError) -> String {
    let target = if error.is_external_error() || matches!(error, FederationError::InvalidEndpoint(_))
    {
        redirects.login_url.as_str()
    } else {
        redirects.without_profile()
    };
    redirect_with_error(target, error.error_code())
}

/// Maps an error to the HTTP status used by the JSON endpoints.
#[must_use]
pub fn status_for(error: &FederationError) -> StatusCode {
    match error {
        FederationError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        FederationError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        FederationError::LinkNotFound(_) => StatusCode::NOT_FOUND,
        FederationError::LinkConflict(_) | FederationError::NameTaken { .. } => {
            StatusCode::CONFLICT
        }
        FederationError::AccountCreationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FederationError::TransportFailure(_)
        | FederationError::ProtocolError { .. }
        | FederationError::ProviderRejected { .. }
        | FederationError::MalformedProfile(_) => StatusCode::BAD_GATEWAY,
        FederationError::InvalidEndpoint(_)
        | FederationError::UniqueNameExhausted { .. }
        | FederationError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &FederationError) -> Response {
    let description = match error {
        FederationError::ProtocolError { kind, .. } => kind.user_message().to_string(),
        FederationError::Storage { .. } | FederationError::UniqueNameExhausted { .. } => {
            "Internal error".to_string()
        }
        other => other.to_string(),
    };
    (
        status_for(error),
        Json(json!({
            "error": error.error_code(),
            "error_description": description,
        })),
    )
        .into_response()
}

fn session_cookie(config: &SessionCookieConfig, grant: &SessionGrant) -> Cookie<'static> {
    let max_age = time::Duration::seconds(i64::try_from(config.ttl.as_secs()).unwrap_or(i64::MAX));

    Cookie::build((config.cookie_name.clone(), grant.session_id.clone()))
        .http_only(true)
        .secure(config.secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

// =============================================================================
// Authentication
// =============================================================================

/// Handler for `GET /social_login/auth`.
pub async fn authenticate_get(
    State(state): State<FederationState>,
    jar: CookieJar,
    Query(query): Query<TokenParams>,
) -> Response {
    let token = select_token(None, &query);
    authenticate(&state, jar, token).await
}

/// Handler for `POST /social_login/auth`.
pub async fn authenticate_post(
    State(state): State<FederationState>,
    jar: CookieJar,
    Query(query): Query<TokenParams>,
    form: Result<Form<TokenParams>, FormRejection>,
) -> Response {
    let form = form.ok().map(|Form(form)| form);
    let token = select_token(form.as_ref(), &query);
    authenticate(&state, jar, token).await
}

async fn authenticate(state: &FederationState, jar: CookieJar, token: Option<String>) -> Response {
    let redirects = &state.redirects;

    match state.service.authenticate(token.as_deref()).await {
        Ok(HandshakeOutcome::Authenticated {
            account,
            session,
            action,
        }) => {
            info!(account_id = %account.id, action = %action, "User signed in");
            let jar = jar.add(session_cookie(&state.cookies, &session));
            (jar, Redirect::to(&redirects.profile_url)).into_response()
        }
        Ok(HandshakeOutcome::NoHandshake) | Ok(HandshakeOutcome::NoProfile) => {
            debug!(
                users_can_register = redirects.users_can_register,
                "No profile, redirecting"
            );
            Redirect::to(redirects.without_profile()).into_response()
        }
        Err(e) => {
            warn!(error = %e, category = %e.category(), "Handshake failed");
            Redirect::to(&handshake_failure_target(redirects, &e)).into_response()
        }
    }
}

// =============================================================================
// Identity Management
// =============================================================================

/// Handler for `GET /social_login/identity/add`.
pub async fn add_identity_get(
    State(state): State<FederationState>,
    jar: CookieJar,
    Query(query): Query<TokenParams>,
) -> Response {
    let token = select_token(None, &query);
    add_identity(&state, &jar, token).await
}

/// Handler for `POST /social_login/identity/add`.
pub async fn add_identity_post(
    State(state): State<FederationState>,
    jar: CookieJar,
    Query(query): Query<TokenParams>,
    form: Result<Form<TokenParams>, FormRejection>,
) -> Response {
    let form = form.ok().map(|Form(form)| form);
    let token = select_token(form.as_ref(), &query);
    add_identity(&state, &jar, token).await
}

async fn add_identity(state: &FederationState, jar: &CookieJar, token: Option<String>) -> Response {
    let redirects = &state.redirects;

    let principal = match state.current_principal(jar).await {
        Ok(Some(principal)) => principal,
        Ok(None) => {
            debug!("Add identity without a signed-in user");
            return Redirect::to(&redirects.landing_url).into_response();
        }
        Err(e) => {
            warn!(error = %e, "Failed to resolve session");
            return Redirect::to(&redirect_with_error(&redirects.landing_url, e.error_code()))
                .into_response();
        }
    };

    match state.service.add_identity(&principal, token.as_deref()).await {
        Ok(AddIdentityOutcome::Linked(_) | AddIdentityOutcome::AlreadyLinked(_))
        | Ok(AddIdentityOutcome::NoProfile) => Redirect::to(&redirects.profile_url).into_response(),
        Err(e) => {
            warn!(account_id = %principal.account_id, error = %e, "Add identity failed");
            Redirect::to(&redirect_with_error(&redirects.profile_url, e.error_code()))
                .into_response()
        }
    }
}

/// Handler for `GET /social_login/{account_id}/identity/delete/{link_id}`.
pub async fn remove_identity_handler(
    State(state): State<FederationState>,
    jar: CookieJar,
    Path((account_id, link_id)): Path<(String, String)>,
) -> Response {
    let profile_url = &state.redirects.profile_url;

    let result = async {
        let principal = state
            .current_principal(&jar)
            .await?
            .ok_or(FederationError::NotAuthenticated)?;
        let link_id: LinkId = link_id.parse()?;
        state
            .service
            .remove_identity(&principal, &AccountId::new(account_id), link_id)
            .await
    }
    .await;

    match result {
        Ok(removed) => {
            info!(
                identity_key = %removed.identity_key,
                credentials_cleared = removed.cleanup.credentials_cleared,
                "Identity removed"
            );
            Redirect::to(profile_url).into_response()
        }
        Err(e) => Redirect::to(&redirect_with_error(profile_url, e.error_code())).into_response(),
    }
}

/// Identity listing response.
#[derive(Debug, Serialize)]
pub struct IdentitiesResponse {
    /// The account.
    pub account_id: AccountId,
    /// Its identity links.
    pub identities: Vec<IdentityLink>,
}

/// Handler for `GET /social_login/{account_id}/identities`.
pub async fn list_identities_handler(
    State(state): State<FederationState>,
    jar: CookieJar,
    Path(account_id): Path<String>,
) -> Response {
    let account_id = AccountId::new(account_id);

    let result = async {
        let principal = state
            .current_principal(&jar)
            .await?
            .ok_or(FederationError::NotAuthenticated)?;
        state.service.list_identities(&principal, &account_id).await
    }
    .await;

    match result {
        Ok(identities) => Json(IdentitiesResponse {
            account_id,
            identities,
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// Provider Listing
// =============================================================================

/// Provider listing response.
#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    /// Login links of the active providers.
    pub providers: Vec<ProviderLink>,
    /// Scope configured at the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Handler for `GET /social_login/providers`.
pub async fn providers_handler(State(state): State<FederationState>) -> Response {
    let Some(directory) = state.directory.as_ref() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "not_configured",
                "error_description": "Provider listing is not enabled",
            })),
        )
            .into_response();
    };

    let result = async {
        let catalog = directory.list_providers().await?;
        let providers = directory.login_links(&catalog)?;
        Ok::<_, FederationError>(ProvidersResponse {
            providers,
            scope: catalog.scope,
        })
    }
    .await;

    match result {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            warn!(error = %e, "Provider listing failed");
            error_response(&e)
        }
    }
}
