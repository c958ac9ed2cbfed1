use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;
use socialgate_auth::FederationResult;
use socialgate_auth::federation::{FederationService, MANAGE_USERS, ProviderDirectoryClient};
use socialgate_auth::http::{FederationState, federation_routes};
use socialgate_auth::storage::AccountId;
use socialgate_db_memory::MemoryBackend;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;

pub struct SocialGateServer {
    addr: SocketAddr,
    app: Router,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Builds the application router on top of the given stores.
///
/// Accounts listed in `access.admin_accounts` are granted `manage_users`.
/// The provider listing endpoint is enabled when both an API key and an
/// app secret are configured.
pub async fn build_app(cfg: &AppConfig, backend: MemoryBackend) -> FederationResult<Router> {
    for id in &cfg.access.admin_accounts {
        backend
            .sessions
            .grant_capability(&AccountId::new(id.as_str()), MANAGE_USERS)
            .await;
    }

    let service = FederationService::from_config(
        &cfg.federation,
        backend.accounts.clone(),
        backend.links.clone(),
        backend.sessions.clone(),
    )?;
    tracing::info!(
        version = %service.version(),
        domain = %cfg.federation.domain,
        "Federation service ready"
    );

    let mut state = FederationState::new(
        Arc::new(service),
        backend.sessions.clone(),
        cfg.redirects.clone(),
        cfg.session.clone(),
    );
    if !cfg.federation.api_key.trim().is_empty() && !cfg.federation.app_secret.trim().is_empty() {
        state = state.with_directory(Arc::new(ProviderDirectoryClient::new(&cfg.federation)?));
    }

    Ok(Router::new()
        .route("/healthz", get(healthz))
        .merge(federation_routes(state))
        .layer(TraceLayer::new_for_http()))
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn build(self) -> anyhow::Result<SocialGateServer> {
        let addr: SocketAddr = self.config.addr().parse()?;
        let backend = MemoryBackend::new(self.config.session.ttl);
        let app = build_app(&self.config, backend).await?;

        Ok(SocialGateServer { addr, app })
    }
}

impl SocialGateServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
