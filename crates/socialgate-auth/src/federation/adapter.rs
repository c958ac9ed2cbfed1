//! Protocol adapters.
//!
//! A [`ProtocolAdapter`] exchanges the token a provider hands back to the
//! browser for the raw profile payload. Two variants exist:
//!
//! - [`StandardAdapter`] (v1) posts `Token` and `AppSecret` to
//!   `<domain>/Authentication/v1/Auth`
//! - [`OAuth2Adapter`] (v2) posts an authorization-code grant to
//!   `<domain>/Authentication/v2/Auth`
//!
//! [`build_adapter`] picks one from [`FederationConfig::version`]. Both share
//! [`ProviderHttp`] for endpoint validation, timeouts and status mapping.
//!
//! # Example
//!
//! ```ignore
//! use socialgate_auth::federation::adapter::build_adapter;
//!
//! let adapter = build_adapter(&config)?;
//! if let Some(payload) = adapter.exchange("abc123").await? {
//!     println!("Got profile payload: {payload}");
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::Value;
use url::Url;

use crate::FederationResult;
use crate::config::{FederationConfig, ProtocolVersion};
use crate::error::{FederationError, ProtocolErrorKind};
use crate::federation::endpoint::ProviderEndpoint;

/// Path of the v1 authentication exchange.
pub const V1_AUTH_PATH: &str = "Authentication/v1/Auth";

/// Path of the v2 authentication exchange.
pub const V2_AUTH_PATH: &str = "Authentication/v2/Auth";

// =============================================================================
// Shared HTTP
// =============================================================================

/// HTTP plumbing shared by the adapters and the provider directory client.
///
/// Every call is validated against the provider endpoint before it is sent
/// and is bounded by the configured request timeout.
#[derive(Debug, Clone)]
pub struct ProviderHttp {
    client: reqwest::Client,
    endpoint: ProviderEndpoint,
}

impl ProviderHttp {
    /// Creates the HTTP helper from configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` if the configured domain fails validation,
    /// or `TransportFailure` if the HTTP client cannot be built.
    pub fn new(config: &FederationConfig) -> FederationResult<Self> {
        let endpoint = config.endpoint()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(FederationError::TransportFailure)?;

        Ok(Self { client, endpoint })
    }

    /// Returns the validated provider endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &ProviderEndpoint {
        &self.endpoint
    }

    /// Posts a form to a provider path and reads the JSON answer.
    ///
    /// Returns `Ok(None)` for an empty 200 body or an unmapped status.
    ///
    /// # Errors
    ///
    /// - `InvalidEndpoint` if the path leaves the trusted domain
    /// - `TransportFailure` if no response was received
    /// - `ProtocolError` for 400, 401, 404 and 500
    /// - `MalformedProfile` for a 200 body that is not JSON
    pub async fn post_form(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> FederationResult<Option<Value>> {
        let url = self.endpoint.join(path)?;
        let field_names: Vec<&str> = params.iter().map(|(name, _)| *name).collect();
        tracing::debug!(url = %url, fields = ?field_names, "Sending provider form request");

        let response = self
            .client
            .post(url.as_str())
            .header(ACCEPT, "application/json")
            .form(params)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %url, error = %e, "Provider request failed");
                FederationError::TransportFailure(e)
            })?;

        read_json(&url, response).await
    }

    /// Sends an authorized GET to a provider path and reads the JSON answer.
    ///
    /// # Errors
    ///
    /// Same as [`post_form`](Self::post_form).
    pub async fn get_json(&self, path: &str, bearer: &str) -> FederationResult<Option<Value>> {
        let url = self.endpoint.join(path)?;
        tracing::debug!(url = %url, "Sending provider API request");

        let response = self
            .client
            .get(url.as_str())
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {bearer}"))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %url, error = %e, "Provider request failed");
                FederationError::TransportFailure(e)
            })?;

        read_json(&url, response).await
    }
}

async fn read_json(url: &Url, response: reqwest::Response) -> FederationResult<Option<Value>> {
    let status = response.status().as_u16();

    if status != 200 {
        return match ProtocolErrorKind::from_status(status) {
            Some(kind) => {
                tracing::warn!(url = %url, status, kind = %kind, "Provider returned an error status");
                Err(FederationError::protocol(status, kind))
            }
            None => {
                tracing::debug!(url = %url, status, "Provider returned an unmapped status");
                Ok(None)
            }
        };
    }

    let body = response
        .text()
        .await
        .map_err(FederationError::TransportFailure)?;

    if body.trim().is_empty() {
        tracing::debug!(url = %url, "Provider returned an empty body");
        return Ok(None);
    }

    serde_json::from_str(&body)
        .map(Some)
        .map_err(|e| FederationError::MalformedProfile(format!("response is not JSON: {e}")))
}

// =============================================================================
// Adapters
// =============================================================================

/// Exchanges an inbound token for a raw provider profile payload.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Returns the protocol version this adapter speaks.
    fn version(&self) -> ProtocolVersion;

    /// Exchanges the token.
    ///
    /// Returns `Ok(None)` when the provider produced no profile.
    ///
    /// # Errors
    ///
    /// See [`ProviderHttp::post_form`].
    async fn exchange(&self, token: &str) -> FederationResult<Option<Value>>;
}

/// Protocol v1 ("standard") adapter.
pub struct StandardAdapter {
    http: ProviderHttp,
    app_secret: String,
}

impl StandardAdapter {
    /// Creates a v1 adapter.
    #[must_use]
    pub fn new(http: ProviderHttp, app_secret: impl Into<String>) -> Self {
        Self {
            http,
            app_secret: app_secret.into(),
        }
    }
}

impl fmt::Debug for StandardAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardAdapter")
            .field("endpoint", self.http.endpoint().base())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProtocolAdapter for StandardAdapter {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V1
    }

    async fn exchange(&self, token: &str) -> FederationResult<Option<Value>> {
        self.http
            .post_form(
                V1_AUTH_PATH,
                &[("Token", token), ("AppSecret", self.app_secret.as_str())],
            )
            .await
    }
}

/// Protocol v2 ("OAuth2-style") adapter.
pub struct OAuth2Adapter {
    http: ProviderHttp,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl OAuth2Adapter {
    /// Creates a v2 adapter.
    #[must_use]
    pub fn new(
        http: ProviderHttp,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Returns the canonical redirect URI sent with every exchange.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }
}

impl fmt::Debug for OAuth2Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Adapter")
            .field("endpoint", self.http.endpoint().base())
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProtocolAdapter for OAuth2Adapter {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V2
    }

    async fn exchange(&self, token: &str) -> FederationResult<Option<Value>> {
        self.http
            .post_form(
                V2_AUTH_PATH,
                &[
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("grant_type", "authorization_code"),
                    ("redirect_uri", self.redirect_uri.as_str()),
                    ("code", token),
                    ("version", "v2"),
                    ("format", "json"),
                ],
            )
            .await
    }
}

/// Builds the adapter for the configured protocol version.
///
/// # Errors
///
/// Returns `InvalidEndpoint` if the configured domain fails validation.
pub fn build_adapter(config: &FederationConfig) -> FederationResult<Arc<dyn ProtocolAdapter>> {
    let http = ProviderHttp::new(config)?;
    let adapter: Arc<dyn ProtocolAdapter> = match config.version {
        ProtocolVersion::V1 => Arc::new(StandardAdapter::new(http, config.app_secret.clone())),
        ProtocolVersion::V2 => Arc::new(OAuth2Adapter::new(
            http,
            config.api_key.clone(),
            config.app_secret.clone(),
            config.callback_url(),
        )),
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, version: ProtocolVersion) -> FederationConfig {
        FederationConfig::new(version, server.uri())
            .with_trusted_domain("127.0.0.1")
            .with_allow_http(true)
            .with_api_key("client-1")
            .with_app_secret("s3cret")
            .with_redirect_url("https://www.example.com/")
            .with_request_timeout(Duration::from_secs(5))
    }

    fn profile_body() -> Value {
        json!({"profile": {"identifier": "u1", "displayName": "Jane Doe"}})
    }

    #[test]
    fn test_build_adapter_selects_version() {
        let config = FederationConfig::new(ProtocolVersion::V1, "https://api.stitchz.net/");
        assert_eq!(build_adapter(&config).unwrap().version(), ProtocolVersion::V1);

        let config = FederationConfig::new(ProtocolVersion::V2, "https://api.stitchz.net/");
        assert_eq!(build_adapter(&config).unwrap().version(), ProtocolVersion::V2);
    }

    #[test]
    fn test_build_adapter_rejects_invalid_endpoint() {
        let config = FederationConfig::new(ProtocolVersion::V1, "https://evil.example.com/");
        assert!(matches!(
            build_adapter(&config),
            Err(FederationError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn test_v1_exchange_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Authentication/v1/Auth"))
            .and(header("accept", "application/json"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("Token=abc123"))
            .and(body_string_contains("AppSecret=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = build_adapter(&config_for(&server, ProtocolVersion::V1)).unwrap();
        let payload = adapter.exchange("abc123").await.unwrap().unwrap();
        assert_eq!(payload["profile"]["identifier"], "u1");
    }

    #[tokio::test]
    async fn test_v2_exchange_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Authentication/v2/Auth"))
            .and(body_string_contains("client_id=client-1"))
            .and(body_string_contains("client_secret=s3cret"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains(
                "redirect_uri=https%3A%2F%2Fwww.example.com%2Fsocial_login%2Fauth",
            ))
            .and(body_string_contains("code=abc123"))
            .and(body_string_contains("version=v2"))
            .and(body_string_contains("format=json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = build_adapter(&config_for(&server, ProtocolVersion::V2)).unwrap();
        let payload = adapter.exchange("abc123").await.unwrap();
        assert!(payload.is_some());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (400, ProtocolErrorKind::BadRequest),
            (401, ProtocolErrorKind::Unauthorized),
            (404, ProtocolErrorKind::NotFound),
            (500, ProtocolErrorKind::ServerError),
        ];

        for (status, expected) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let adapter = build_adapter(&config_for(&server, ProtocolVersion::V1)).unwrap();
            match adapter.exchange("abc123").await {
                Err(FederationError::ProtocolError { status: got, kind }) => {
                    assert_eq!(got, status);
                    assert_eq!(kind, expected);
                }
                other => panic!("status {status}: unexpected result {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_unmapped_status_and_empty_body_mean_no_profile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Authentication/v1/Auth"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/Authentication/v2/Auth"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let v1 = build_adapter(&config_for(&server, ProtocolVersion::V1)).unwrap();
        assert!(v1.exchange("t").await.unwrap().is_none());

        let v2 = build_adapter(&config_for(&server, ProtocolVersion::V2)).unwrap();
        assert!(v2.exchange("t").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let adapter = build_adapter(&config_for(&server, ProtocolVersion::V1)).unwrap();
        assert!(matches!(
            adapter.exchange("t").await,
            Err(FederationError::MalformedProfile(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(profile_body())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = config_for(&server, ProtocolVersion::V1)
            .with_request_timeout(Duration::from_millis(200));
        let adapter = build_adapter(&config).unwrap();

        let err = adapter.exchange("t").await.unwrap_err();
        assert!(matches!(err, FederationError::TransportFailure(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        let config = FederationConfig::new(ProtocolVersion::V1, "http://127.0.0.1:1/")
            .with_trusted_domain("127.0.0.1")
            .with_allow_http(true);
        let adapter = build_adapter(&config).unwrap();
        assert!(matches!(
            adapter.exchange("t").await,
            Err(FederationError::TransportFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_get_json_sends_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/providers"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Providers": []})))
            .expect(1)
            .mount(&server)
            .await;

        let http = ProviderHttp::new(&config_for(&server, ProtocolVersion::V2)).unwrap();
        let body = http.get_json("api/v2/providers", "tok").await.unwrap().unwrap();
        assert!(body["Providers"].is_array());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = FederationConfig::new(ProtocolVersion::V2, "https://api.stitchz.net/")
            .with_api_key("client-1")
            .with_app_secret("top-secret")
            .with_redirect_url("https://www.example.com");
        let http = ProviderHttp::new(&config).unwrap();
        let adapter = OAuth2Adapter::new(http, "client-1", "top-secret", config.callback_url());
        let debug = format!("{adapter:?}");
        assert!(debug.contains("client-1"));
        assert!(!debug.contains("top-secret"));
    }
}
