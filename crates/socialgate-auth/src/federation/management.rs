//! Provider directory client.
//!
//! The provider application exposes a small management API used to list
//! the identity providers configured for this site:
//!
//! 1. [`ProviderDirectoryClient::access_token`] obtains a bearer token with
//!    the client-credentials grant
//! 2. [`ProviderDirectoryClient::list_providers`] fetches the provider list
//! 3. [`ProviderDirectoryClient::authentication_url`] builds the login link
//!    a browser follows to start a handshake with one provider

use std::fmt;

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::FederationResult;
use crate::config::{FederationConfig, ProtocolVersion};
use crate::error::FederationError;
use crate::federation::adapter::ProviderHttp;

/// Path of the client-credentials token endpoint.
pub const TOKEN_PATH: &str = "api/oauth2/Token";

/// Path of the provider list endpoint.
pub const PROVIDERS_PATH: &str = "api/v2/providers";

/// Length of the random `state` value on v2 login links.
pub const STATE_LENGTH: usize = 10;

/// One identity provider configured at the federation provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSummary {
    /// Provider name, e.g. "Google" or "Windows Live".
    #[serde(rename = "Name")]
    pub name: String,

    /// Whether the provider is enabled for this site.
    #[serde(rename = "IsActive", default)]
    pub is_active: bool,
}

/// The provider list returned by the management API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCatalog {
    /// Configured providers.
    #[serde(rename = "Providers", default)]
    pub providers: Vec<ProviderSummary>,

    /// Scope configured at the provider.
    #[serde(rename = "Scope", default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl ProviderCatalog {
    /// Returns the enabled providers.
    pub fn active(&self) -> impl Iterator<Item = &ProviderSummary> {
        self.providers.iter().filter(|p| p.is_active)
    }
}

/// A ready-to-follow login link for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderLink {
    /// Provider name.
    pub name: String,
    /// Authentication URL.
    pub url: String,
}

/// Generates a random `state` value for a v2 login link.
#[must_use]
pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LENGTH)
        .map(char::from)
        .collect()
}

/// Client for the provider management API.
pub struct ProviderDirectoryClient {
    http: ProviderHttp,
    version: ProtocolVersion,
    client_id: String,
    client_secret: String,
    return_url: String,
    scope: String,
}

impl ProviderDirectoryClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` if the configured domain fails validation.
    pub fn new(config: &FederationConfig) -> FederationResult<Self> {
        Ok(Self {
            http: ProviderHttp::new(config)?,
            version: config.version,
            client_id: config.api_key.clone(),
            client_secret: config.app_secret.clone(),
            return_url: config.callback_url(),
            scope: config.scope.clone(),
        })
    }

    /// Obtains a bearer token with the client-credentials grant.
    ///
    /// # Errors
    ///
    /// Returns `ProviderRejected` if the answer carries no access token, or
    /// any error of [`ProviderHttp::post_form`].
    pub async fn access_token(&self) -> FederationResult<String> {
        let body = self
            .http
            .post_form(
                TOKEN_PATH,
                &[
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("grant_type", "client_credentials"),
                    ("format", "json"),
                ],
            )
            .await?;

        body.as_ref()
            .and_then(|b| b.get("access_token"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                FederationError::provider_rejected("token endpoint returned no access token")
            })
    }

    /// Fetches the configured providers.
    ///
    /// # Errors
    ///
    /// Propagates token and transport errors, and returns `MalformedProfile`
    /// if the list cannot be decoded.
    pub async fn list_providers(&self) -> FederationResult<ProviderCatalog> {
        let token = self.access_token().await?;
        let Some(body) = self.http.get_json(PROVIDERS_PATH, &token).await? else {
            tracing::debug!("Provider list endpoint returned no content");
            return Ok(ProviderCatalog::default());
        };

        let catalog: ProviderCatalog = serde_json::from_value(body)
            .map_err(|e| FederationError::MalformedProfile(format!("provider list: {e}")))?;

        tracing::info!(
            providers = catalog.providers.len(),
            active = catalog.active().count(),
            "Fetched provider list"
        );
        Ok(catalog)
    }

    /// Builds the login link for one provider.
    ///
    /// Spaces are removed from the provider name. `state` is only used by v2.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` if the resulting URL leaves the trusted
    /// domain.
    pub fn authentication_url(&self, provider_name: &str, state: &str) -> FederationResult<Url> {
        let name: String = provider_name.chars().filter(|c| *c != ' ').collect();

        let url = match self.version {
            ProtocolVersion::V1 => {
                let mut url = self.http.endpoint().join(&format!("{name}/v1/Authenticate"))?;
                url.query_pairs_mut()
                    .append_pair("ApiKey", &self.client_id)
                    .append_pair("ReturnUrl", &self.return_url);
                url
            }
            ProtocolVersion::V2 => {
                let mut url = self.http.endpoint().join(&format!("{name}/v2/Authenticate"))?;
                url.query_pairs_mut()
                    .append_pair("client_id", &self.client_id)
                    .append_pair("redirect_uri", &self.return_url)
                    .append_pair("scope", &self.scope)
                    .append_pair("state", state)
                    .append_pair("response_type", "code");
                url
            }
        };

        self.http.endpoint().validate(&url)?;
        Ok(url)
    }

    /// Builds login links for every active provider in the catalog.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` if any link fails validation.
    pub fn login_links(&self, catalog: &ProviderCatalog) -> FederationResult<Vec<ProviderLink>> {
        catalog
            .active()
            .map(|provider| {
                let url = self.authentication_url(&provider.name, &generate_state())?;
                Ok(ProviderLink {
                    name: provider.name.clone(),
                    url: url.to_string(),
                })
            })
            .collect()
    }
}

impl fmt::Debug for ProviderDirectoryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDirectoryClient")
            .field("endpoint", self.http.endpoint().base())
            .field("version", &self.version)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(domain: &str, version: ProtocolVersion) -> FederationConfig {
        FederationConfig::new(version, domain)
            .with_trusted_domain("127.0.0.1")
            .with_allow_http(true)
            .with_api_key("client-1")
            .with_app_secret("s3cret")
            .with_redirect_url("https://www.example.com")
            .with_scope("profile email")
    }

    #[test]
    fn test_generate_state() {
        let state = generate_state();
        assert_eq!(state.len(), STATE_LENGTH);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_state(), generate_state());
    }

    #[test]
    fn test_v1_authentication_url() {
        let client =
            ProviderDirectoryClient::new(&config("http://127.0.0.1:9000/", ProtocolVersion::V1))
                .unwrap();
        let url = client.authentication_url("Windows Live", "ignored").unwrap();

        assert_eq!(url.path(), "/WindowsLive/v1/Authenticate");
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["ApiKey"], "client-1");
        assert_eq!(query["ReturnUrl"], "https://www.example.com/social_login/auth");
        assert!(!query.contains_key("state"));
    }

    #[test]
    fn test_v2_authentication_url() {
        let client =
            ProviderDirectoryClient::new(&config("http://127.0.0.1:9000/", ProtocolVersion::V2))
                .unwrap();
        let url = client.authentication_url("Google", "abcdefghij").unwrap();

        assert_eq!(url.path(), "/Google/v2/Authenticate");
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["client_id"], "client-1");
        assert_eq!(query["redirect_uri"], "https://www.example.com/social_login/auth");
        assert_eq!(query["scope"], "profile email");
        assert_eq!(query["state"], "abcdefghij");
        assert_eq!(query["response_type"], "code");
    }

    #[tokio::test]
    async fn test_list_providers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth2/Token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=client-1"))
            .and(body_string_contains("format=json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "bearer-1", "expires_in": 3600})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/providers"))
            .and(header("authorization", "Bearer bearer-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Providers": [
                    {"Name": "Google", "IsActive": true},
                    {"Name": "Windows Live", "IsActive": true},
                    {"Name": "Yahoo", "IsActive": false}
                ],
                "Scope": "profile"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            ProviderDirectoryClient::new(&config(&server.uri(), ProtocolVersion::V2)).unwrap();
        let catalog = client.list_providers().await.unwrap();

        assert_eq!(catalog.providers.len(), 3);
        assert_eq!(catalog.scope.as_deref(), Some("profile"));
        let active: Vec<_> = catalog.active().map(|p| p.name.as_str()).collect();
        assert_eq!(active, vec!["Google", "Windows Live"]);

        let links = client.login_links(&catalog).unwrap();
        assert_eq!(links.len(), 2);
        assert!(links[1].url.contains("/WindowsLive/v2/Authenticate"));
    }

    #[tokio::test]
    async fn test_access_token_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth2/Token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client =
            ProviderDirectoryClient::new(&config(&server.uri(), ProtocolVersion::V2)).unwrap();
        let err = client.list_providers().await.unwrap_err();
        assert!(matches!(
            err,
            FederationError::ProtocolError { status: 401, .. }
        ));
    }

    #[tokio::test]
    async fn test_access_token_missing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth2/Token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"expires_in": 10})))
            .mount(&server)
            .await;

        let client =
            ProviderDirectoryClient::new(&config(&server.uri(), ProtocolVersion::V2)).unwrap();
        assert!(matches!(
            client.access_token().await,
            Err(FederationError::ProviderRejected { .. })
        ));
    }
}
