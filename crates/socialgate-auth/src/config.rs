//! Federation configuration.
//!
//! These values are supplied by the host. They describe which protocol
//! version to speak, where the provider lives, the credentials issued to this
//! application, and where users are sent after a handshake.
//!
//! # Example (TOML)
//!
//! ```toml
//! [federation]
//! version = 2
//! domain = "https://login.stitchz.net/"
//! api_key = "my-client-id"
//! app_secret = "my-client-secret"
//! redirect_url = "https://www.example.com"
//! scope = "profile email"
//! request_timeout = "15s"
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::federation::endpoint::ProviderEndpoint;

/// Path appended to the configured return URL for the v2 redirect URI.
pub const CALLBACK_SUFFIX: &str = "/social_login/auth";

/// Maximum length of short text settings (keys, secrets, scope).
pub const MAX_SHORT_SETTING_LEN: usize = 255;

/// Maximum length of the return URL setting.
pub const MAX_URL_SETTING_LEN: usize = 1000;

/// Provider protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "VersionRepr", into = "String")]
pub enum ProtocolVersion {
    /// "Standard" token + app secret exchange.
    V1,
    /// OAuth2-style authorization code exchange.
    #[default]
    V2,
}

impl ProtocolVersion {
    /// Returns the version as it appears in settings ("1" or "2").
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "1",
            Self::V2 => "2",
        }
    }

    /// Returns `true` for the OAuth2-style protocol.
    #[must_use]
    pub fn is_oauth2(&self) -> bool {
        matches!(self, Self::V2)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ProtocolVersion> for String {
    fn from(version: ProtocolVersion) -> Self {
        version.as_str().to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VersionRepr {
    Number(u64),
    Text(String),
}

impl TryFrom<VersionRepr> for ProtocolVersion {
    type Error = String;

    fn try_from(value: VersionRepr) -> Result<Self, Self::Error> {
        let text = match value {
            VersionRepr::Number(n) => n.to_string(),
            VersionRepr::Text(s) => s,
        };
        match text.trim().trim_start_matches(['v', 'V']) {
            "1" => Ok(Self::V1),
            "2" => Ok(Self::V2),
            other => Err(format!("unsupported protocol version: {other}")),
        }
    }
}

/// Provider connection settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Protocol version used for the authentication exchange.
    pub version: ProtocolVersion,

    /// Base URL of the provider application (the "App URL").
    pub domain: String,

    /// Client id issued by the provider. Required for v2.
    pub api_key: String,

    /// Application secret issued by the provider.
    pub app_secret: String,

    /// This site's return URL. The callback suffix is appended when missing.
    pub redirect_url: String,

    /// OAuth scope configured at the provider.
    pub scope: String,

    /// Apex domain every provider endpoint must belong to.
    pub trusted_domain: String,

    /// Allow plain HTTP endpoints. Only for testing.
    pub allow_http: bool,

    /// Upper bound on every outbound provider call.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::default(),
            domain: "https://api.stitchz.net/".to_string(),
            api_key: String::new(),
            app_secret: String::new(),
            redirect_url: String::new(),
            scope: String::new(),
            trusted_domain: "stitchz.net".to_string(),
            allow_http: false,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for FederationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederationConfig")
            .field("version", &self.version)
            .field("domain", &self.domain)
            .field("api_key", &self.api_key)
            .field("app_secret", &"[REDACTED]")
            .field("redirect_url", &self.redirect_url)
            .field("scope", &self.scope)
            .field("trusted_domain", &self.trusted_domain)
            .field("allow_http", &self.allow_http)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl FederationConfig {
    /// Creates a configuration for the given version and provider domain.
    #[must_use]
    pub fn new(version: ProtocolVersion, domain: impl Into<String>) -> Self {
        Self {
            version,
            domain: domain.into(),
            ..Default::default()
        }
    }

    /// Sets the client id.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Sets the application secret.
    #[must_use]
    pub fn with_app_secret(mut self, secret: impl Into<String>) -> Self {
        self.app_secret = secret.into();
        self
    }

    /// Sets the return URL.
    #[must_use]
    pub fn with_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = url.into();
        self
    }

    /// Sets the OAuth scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Sets the trusted apex domain.
    #[must_use]
    pub fn with_trusted_domain(mut self, domain: impl Into<String>) -> Self {
        self.trusted_domain = domain.into();
        self
    }

    /// Allows HTTP endpoints (for testing only).
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Sets the outbound request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Returns the provider endpoint for this configuration.
    ///
    /// # Errors
    ///
    /// Returns `FederationError::InvalidEndpoint` if the domain is not a URL
    /// under the trusted domain.
    pub fn endpoint(&self) -> crate::FederationResult<ProviderEndpoint> {
        ProviderEndpoint::new(&self.domain, &self.trusted_domain, self.allow_http)
    }

    /// Returns the canonical v2 redirect URI.
    ///
    /// The callback suffix is appended unless the return URL already ends
    /// with it.
    #[must_use]
    pub fn callback_url(&self) -> String {
        let base = self.redirect_url.trim();
        if base.ends_with(CALLBACK_SUFFIX) {
            return base.to_string();
        }
        format!("{}{}", base.trim_end_matches('/'), CALLBACK_SUFFIX)
    }

    /// Trims every setting and truncates over-long values.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.domain = self.domain.trim().to_string();
        self.api_key = truncate(self.api_key.trim(), MAX_SHORT_SETTING_LEN);
        self.app_secret = truncate(self.app_secret.trim(), MAX_SHORT_SETTING_LEN);
        self.scope = truncate(self.scope.trim(), MAX_SHORT_SETTING_LEN);
        self.redirect_url = truncate(self.redirect_url.trim(), MAX_URL_SETTING_LEN);
        self.trusted_domain = self.trusted_domain.trim().to_ascii_lowercase();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the provider domain fails endpoint validation,
    /// the request timeout is zero, or v2 is selected without a client id or
    /// return URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trusted_domain.trim().is_empty() {
            return Err(ConfigError::MissingValue("federation.trusted_domain".into()));
        }

        self.endpoint()
            .map_err(|e| ConfigError::InvalidValue(format!("federation.domain: {e}")))?;

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "federation.request_timeout must be > 0".into(),
            ));
        }

        if self.version.is_oauth2() {
            if self.api_key.trim().is_empty() {
                return Err(ConfigError::MissingValue("federation.api_key".into()));
            }
            if self.redirect_url.trim().is_empty() {
                return Err(ConfigError::MissingValue("federation.redirect_url".into()));
            }
        }

        Ok(())
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Where users are sent after each endpoint finishes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedirectConfig {
    /// Whether the host allows self-registration.
    pub users_can_register: bool,

    /// Registration page, used for empty handshakes when registration is open.
    pub registration_url: String,

    /// Generic landing page.
    pub landing_url: String,

    /// Profile page, shown after sign-in and identity changes.
    pub profile_url: String,

    /// Login page, shown with an error code after a provider failure.
    pub login_url: String,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            users_can_register: false,
            registration_url: "/register".to_string(),
            landing_url: "/".to_string(),
            profile_url: "/profile".to_string(),
            login_url: "/login".to_string(),
        }
    }
}

impl RedirectConfig {
    /// Returns the target for a handshake that produced no profile.
    #[must_use]
    pub fn without_profile(&self) -> &str {
        if self.users_can_register {
            &self.registration_url
        } else {
            &self.landing_url
        }
    }
}

/// Session cookie settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionCookieConfig {
    /// Name of the session cookie.
    pub cookie_name: String,

    /// Set the `Secure` attribute.
    pub secure: bool,

    /// Session lifetime.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for SessionCookieConfig {
    fn default() -> Self {
        Self {
            cookie_name: "socialgate_session".to_string(),
            secure: true,
            ttl: Duration::from_secs(8 * 3600),
        }
    }
}

impl SessionCookieConfig {
    /// Validates the session settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the cookie name is empty or the lifetime is
    /// zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cookie_name.trim().is_empty() {
            return Err(ConfigError::MissingValue("session.cookie_name".into()));
        }
        if self.ttl.is_zero() {
            return Err(ConfigError::InvalidValue("session.ttl must be > 0".into()));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    MissingValue(String),
}
