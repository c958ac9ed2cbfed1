//! Profile normalization.
//!
//! Providers return a JSON document shaped like
//!
//! ```json
//! {
//!   "profile": {
//!     "identifier": "u1",
//!     "preferredUsername": "jane",
//!     "displayName": "Jane Doe",
//!     "email": "jane@example.com",
//!     "accounts": { "domain": "google.com" },
//!     "accessToken": "...",
//!     "refreshToken": "...",
//!     "accessTokenExpirationUtc": "...",
//!     "accessTokenIssueDateUtc": "...",
//!     "callback": "..."
//!   }
//! }
//! ```
//!
//! or `{"error": {"error_description": "..."}}` when the provider refuses the
//! token. [`ProfileNormalizer`] turns either shape into a [`Profile`] or an
//! error.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FederationResult;
use crate::config::ProtocolVersion;
use crate::error::FederationError;
use crate::federation::identity::IdentityKey;

/// Provider domain used when the payload names none.
pub const FALLBACK_PROVIDER: &str = "stitchz.net";

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+'\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)+$")
        .expect("Invalid email regex")
});

static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Returns `true` if `value` looks like a deliverable email address.
#[must_use]
pub fn is_valid_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

/// Reduces a candidate login name to the safe charset.
///
/// Keeps ASCII letters and digits, space, `_`, `.`, `-` and `@`, collapses
/// whitespace runs and trims the result.
#[must_use]
pub fn sanitize_login(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '-' | '@'))
        .collect();
    WHITESPACE_REGEX.replace_all(&kept, " ").trim().to_string()
}

// =============================================================================
// Profile Types
// =============================================================================

/// OAuth2 credential metadata returned by a v2 handshake.
///
/// Stored per account, never per link. Timestamps are kept exactly as the
/// provider sent them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialMetadata {
    /// Provider access token.
    pub access_token: String,
    /// Provider refresh token.
    pub refresh_token: String,
    /// Access token expiry (UTC, provider format).
    pub access_token_expiry: String,
    /// Access token issue time (UTC, provider format).
    pub access_token_issued_at: String,
    /// Callback the provider associated with the grant.
    pub callback: String,
}

impl fmt::Debug for CredentialMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialMetadata")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("access_token_expiry", &self.access_token_expiry)
            .field("access_token_issued_at", &self.access_token_issued_at)
            .field("callback", &self.callback)
            .finish()
    }
}

/// The email chosen for a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEmail {
    /// The address.
    pub address: String,
    /// `true` for a placeholder built from the username and provider domain.
    pub synthetic: bool,
}

/// A provider profile in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Provider-scoped unique identifier. Never empty.
    pub external_id: String,
    /// Provider domain as reported (or the fallback).
    pub provider_domain: String,
    /// Lookup key built from the normalized provider name and external id.
    pub identity_key: IdentityKey,
    /// Sanitized login name candidate.
    pub username: String,
    /// Raw preferred username.
    pub preferred_username: Option<String>,
    /// Raw display name.
    pub display_name: Option<String>,
    /// Email to use for a new account.
    pub email: ResolvedEmail,
    /// Given name.
    pub given_name: Option<String>,
    /// Family name.
    pub family_name: Option<String>,
    /// Personal URL.
    pub url: Option<String>,
    /// Free-text description.
    pub about_me: Option<String>,
    /// OAuth2 credentials (v2 only, complete sets only).
    pub credential: Option<CredentialMetadata>,
}

impl Profile {
    /// Returns the normalized provider name.
    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.identity_key.provider()
    }

    /// Returns the display name, falling back to the username.
    #[must_use]
    pub fn display_name_or_username(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

// =============================================================================
// Raw Payload
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProfile {
    #[serde(default)]
    identifier: Option<Value>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    about_me: Option<String>,
    #[serde(default)]
    accounts: Option<Value>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    access_token_expiration_utc: Option<String>,
    #[serde(default)]
    access_token_issue_date_utc: Option<String>,
    #[serde(default)]
    callback: Option<String>,
}

impl RawProfile {
    fn identifier(&self) -> Option<String> {
        match self.identifier.as_ref()? {
            Value::String(s) => non_empty(Some(s.clone())),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn provider_domain(&self) -> Option<String> {
        let accounts = self.accounts.as_ref()?;
        let account = match accounts {
            Value::Array(items) => items.first()?,
            other => other,
        };
        account
            .get("domain")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
    }

    fn credential(&self) -> Option<CredentialMetadata> {
        Some(CredentialMetadata {
            access_token: non_empty(self.access_token.clone())?,
            refresh_token: non_empty(self.refresh_token.clone())?,
            access_token_expiry: non_empty(self.access_token_expiration_utc.clone())?,
            access_token_issued_at: non_empty(self.access_token_issue_date_utc.clone())?,
            callback: non_empty(self.callback.clone())?,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// =============================================================================
// Normalizer
// =============================================================================

/// Maps raw provider payloads to [`Profile`] records.
#[derive(Debug, Clone)]
pub struct ProfileNormalizer {
    version: ProtocolVersion,
    fallback_provider: String,
}

impl ProfileNormalizer {
    /// Creates a normalizer for the given protocol version.
    #[must_use]
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            fallback_provider: FALLBACK_PROVIDER.to_string(),
        }
    }

    /// Overrides the provider domain used when the payload names none.
    #[must_use]
    pub fn with_fallback_provider(mut self, provider: impl Into<String>) -> Self {
        self.fallback_provider = provider.into();
        self
    }

    /// Normalizes a raw provider payload.
    ///
    /// # Errors
    ///
    /// - `ProviderRejected` if the payload carries an `error` object
    /// - `MalformedProfile` if there is no `profile` object or it has no
    ///   `identifier`
    pub fn normalize(&self, payload: &Value) -> FederationResult<Profile> {
        if let Some(error) = payload.get("error").filter(|e| !e.is_null()) {
            let description = error
                .get("error_description")
                .and_then(Value::as_str)
                .filter(|d| !d.trim().is_empty())
                .or_else(|| error.as_str())
                .unwrap_or("Unknown error, please contact your website administrator.");
            tracing::warn!(description = %description, "Provider returned an error object");
            return Err(FederationError::provider_rejected(description));
        }

        let raw = payload
            .get("profile")
            .filter(|p| p.is_object())
            .ok_or_else(|| FederationError::MalformedProfile("missing profile object".into()))?;

        let raw: RawProfile = serde_json::from_value(raw.clone())
            .map_err(|e| FederationError::MalformedProfile(e.to_string()))?;

        let external_id = raw
            .identifier()
            .ok_or_else(|| FederationError::MalformedProfile("missing profile.identifier".into()))?;

        let provider_domain = raw
            .provider_domain()
            .unwrap_or_else(|| self.fallback_provider.clone());

        let identity_key = IdentityKey::new(&provider_domain, &external_id)?;

        let username = [
            raw.preferred_username.as_deref(),
            raw.display_name.as_deref(),
            Some(external_id.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(sanitize_login)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or_else(|| format!("{}-user", identity_key.provider().to_lowercase()));

        let email = resolve_email(raw.email.as_deref(), &username, &provider_domain);

        let credential = if self.version.is_oauth2() {
            let credential = raw.credential();
            if credential.is_none() && raw.access_token.is_some() {
                tracing::debug!(
                    identity_key = %identity_key,
                    "Dropping incomplete credential set"
                );
            }
            credential
        } else {
            None
        };

        Ok(Profile {
            external_id,
            provider_domain,
            identity_key,
            username,
            preferred_username: non_empty(raw.preferred_username),
            display_name: non_empty(raw.display_name),
            email,
            given_name: non_empty(raw.given_name),
            family_name: non_empty(raw.family_name),
            url: non_empty(raw.url),
            about_me: non_empty(raw.about_me),
            credential,
        })
    }
}

fn resolve_email(email: Option<&str>, username: &str, provider_domain: &str) -> ResolvedEmail {
    if let Some(email) = email.map(str::trim).filter(|e| is_valid_email(e)) {
        return ResolvedEmail {
            address: email.to_string(),
            synthetic: false,
        };
    }

    if is_valid_email(username) {
        return ResolvedEmail {
            address: username.to_string(),
            synthetic: false,
        };
    }

    let local: String = username.chars().filter(|c| !c.is_whitespace()).collect();
    ResolvedEmail {
        address: format!("{local}@{}", provider_domain.to_lowercase()),
        synthetic: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v2() -> ProfileNormalizer {
        ProfileNormalizer::new(ProtocolVersion::V2)
    }

    #[test]
    fn test_sanitize_login() {
        assert_eq!(sanitize_login("Jane Doe"), "Jane Doe");
        assert_eq!(sanitize_login("  jane\t\n doe  "), "jane doe");
        assert_eq!(sanitize_login("<b>jané</b>!"), "bjanb");
        assert_eq!(sanitize_login("jane.doe@example.com"), "jane.doe@example.com");
        assert_eq!(sanitize_login("名前"), "");
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("jane.o'neil+tag@mail.example.co.uk"));
        assert!(!is_valid_email("jane"));
        assert!(!is_valid_email("jane@localhost"));
        assert!(!is_valid_email("Jane Doe@example.com"));
    }

    #[test]
    fn test_normalize_scenario_profile() {
        let payload = json!({
            "profile": {
                "identifier": "u1",
                "displayName": "Jane Doe",
                "email": "jane@example.com",
                "accounts": {"domain": "google.com"}
            }
        });

        let profile = v2().normalize(&payload).unwrap();
        assert_eq!(profile.external_id, "u1");
        assert_eq!(profile.provider_domain, "google.com");
        assert_eq!(profile.provider_name(), "Google");
        assert_eq!(profile.identity_key.to_string(), "Google|u1");
        assert_eq!(profile.username, "Jane Doe");
        assert_eq!(profile.email.address, "jane@example.com");
        assert!(!profile.email.synthetic);
        assert!(profile.credential.is_none());
    }

    #[test]
    fn test_normalize_missing_identifier() {
        let payload = json!({"profile": {"displayName": "Jane"}});
        let err = v2().normalize(&payload).unwrap_err();
        assert!(matches!(err, FederationError::MalformedProfile(_)));

        let payload = json!({"profile": {"identifier": ""}});
        assert!(v2().normalize(&payload).is_err());

        let payload = json!({"something": "else"});
        assert!(matches!(
            v2().normalize(&payload),
            Err(FederationError::MalformedProfile(_))
        ));
    }

    #[test]
    fn test_normalize_numeric_identifier() {
        let payload = json!({"profile": {"identifier": 12345}});
        let profile = v2().normalize(&payload).unwrap();
        assert_eq!(profile.external_id, "12345");
        assert_eq!(profile.identity_key.to_string(), "Stitchz|12345");
    }

    #[test]
    fn test_normalize_error_object() {
        let payload = json!({"error": {"error_description": "Token expired"}});
        let err = v2().normalize(&payload).unwrap_err();
        match err {
            FederationError::ProviderRejected { description } => {
                assert_eq!(description, "Token expired");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_username_resolution_order() {
        let payload = json!({"profile": {
            "identifier": "u1",
            "preferredUsername": "jdoe",
            "displayName": "Jane Doe"
        }});
        assert_eq!(v2().normalize(&payload).unwrap().username, "jdoe");

        let payload = json!({"profile": {"identifier": "u1", "preferredUsername": "", "displayName": "Jane Doe"}});
        assert_eq!(v2().normalize(&payload).unwrap().username, "Jane Doe");

        let payload = json!({"profile": {"identifier": "u1", "preferredUsername": "***"}});
        assert_eq!(v2().normalize(&payload).unwrap().username, "u1");
    }

    #[test]
    fn test_email_fallbacks() {
        let payload = json!({"profile": {
            "identifier": "u1",
            "preferredUsername": "jane@example.org",
            "email": "not-an-email"
        }});
        let profile = v2().normalize(&payload).unwrap();
        assert_eq!(profile.email.address, "jane@example.org");
        assert!(!profile.email.synthetic);

        let payload = json!({"profile": {
            "identifier": "u1",
            "preferredUsername": "jane",
            "accounts": {"domain": "google.com"}
        }});
        let profile = v2().normalize(&payload).unwrap();
        assert_eq!(profile.email.address, "jane@google.com");
        assert!(profile.email.synthetic);

        let payload = json!({"profile": {"identifier": "u1", "displayName": "Jane Doe"}});
        let profile = v2().normalize(&payload).unwrap();
        assert_eq!(profile.email.address, "JaneDoe@stitchz.net");
        assert!(profile.email.synthetic);
    }

    #[test]
    fn test_credentials_complete_set() {
        let payload = json!({"profile": {
            "identifier": "u1",
            "accessToken": "at",
            "refreshToken": "rt",
            "accessTokenExpirationUtc": "2026-01-01T00:00:00Z",
            "accessTokenIssueDateUtc": "2025-12-31T00:00:00Z",
            "callback": "https://www.example.com/social_login/auth"
        }});

        let credential = v2().normalize(&payload).unwrap().credential.unwrap();
        assert_eq!(credential.access_token, "at");
        assert_eq!(credential.refresh_token, "rt");
        assert_eq!(credential.access_token_expiry, "2026-01-01T00:00:00Z");

        let v1 = ProfileNormalizer::new(ProtocolVersion::V1);
        assert!(v1.normalize(&payload).unwrap().credential.is_none());
    }

    #[test]
    fn test_credentials_partial_set_dropped() {
        let fields = [
            "accessToken",
            "refreshToken",
            "accessTokenExpirationUtc",
            "accessTokenIssueDateUtc",
            "callback",
        ];
        for missing in fields {
            let mut profile = json!({
                "identifier": "u1",
                "accessToken": "at",
                "refreshToken": "rt",
                "accessTokenExpirationUtc": "e",
                "accessTokenIssueDateUtc": "i",
                "callback": "c"
            });
            profile.as_object_mut().unwrap().remove(missing);
            let payload = json!({ "profile": profile });
            assert!(
                v2().normalize(&payload).unwrap().credential.is_none(),
                "credential kept without {missing}"
            );
        }
    }

    #[test]
    fn test_credential_debug_redacts_tokens() {
        let credential = CredentialMetadata {
            access_token: "secret-at".into(),
            refresh_token: "secret-rt".into(),
            access_token_expiry: "e".into(),
            access_token_issued_at: "i".into(),
            callback: "c".into(),
        };
        let debug = format!("{credential:?}");
        assert!(!debug.contains("secret-at"));
        assert!(!debug.contains("secret-rt"));
    }

    #[test]
    fn test_accounts_array_and_fallback() {
        let payload = json!({"profile": {"identifier": "u1", "accounts": [{"domain": "twitter.com"}]}});
        let profile = v2().normalize(&payload).unwrap();
        assert_eq!(profile.identity_key.to_string(), "Twitter|u1");

        let normalizer = v2().with_fallback_provider("example.net");
        let payload = json!({"profile": {"identifier": "u1"}});
        assert_eq!(
            normalizer.normalize(&payload).unwrap().identity_key.to_string(),
            "Example|u1"
        );
    }

    #[test]
    fn test_display_name_or_username() {
        let payload = json!({"profile": {"identifier": "u1", "preferredUsername": "jdoe"}});
        let profile = v2().normalize(&payload).unwrap();
        assert_eq!(profile.display_name_or_username(), "jdoe");
    }
}
