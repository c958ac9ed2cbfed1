//! Federation error types.
//!
//! Every failure a handshake, identity link or unlink can produce is a
//! [`FederationError`]. Callers use [`FederationError::category`] to decide
//! what the end user sees and whether to offer a retry.

use std::fmt;

use crate::federation::IdentityKey;
use crate::storage::AccountField;

/// User-facing category of a provider HTTP failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolErrorKind {
    /// HTTP 400.
    BadRequest,
    /// HTTP 401.
    Unauthorized,
    /// HTTP 404.
    NotFound,
    /// HTTP 500.
    ServerError,
}

impl ProtocolErrorKind {
    /// Maps an HTTP status to a category.
    ///
    /// Returns `None` for statuses the provider contract does not assign a
    /// meaning to; those are treated as "no profile".
    #[must_use]
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            400 => Some(Self::BadRequest),
            401 => Some(Self::Unauthorized),
            404 => Some(Self::NotFound),
            500 => Some(Self::ServerError),
            _ => None,
        }
    }

    /// Returns the stable string code for this category.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::ServerError => "server_error",
        }
    }

    /// Returns the message shown to the end user.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest => "Bad Request. Double check your API Key and App Secret and try again.",
            Self::Unauthorized => {
                "Unauthorized request. Double check your API Key and App Secret and try again."
            }
            Self::NotFound => "Not Found. Double check your relaying party URL and try again.",
            Self::ServerError => {
                "Internal Server Error. Ensure the service provider is available and contact your service provider."
            }
        }
    }
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during federation operations.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    /// The target host is not an allowed provider endpoint.
    ///
    /// Raised before any network call is attempted.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The request never produced an HTTP response (DNS, TLS, timeout, ...).
    #[error("Transport failure: {0}")]
    TransportFailure(#[source] reqwest::Error),

    /// The provider answered with a mapped 4xx/5xx status.
    #[error("Provider returned HTTP {status} ({kind})")]
    ProtocolError {
        /// The HTTP status code.
        status: u16,
        /// The user-facing category.
        kind: ProtocolErrorKind,
    },

    /// The provider answered 200 with an error object instead of a profile.
    #[error("Provider rejected the request: {description}")]
    ProviderRejected {
        /// The provider's error description.
        description: String,
    },

    /// The profile payload lacks required fields or is not valid JSON.
    #[error("Malformed profile: {0}")]
    MalformedProfile(String),

    /// The host rejected the new account's fields.
    #[error("Account creation failed: {0}")]
    AccountCreationFailed(String),

    /// A login name or email was taken after it had been checked as free.
    ///
    /// Provisioning reruns the unique-name search when it sees this.
    #[error("Account creation failed: {field} '{value}' is taken")]
    NameTaken {
        /// The unique field that collided.
        field: AccountField,
        /// The value that was taken.
        value: String,
    },

    /// The acting principal may not perform this operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Another link already exists for this identity key.
    #[error("Identity {0} is already linked")]
    LinkConflict(IdentityKey),

    /// The referenced link does not exist or belongs to another account.
    #[error("Identity link not found: {0}")]
    LinkNotFound(String),

    /// The operation requires an authenticated principal.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The bounded search for a unique login name or email ran out.
    ///
    /// This indicates a defect in the host's uniqueness checks.
    #[error("Unable to find a unique {field} for '{base}' after {attempts} attempts")]
    UniqueNameExhausted {
        /// Which field was being searched ("login" or "email").
        field: &'static str,
        /// The starting candidate.
        base: String,
        /// How many candidates were tried.
        attempts: usize,
    },

    /// A collaborator store failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },
}

impl FederationError {
    /// Creates a `ProtocolError` for a mapped status.
    #[must_use]
    pub fn protocol(status: u16, kind: ProtocolErrorKind) -> Self {
        Self::ProtocolError { status, kind }
    }

    /// Creates a `ProviderRejected` error.
    #[must_use]
    pub fn provider_rejected(description: impl Into<String>) -> Self {
        Self::ProviderRejected {
            description: description.into(),
        }
    }

    /// Creates a `NameTaken` error.
    #[must_use]
    pub fn name_taken(field: AccountField, value: impl Into<String>) -> Self {
        Self::NameTaken {
            field,
            value: value.into(),
        }
    }

    /// Creates a `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller may retry the whole handshake.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportFailure(_) | Self::LinkConflict(_))
    }

    /// Returns `true` if the error came from the provider or the network.
    #[must_use]
    pub fn is_external_error(&self) -> bool {
        matches!(
            self,
            Self::TransportFailure(_) | Self::ProtocolError { .. } | Self::ProviderRejected { .. }
        )
    }

    /// Returns `true` if this error indicates a defect rather than a normal
    /// failure path.
    #[must_use]
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::UniqueNameExhausted { .. })
    }

    /// Returns the error category for logging and user messaging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidEndpoint(_) => ErrorCategory::Configuration,
            Self::TransportFailure(_) => ErrorCategory::Transport,
            Self::ProtocolError { .. } | Self::ProviderRejected { .. } => ErrorCategory::Provider,
            Self::MalformedProfile(_) => ErrorCategory::Profile,
            Self::AccountCreationFailed(_)
            | Self::NameTaken { .. }
            | Self::UniqueNameExhausted { .. } => ErrorCategory::Provisioning,
            Self::PermissionDenied(_) | Self::NotAuthenticated => ErrorCategory::Authorization,
            Self::LinkConflict(_) | Self::LinkNotFound(_) => ErrorCategory::Link,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
        }
    }

    /// Returns a short code suitable for a redirect query parameter.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidEndpoint(_) => "invalid_endpoint",
            Self::TransportFailure(_) => "transport_failure",
            Self::ProtocolError { kind, .. } => kind.as_str(),
            Self::ProviderRejected { .. } => "provider_error",
            Self::MalformedProfile(_) => "malformed_profile",
            Self::AccountCreationFailed(_) | Self::NameTaken { .. } => "account_creation_failed",
            Self::PermissionDenied(_) => "permission_denied",
            Self::LinkConflict(_) => "link_conflict",
            Self::LinkNotFound(_) => "link_not_found",
            Self::NotAuthenticated => "not_authenticated",
            Self::UniqueNameExhausted { .. } => "server_error",
            Self::Storage { .. } => "server_error",
        }
    }
}

/// Categories of federation errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Misconfigured provider endpoint.
    Configuration,
    /// Network-level failure.
    Transport,
    /// Provider answered with an error.
    Provider,
    /// Profile payload problems.
    Profile,
    /// Account creation problems.
    Provisioning,
    /// Authentication or permission problems.
    Authorization,
    /// Identity link problems.
    Link,
    /// Store failures.
    Infrastructure,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Transport => write!(f, "transport"),
            Self::Provider => write!(f, "provider"),
            Self::Profile => write!(f, "profile"),
            Self::Provisioning => write!(f, "provisioning"),
            Self::Authorization => write!(f, "authorization"),
            Self::Link => write!(f, "link"),
            Self::Infrastructure => write!(f, "infrastructure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_kind_from_status() {
        assert_eq!(
            ProtocolErrorKind::from_status(400),
            Some(ProtocolErrorKind::BadRequest)
        );
        assert_eq!(
            ProtocolErrorKind::from_status(401),
            Some(ProtocolErrorKind::Unauthorized)
        );
        assert_eq!(
            ProtocolErrorKind::from_status(404),
            Some(ProtocolErrorKind::NotFound)
        );
        assert_eq!(
            ProtocolErrorKind::from_status(500),
            Some(ProtocolErrorKind::ServerError)
        );
        assert_eq!(ProtocolErrorKind::from_status(403), None);
        assert_eq!(ProtocolErrorKind::from_status(502), None);
    }

    #[test]
    fn test_error_display() {
        let err = FederationError::protocol(401, ProtocolErrorKind::Unauthorized);
        assert_eq!(err.to_string(), "Provider returned HTTP 401 (unauthorized)");

        let err = FederationError::provider_rejected("token expired");
        assert!(err.to_string().contains("token expired"));

        let key = IdentityKey::new("google.com", "u1").unwrap();
        let err = FederationError::LinkConflict(key);
        assert_eq!(err.to_string(), "Identity Google|u1 is already linked");

        let err = FederationError::UniqueNameExhausted {
            field: "login",
            base: "jane".to_string(),
            attempts: 3,
        };
        assert!(err.to_string().contains("'jane'"));
    }

    #[test]
    fn test_error_predicates() {
        let key = IdentityKey::new("google", "u1").unwrap();
        assert!(FederationError::LinkConflict(key).is_retryable());
        assert!(!FederationError::MalformedProfile("x".into()).is_retryable());

        assert!(FederationError::protocol(500, ProtocolErrorKind::ServerError).is_external_error());
        assert!(FederationError::provider_rejected("x").is_external_error());
        assert!(!FederationError::NotAuthenticated.is_external_error());

        let exhausted = FederationError::UniqueNameExhausted {
            field: "email",
            base: "a@b.c".into(),
            attempts: 1,
        };
        assert!(exhausted.is_defect());
        assert!(!FederationError::storage("x").is_defect());
    }

    #[test]
    fn test_error_category_and_code() {
        let err = FederationError::protocol(404, ProtocolErrorKind::NotFound);
        assert_eq!(err.category(), ErrorCategory::Provider);
        assert_eq!(err.error_code(), "not_found");

        let err = FederationError::PermissionDenied("nope".into());
        assert_eq!(err.category(), ErrorCategory::Authorization);
        assert_eq!(err.category().to_string(), "authorization");

        let err = FederationError::InvalidEndpoint("evil.example".into());
        assert_eq!(err.error_code(), "invalid_endpoint");

        let err = FederationError::name_taken(AccountField::Login, "jane");
        assert_eq!(err.category(), ErrorCategory::Provisioning);
        assert_eq!(err.error_code(), "account_creation_failed");
        assert_eq!(err.to_string(), "Account creation failed: login 'jane' is taken");
    }
}
