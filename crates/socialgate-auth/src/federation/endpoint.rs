//! Provider endpoint validation.
//!
//! Every outbound call is addressed through a [`ProviderEndpoint`], which only
//! exists for base URLs whose host is the trusted apex domain or one of its
//! subdomains. Building a request URL re-checks the host, so a crafted path
//! cannot redirect a call elsewhere.

use url::Url;

use crate::FederationResult;
use crate::error::FederationError;

/// A validated provider base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoint {
    base: Url,
    trusted_domain: String,
    allow_http: bool,
}

impl ProviderEndpoint {
    /// Validates a provider base URL.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` if the URL does not parse, uses a scheme
    /// other than HTTPS (HTTP only with `allow_http`), or its host is outside
    /// `trusted_domain`.
    pub fn new(domain: &str, trusted_domain: &str, allow_http: bool) -> FederationResult<Self> {
        let trusted_domain = trusted_domain.trim().trim_matches('.').to_ascii_lowercase();
        let mut base = Url::parse(domain.trim())
            .map_err(|e| FederationError::InvalidEndpoint(format!("{domain}: {e}")))?;

        check_url(&base, &trusted_domain, allow_http)?;

        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self {
            base,
            trusted_domain,
            allow_http,
        })
    }

    /// Returns the normalized base URL (always ending in `/`).
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Returns the trusted apex domain.
    #[must_use]
    pub fn trusted_domain(&self) -> &str {
        &self.trusted_domain
    }

    /// Resolves a path relative to the base URL and validates the result.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` if the joined URL is invalid or leaves the
    /// trusted domain.
    pub fn join(&self, path: &str) -> FederationResult<Url> {
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| FederationError::InvalidEndpoint(format!("{path}: {e}")))?;
        self.validate(&url)?;
        Ok(url)
    }

    /// Validates an arbitrary URL against this endpoint's rules.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` if the URL fails validation.
    pub fn validate(&self, url: &Url) -> FederationResult<()> {
        check_url(url, &self.trusted_domain, self.allow_http)
    }
}

/// Returns `true` if `host` is `trusted_domain` or a subdomain of it.
#[must_use]
pub fn is_trusted_host(host: &str, trusted_domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let trusted = trusted_domain.trim_matches('.').to_ascii_lowercase();
    if trusted.is_empty() {
        return false;
    }
    host == trusted || host.ends_with(&format!(".{trusted}"))
}

fn check_url(url: &Url, trusted_domain: &str, allow_http: bool) -> FederationResult<()> {
    match url.scheme() {
        "https" => {}
        "http" if allow_http => {}
        scheme => {
            return Err(FederationError::InvalidEndpoint(format!(
                "scheme '{scheme}' is not allowed for {url}"
            )));
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| FederationError::InvalidEndpoint(format!("{url} has no host")))?;

    if !is_trusted_host(host, trusted_domain) {
        tracing::warn!(host = %host, trusted_domain = %trusted_domain, "Rejected provider endpoint");
        return Err(FederationError::InvalidEndpoint(format!(
            "host '{host}' is not under {trusted_domain}"
        )));
    }

    Ok(())
}
