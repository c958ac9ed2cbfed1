//! Inbound token extraction.
//!
//! The provider sends the browser back with a `token` parameter. It is read
//! from the form body first, then the query string. Cookies are never
//! consulted. A missing token means no handshake is in progress.

use serde::Deserialize;

/// Name of the inbound token parameter.
pub const TOKEN_PARAM: &str = "token";

/// The `token` parameter of a query string or form body.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TokenParams {
    /// The inbound token, if present.
    #[serde(default)]
    pub token: Option<String>,
}

impl TokenParams {
    fn value(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Picks the inbound token by precedence: form body, then query string.
#[must_use]
pub fn select_token(form: Option<&TokenParams>, query: &TokenParams) -> Option<String> {
    form.and_then(TokenParams::value)
        .or_else(|| query.value())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(token: Option<&str>) -> TokenParams {
        TokenParams {
            token: token.map(str::to_string),
        }
    }

    #[test]
    fn test_form_wins_over_query() {
        let form = params(Some("from-form"));
        let token = select_token(Some(&form), &params(Some("from-query")));
        assert_eq!(token.as_deref(), Some("from-form"));
    }

    #[test]
    fn test_blank_form_falls_back_to_query() {
        let blank_form = params(Some("  "));
        let token = select_token(Some(&blank_form), &params(Some("from-query")));
        assert_eq!(token.as_deref(), Some("from-query"));
    }

    #[test]
    fn test_no_token() {
        assert!(select_token(None, &params(None)).is_none());
        assert!(select_token(Some(&params(Some(""))), &params(Some(" "))).is_none());
    }
}
