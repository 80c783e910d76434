use serde::{Deserialize, Serialize};

/// A URL and header set carrying a precomputed authorization.
///
/// Whoever holds it can perform the request it was signed for without
/// access to the secret key, until it expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedRequest {
    /// The full request URL
    pub url: String,
    /// Headers that must be included in the HTTP request
    pub headers: Vec<(String, String)>,
}

impl PresignedRequest {
    /// A request that needs no headers beyond what the client adds itself
    pub fn unsigned(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Look up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The object key: the final path segment of the URL
    pub fn object_key(&self) -> &str {
        let path = self.url.split(['?', '#']).next().unwrap_or_default();
        path.rsplit('/').next().unwrap_or_default()
    }
}
