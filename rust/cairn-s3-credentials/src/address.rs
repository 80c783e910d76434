//! S3 storage address types.

use serde::{Deserialize, Serialize};

use crate::AuthorizationError;

/// Where a bucket lives: the host objects are addressed under and the region
/// requests are signed for.
///
/// The host is the virtual-hosted bucket name, e.g.
/// `examplebucket.s3.amazonaws.com`; objects are addressed as
/// `https://{host}/{key}`.
///
/// ```
/// use cairn_s3_credentials::Address;
///
/// let address = Address::new("examplebucket.s3.amazonaws.com", "us-east-1").unwrap();
/// assert_eq!(address.region(), "us-east-1");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    host: String,
    region: String,
}

impl Address {
    /// Create an address, rejecting hosts that carry a scheme, path or
    /// whitespace.
    pub fn new(host: impl Into<String>, region: impl Into<String>) -> Result<Self, AuthorizationError> {
        let host = host.into();
        if host.is_empty()
            || host.contains("://")
            || host.contains('/')
            || host.contains(char::is_whitespace)
        {
            return Err(AuthorizationError::InvalidHost(host));
        }
        Ok(Self {
            host,
            region: region.into(),
        })
    }

    /// Address a bucket on an endpoint host using virtual-hosted style, e.g.
    /// `bucket.account.r2.cloudflarestorage.com`
    pub fn virtual_hosted(
        bucket: &str,
        endpoint_host: &str,
        region: impl Into<String>,
    ) -> Result<Self, AuthorizationError> {
        Self::new(format!("{bucket}.{endpoint_host}"), region)
    }

    /// The host objects are addressed under
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The signing region ("auto" for R2)
    pub fn region(&self) -> &str {
        &self.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_creates_a_virtual_hosted_address() {
        let address = Address::virtual_hosted(
            "pale",
            "2c5a882977b89ac2fc7ca2f958422366.r2.cloudflarestorage.com",
            "auto",
        )
        .unwrap();

        assert_eq!(
            address.host(),
            "pale.2c5a882977b89ac2fc7ca2f958422366.r2.cloudflarestorage.com"
        );
        assert_eq!(address.region(), "auto");
    }

    #[test]
    fn it_rejects_hosts_with_a_scheme_or_path() {
        assert!(Address::new("https://s3.amazonaws.com", "us-east-1").is_err());
        assert!(Address::new("s3.amazonaws.com/bucket", "us-east-1").is_err());
        assert!(Address::new("", "us-east-1").is_err());
    }

    #[test]
    fn it_keeps_a_port_in_the_host() {
        let address = Address::new("localhost:9000", "us-east-1").unwrap();
        assert_eq!(address.host(), "localhost:9000");
    }

    #[test]
    fn it_deserializes_from_configuration() {
        let address: Address = serde_json::from_str(
            r#"{ "host": "examplebucket.s3.amazonaws.com", "region": "us-east-1" }"#,
        )
        .unwrap();
        assert_eq!(address.host(), "examplebucket.s3.amazonaws.com");
    }
}
