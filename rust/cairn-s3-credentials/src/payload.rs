//! The payload hash that a signed request commits to.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::hex_encode;

/// The `x-amz-content-sha256` value of a request.
///
/// Requests whose body is not known ahead of signing (GET, HEAD, DELETE,
/// listings) use [PayloadHash::Unsigned]; uploads commit to the SHA-256 of
/// the body, which the store verifies on receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadHash {
    /// The `UNSIGNED-PAYLOAD` sentinel
    Unsigned,
    /// SHA-256 digest of the body
    Sha256([u8; 32]),
}

impl PayloadHash {
    /// Hash `body`
    pub fn of(body: &[u8]) -> Self {
        Self::Sha256(Sha256::digest(body).into())
    }
}

impl std::fmt::Display for PayloadHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsigned => f.write_str("UNSIGNED-PAYLOAD"),
            Self::Sha256(digest) => f.write_str(&hex_encode(digest)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_renders_the_empty_body_hash() {
        assert_eq!(
            PayloadHash::of(b"").to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn it_renders_the_unsigned_sentinel() {
        assert_eq!(PayloadHash::Unsigned.to_string(), "UNSIGNED-PAYLOAD");
    }
}
