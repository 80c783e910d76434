use base58::ToBase58;
use sha2::{Digest, Sha256};

use crate::PublicKey;

/// The hash of an owning identity's public key.
///
/// This is what blocks are stored under and what storage routing is keyed
/// on; it is the SHA-256 digest of [PublicKey::serialize].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId([u8; 32]);

impl OwnerId {
    /// Compute the owner id of `key`
    pub fn of(key: &PublicKey) -> Self {
        Self(Sha256::digest(key.serialize()).into())
    }

    /// The raw digest
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for OwnerId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_base58())
    }
}

/// Identity of a storage node, as listed by a username claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(Vec<u8>);

impl NodeId {
    /// The raw identity bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for NodeId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for NodeId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_base58())
    }
}
