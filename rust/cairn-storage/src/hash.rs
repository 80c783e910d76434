//! Content hashes and the object keys they are stored under.
//!
//! A block is addressed by a CIDv1 whose multihash is normally SHA-256. In
//! the object store it lives under the uppercase, unpadded RFC 4648 base32
//! encoding of the CID bytes, which is reversible back to the CID.

use base32::Alphabet;
use ipld_core::cid::{Cid, multihash::Multihash};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::StorageError;

/// A self-describing digest identifying a block
pub type ContentHash = Cid;

/// Multihash code of the identity "hash", whose digest is the content itself
pub const IDENTITY_CODE: u64 = 0x00;
/// Multihash code of SHA2-256
pub const SHA2_256_CODE: u64 = 0x12;
/// Multicodec of raw bytes
pub const RAW_CODEC: u64 = 0x55;
/// Multicodec of DAG-CBOR
pub const DAG_CBOR_CODEC: u64 = 0x71;

const KEY_ALPHABET: Alphabet = Alphabet::Rfc4648 { padding: false };

/// Whether blocks are structured DAG-CBOR objects or opaque bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    /// DAG-CBOR encoded objects
    Cbor,
    /// Raw bytes
    Raw,
}

impl BlockKind {
    /// The multicodec that CIDs of this kind of block carry
    pub fn codec(&self) -> u64 {
        match self {
            BlockKind::Cbor => DAG_CBOR_CODEC,
            BlockKind::Raw => RAW_CODEC,
        }
    }
}

/// The SHA-256 CID of `block`
pub fn hash_block(block: &[u8], kind: BlockKind) -> Result<ContentHash, StorageError> {
    let digest = Sha256::digest(block);
    let multihash = Multihash::<64>::wrap(SHA2_256_CODE, &digest)
        .map_err(|error| StorageError::Decode(error.to_string()))?;
    Ok(Cid::new_v1(kind.codec(), multihash))
}

/// A CID that embeds `bytes` directly rather than hashing them
pub fn identity_hash(bytes: &[u8], kind: BlockKind) -> Result<ContentHash, StorageError> {
    let multihash = Multihash::<64>::wrap(IDENTITY_CODE, bytes)
        .map_err(|error| StorageError::Decode(error.to_string()))?;
    Ok(Cid::new_v1(kind.codec(), multihash))
}

/// The block bytes carried by an identity hash, or `None` for any other
/// hash function
pub fn inline_bytes(hash: &ContentHash) -> Option<&[u8]> {
    (hash.hash().code() == IDENTITY_CODE).then(|| hash.hash().digest())
}

/// The object key a block is stored under
pub fn hash_to_key(hash: &ContentHash) -> String {
    base32::encode(KEY_ALPHABET, &hash.to_bytes())
}

/// Recover the content hash from an object key produced by [hash_to_key]
pub fn key_to_hash(key: &str) -> Result<ContentHash, StorageError> {
    let bytes =
        base32::decode(KEY_ALPHABET, key).ok_or_else(|| StorageError::InvalidKey(key.into()))?;
    Cid::try_from(bytes.as_slice()).map_err(|_| StorageError::InvalidKey(key.into()))
}

/// Check that `block` is the content `hash` names.
///
/// SHA-256 and identity hashes are checked; other hash functions are
/// accepted as is.
pub fn verify_block(hash: &ContentHash, block: &[u8]) -> Result<(), StorageError> {
    let digest = hash.hash().digest();
    let matches = match hash.hash().code() {
        SHA2_256_CODE => Sha256::digest(block).as_slice() == digest,
        IDENTITY_CODE => block == digest,
        _ => true,
    };
    if matches {
        Ok(())
    } else {
        Err(StorageError::Integrity(hash.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_encodes_keys_as_uppercase_unpadded_base32() {
        let hash = hash_block(b"hello", BlockKind::Raw).unwrap();
        let key = hash_to_key(&hash);

        assert!(key.starts_with("AFKRE"));
        assert!(!key.contains('='));
        assert_eq!(key, key.to_uppercase());
        assert_eq!(key_to_hash(&key).unwrap(), hash);
    }

    #[test]
    fn it_rejects_keys_that_are_not_hashes() {
        assert!(matches!(
            key_to_hash("not-base32!"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            key_to_hash("AAAA"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn it_tags_blocks_with_their_codec() {
        let raw = hash_block(b"block", BlockKind::Raw).unwrap();
        let cbor = hash_block(b"block", BlockKind::Cbor).unwrap();

        assert_eq!(raw.codec(), RAW_CODEC);
        assert_eq!(cbor.codec(), DAG_CBOR_CODEC);
        assert_eq!(raw.hash(), cbor.hash());
    }

    #[test]
    fn it_exposes_inline_bytes_of_identity_hashes_only() {
        let inline = identity_hash(b"tiny", BlockKind::Raw).unwrap();
        let hashed = hash_block(b"tiny", BlockKind::Raw).unwrap();

        assert_eq!(inline_bytes(&inline), Some(&b"tiny"[..]));
        assert_eq!(inline_bytes(&hashed), None);
    }

    #[test]
    fn it_verifies_block_contents() {
        let hash = hash_block(b"expected", BlockKind::Raw).unwrap();

        assert!(verify_block(&hash, b"expected").is_ok());
        assert!(matches!(
            verify_block(&hash, b"tampered"),
            Err(StorageError::Integrity(_))
        ));
    }
}
