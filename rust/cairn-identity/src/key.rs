//! Ed25519 key material used to sign claims and certify key rotation.

use base58::ToBase58;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::{IdentityError, OwnerId};

/// Multicodec prefix for an Ed25519 public key
const ED25519_PUB_PREFIX: [u8; 2] = [0xed, 0x01];

/// Length of an Ed25519 signature that prefixes every signed message
pub const SIGNATURE_LENGTH: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// An Ed25519 verification key.
///
/// Signed messages are the 64-byte signature followed by the payload;
/// [PublicKey::unsign] verifies one and returns the payload.
#[derive(Debug, Clone, Copy)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Length of the serialized form (prefix plus key bytes)
    pub const SERIALIZED_LENGTH: usize = 34;

    /// Serialize as the multicodec-prefixed key bytes
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SERIALIZED_LENGTH);
        bytes.extend_from_slice(&ED25519_PUB_PREFIX);
        bytes.extend_from_slice(self.0.as_bytes());
        bytes
    }

    /// Parse the output of [PublicKey::serialize]
    pub fn deserialize(bytes: &[u8]) -> Result<Self, IdentityError> {
        let raw = bytes
            .strip_prefix(&ED25519_PUB_PREFIX)
            .ok_or_else(|| IdentityError::Malformed("missing Ed25519 key prefix".into()))?;
        let raw: [u8; 32] = raw.try_into().map_err(|_| {
            IdentityError::Malformed(format!("expected 32 key bytes, got {}", raw.len()))
        })?;
        let key = VerifyingKey::from_bytes(&raw)
            .map_err(|error| IdentityError::Malformed(format!("invalid Ed25519 key: {error}")))?;
        Ok(Self(key))
    }

    /// Verify a signed message and return the payload it carries
    pub fn unsign(&self, signed: &[u8]) -> Result<Vec<u8>, IdentityError> {
        if signed.len() < SIGNATURE_LENGTH {
            return Err(IdentityError::InvalidSignature(format!(
                "signed message of {} bytes is shorter than a signature",
                signed.len()
            )));
        }
        let (signature, payload) = signed.split_at(SIGNATURE_LENGTH);
        let signature = Signature::from_slice(signature)
            .map_err(|error| IdentityError::InvalidSignature(error.to_string()))?;
        self.0
            .verify_strict(payload, &signature)
            .map_err(|error| IdentityError::InvalidSignature(error.to_string()))?;
        Ok(payload.to_vec())
    }

    /// The hash that identifies this key as a data owner
    pub fn hash(&self) -> OwnerId {
        OwnerId::of(self)
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes() == other.0.as_bytes()
    }
}

impl Eq for PublicKey {}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.as_bytes().hash(state);
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "did:key:z{}", self.serialize().to_base58())
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key)
    }
}

/// An Ed25519 key pair able to sign claims and key-change proofs
#[derive(Clone)]
pub struct SigningIdentity {
    key: SigningKey,
    public: PublicKey,
}

impl SigningIdentity {
    /// Generate a new identity from operating-system randomness
    pub fn generate() -> Result<Self, IdentityError> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed)
            .map_err(|error| IdentityError::SigningFailed(format!("RNG error: {error}")))?;
        Ok(Self::from_seed(&seed))
    }

    /// Deterministically derive an identity from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let key = SigningKey::from_bytes(seed);
        let public = PublicKey(key.verifying_key());
        Self { key, public }
    }

    /// The verification half of this identity
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Produce a signed message: the signature over `message` followed by
    /// `message` itself
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, IdentityError> {
        let signature = self
            .key
            .try_sign(message)
            .map_err(|error| IdentityError::SigningFailed(error.to_string()))?;
        let mut signed = Vec::with_capacity(SIGNATURE_LENGTH + message.len());
        signed.extend_from_slice(&signature.to_bytes());
        signed.extend_from_slice(message);
        Ok(signed)
    }
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("public", &self.public.to_string())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_recovers_the_payload_of_a_signed_message() {
        let identity = SigningIdentity::from_seed(&[1; 32]);
        let signed = identity.sign(b"hello").unwrap();

        assert_eq!(signed.len(), SIGNATURE_LENGTH + 5);
        assert_eq!(identity.public_key().unsign(&signed).unwrap(), b"hello");
    }

    #[test]
    fn it_rejects_messages_signed_by_another_key() {
        let alice = SigningIdentity::from_seed(&[1; 32]);
        let mallory = SigningIdentity::from_seed(&[2; 32]);
        let signed = mallory.sign(b"hello").unwrap();

        assert!(matches!(
            alice.public_key().unsign(&signed),
            Err(IdentityError::InvalidSignature(_))
        ));
    }

    #[test]
    fn it_rejects_tampered_payloads() {
        let identity = SigningIdentity::from_seed(&[1; 32]);
        let mut signed = identity.sign(b"hello").unwrap();
        let last = signed.len() - 1;
        signed[last] ^= 0xff;

        assert!(identity.public_key().unsign(&signed).is_err());
    }

    #[test]
    fn it_parses_its_own_serialization() {
        let identity = SigningIdentity::generate().unwrap();
        let bytes = identity.public_key().serialize();

        assert_eq!(bytes.len(), PublicKey::SERIALIZED_LENGTH);
        assert_eq!(
            &PublicKey::deserialize(&bytes).unwrap(),
            identity.public_key()
        );
    }

    #[test]
    fn it_rejects_keys_without_the_ed25519_prefix() {
        let identity = SigningIdentity::from_seed(&[3; 32]);
        let mut bytes = identity.public_key().serialize();
        bytes[0] = 0x12;

        assert!(matches!(
            PublicKey::deserialize(&bytes),
            Err(IdentityError::Malformed(_))
        ));
    }

    #[test]
    fn it_displays_as_a_did_key() {
        let identity = SigningIdentity::from_seed(&[4; 32]);
        assert!(identity.public_key().to_string().starts_with("did:key:z6Mk"));
    }
}
