use crate::{
    IdentityError, PublicKey, UsernameClaim,
    codec::{ByteReader, ByteWriter, MAX_FIELD_SIZE},
};

/// One entry in an identity chain.
///
/// A link binds `owner` to a [UsernameClaim]. When the owner has rotated to
/// a new key, the link also carries a key-change proof: a message signed by
/// `owner` whose payload is the successor's serialized public key.
#[derive(Debug, Clone)]
pub struct KeyLink {
    owner: PublicKey,
    claim: UsernameClaim,
    key_change_proof: Option<Vec<u8>>,
}

impl KeyLink {
    /// A link with no successor
    pub fn new(owner: PublicKey, claim: UsernameClaim) -> Self {
        Self {
            owner,
            claim,
            key_change_proof: None,
        }
    }

    /// A link certifying rotation to the key named in `proof`.
    ///
    /// Fails unless `proof` verifies under `owner` and carries a well-formed
    /// public key.
    pub fn with_key_change_proof(
        owner: PublicKey,
        claim: UsernameClaim,
        proof: Vec<u8>,
    ) -> Result<Self, IdentityError> {
        PublicKey::deserialize(&owner.unsign(&proof)?)?;
        Ok(Self {
            owner,
            claim,
            key_change_proof: Some(proof),
        })
    }

    /// The key this link belongs to
    pub fn owner(&self) -> &PublicKey {
        &self.owner
    }

    /// The username claim made by [KeyLink::owner]
    pub fn claim(&self) -> &UsernameClaim {
        &self.claim
    }

    /// The signed successor key, if this link certifies a rotation
    pub fn key_change_proof(&self) -> Option<&[u8]> {
        self.key_change_proof.as_deref()
    }

    /// The key this link hands ownership to, if any
    pub fn successor(&self) -> Result<Option<PublicKey>, IdentityError> {
        self.key_change_proof
            .as_ref()
            .map(|proof| PublicKey::deserialize(&self.owner.unsign(proof)?))
            .transpose()
    }

    /// Length-prefixed claim bytes, a presence flag, then the optional
    /// length-prefixed proof. The owner is not included; it travels
    /// alongside the link.
    pub fn serialize(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_bytes(&self.claim.serialize());
        writer.write_bool(self.key_change_proof.is_some());
        if let Some(proof) = &self.key_change_proof {
            writer.write_bytes(proof);
        }
        writer.into_bytes()
    }

    /// Parse the output of [KeyLink::serialize] for a link owned by `owner`
    pub fn deserialize(owner: PublicKey, bytes: &[u8]) -> Result<Self, IdentityError> {
        let mut reader = ByteReader::new(bytes);
        let claim_bytes = reader.read_bytes(MAX_FIELD_SIZE)?;
        let has_proof = reader.read_bool()?;
        let proof = if has_proof {
            Some(reader.read_bytes(MAX_FIELD_SIZE)?.to_vec())
        } else {
            None
        };
        reader.finish()?;

        let claim = UsernameClaim::deserialize(&owner, claim_bytes)?;
        match proof {
            Some(proof) => Self::with_key_change_proof(owner, claim, proof),
            None => Ok(Self::new(owner, claim)),
        }
    }
}

impl PartialEq for KeyLink {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.serialize() == other.serialize()
    }
}

impl Eq for KeyLink {}
