//! Append-only chains of [KeyLink]s binding a username to rotating keys.
//!
//! A chain is valid for a username when every link that still holds an
//! active claim certifies the next link's key with a key-change proof, and
//! the final link holds an active claim. Links whose claims have lapsed (or
//! name another user) act only as ancestors and need no proof.

use chrono::{NaiveDate, Utc};
use nonempty::NonEmpty;
use tracing::debug;

use crate::{
    IdentityError, KeyLink, NodeId, PublicKey, SigningIdentity, UsernameClaim,
    codec::{ByteReader, ByteWriter, MAX_FIELD_SIZE},
};

/// An ordered, non-empty sequence of [KeyLink]s
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain(NonEmpty<KeyLink>);

impl Chain {
    /// Wrap `links` as a chain; fails if there are none
    pub fn new(links: Vec<KeyLink>) -> Result<Self, IdentityError> {
        NonEmpty::from_vec(links)
            .map(Self)
            .ok_or_else(|| IdentityError::Malformed("a chain needs at least one link".into()))
    }

    /// A chain made of a single link
    pub fn single(link: KeyLink) -> Self {
        Self(NonEmpty::new(link))
    }

    /// Build the two links that rotate `username` from `old` to `new`.
    ///
    /// The first link is `old`'s claim, which never expires, carrying
    /// `old`'s signature over `new`'s public key. The second is `new`'s own
    /// claim, expiring at `expiry`.
    pub fn create(
        old: &SigningIdentity,
        new: &SigningIdentity,
        username: &str,
        expiry: NaiveDate,
    ) -> Result<Self, IdentityError> {
        Self::create_with_providers(old, new, username, expiry, Vec::new())
    }

    /// Like [Chain::create], with the new key's claim naming the storage
    /// nodes that hold the owner's data
    pub fn create_with_providers(
        old: &SigningIdentity,
        new: &SigningIdentity,
        username: &str,
        expiry: NaiveDate,
        storage_providers: Vec<NodeId>,
    ) -> Result<Self, IdentityError> {
        let proof = old.sign(&new.public_key().serialize())?;
        let retired = UsernameClaim::create(username, old, UsernameClaim::never_expires())?;
        let from_old = KeyLink::with_key_change_proof(*old.public_key(), retired, proof)?;

        let claim =
            UsernameClaim::create_with_providers(username, new, expiry, storage_providers)?;
        let to_new = KeyLink::new(*new.public_key(), claim);

        Ok(Self(NonEmpty {
            head: from_old,
            tail: vec![to_new],
        }))
    }

    /// Iterate the links, oldest first
    pub fn links(&self) -> impl Iterator<Item = &KeyLink> {
        self.0.iter()
    }

    /// Number of links
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; chains have at least one link
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The oldest link
    pub fn first(&self) -> &KeyLink {
        self.0.first()
    }

    /// The link holding the current claim
    pub fn last(&self) -> &KeyLink {
        self.0.last()
    }

    /// The key currently owning the chain
    pub fn owner(&self) -> &PublicKey {
        self.last().owner()
    }

    /// Storage nodes named by the current claim, authoritative node first
    pub fn storage_providers(&self) -> &[NodeId] {
        self.last().claim().storage_providers()
    }

    /// Check the chain for `username` as of today (UTC)
    pub fn validate(&self, username: &str) -> Result<(), IdentityError> {
        self.validate_at(username, today())
    }

    /// Check the chain for `username` as of `today`, failing on the first
    /// violation
    pub fn validate_at(&self, username: &str, today: NaiveDate) -> Result<(), IdentityError> {
        for (index, (from, to)) in self.0.iter().zip(self.0.iter().skip(1)).enumerate() {
            if !valid_link(from, to.owner(), username, today)? {
                return Err(IdentityError::InvalidLink { index });
            }
        }
        if !valid_claim(self.last(), username, today) {
            return Err(IdentityError::InvalidClaim(username.to_string()));
        }
        Ok(())
    }

    /// Extend this chain with `tail` as of today (UTC). See [Chain::merge_at].
    pub fn merge(&self, tail: &Chain) -> Result<Chain, IdentityError> {
        self.merge_at(tail, today())
    }

    /// Replace this chain's final link with `tail`.
    ///
    /// `tail` must start from the key that currently ends this chain, and
    /// the result must validate for the username claimed by `tail`'s first
    /// link. Either failure is reported as [IdentityError::Conflict].
    pub fn merge_at(&self, tail: &Chain, today: NaiveDate) -> Result<Chain, IdentityError> {
        let username = tail.first().claim().username();
        if tail.first().owner() != self.last().owner() {
            return Err(IdentityError::KeyMismatch.into_conflict(username));
        }

        let mut links: Vec<KeyLink> = self.links().take(self.len() - 1).cloned().collect();
        links.extend(tail.links().cloned());
        let merged = Chain::new(links)?;
        merged
            .validate_at(username, today)
            .map_err(|error| error.into_conflict(username))?;

        debug!(
            username,
            previous = self.len(),
            merged = merged.len(),
            "Merged identity chain"
        );
        Ok(merged)
    }

    /// A `u32` link count, then per link the length-prefixed owner key and
    /// the length-prefixed [KeyLink::serialize] bytes
    pub fn serialize(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_u32(self.len() as u32);
        for link in self.links() {
            writer.write_bytes(&link.owner().serialize());
            writer.write_bytes(&link.serialize());
        }
        writer.into_bytes()
    }

    /// Parse the output of [Chain::serialize]
    pub fn deserialize(bytes: &[u8]) -> Result<Self, IdentityError> {
        let mut reader = ByteReader::new(bytes);
        let count = reader.read_u32()?;
        let mut links = Vec::new();
        for _ in 0..count {
            let owner = PublicKey::deserialize(reader.read_bytes(PublicKey::SERIALIZED_LENGTH)?)?;
            links.push(KeyLink::deserialize(owner, reader.read_bytes(MAX_FIELD_SIZE)?)?);
        }
        reader.finish()?;
        Self::new(links)
    }
}

impl From<KeyLink> for Chain {
    fn from(link: KeyLink) -> Self {
        Self::single(link)
    }
}

/// Whether `link` holds an active claim to `username` on `today`
pub fn valid_claim(link: &KeyLink, username: &str, today: NaiveDate) -> bool {
    link.claim().is_valid_for(username, today)
}

/// Whether `from` correctly hands over to `target`.
///
/// A link whose claim is not active needs no proof. An active link must
/// carry a key-change proof naming exactly `target`. A proof that fails to
/// verify is an error rather than `false`.
pub fn valid_link(
    from: &KeyLink,
    target: &PublicKey,
    username: &str,
    today: NaiveDate,
) -> Result<bool, IdentityError> {
    if !valid_claim(from, username, today) {
        return Ok(true);
    }
    let Some(proof) = from.key_change_proof() else {
        return Ok(false);
    };
    let certified = from.owner().unsign(proof)?;
    Ok(certified == target.serialize())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
