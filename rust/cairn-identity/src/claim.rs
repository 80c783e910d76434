//! Signed statements that a key owns a username until an expiry date.

use chrono::NaiveDate;

use crate::{
    IdentityError, NodeId, PublicKey, SigningIdentity,
    codec::{ByteReader, ByteWriter, MAX_FIELD_SIZE},
};

/// Longest username, in bytes, that a claim may carry
pub const MAX_USERNAME_SIZE: usize = 64;

/// Longest expiry date string, in bytes, that a claim may carry
pub const MAX_DATE_SIZE: usize = 100;

/// Most storage providers a single claim may list
pub const MAX_STORAGE_PROVIDERS: usize = 32;

/// Longest storage provider identity, in bytes
const MAX_NODE_ID_SIZE: usize = 256;

/// A signed claim that a key owns `username` until `expiry`.
///
/// The signed payload is the length-prefixed username followed by the
/// length-prefixed ISO-8601 expiry date. When the claim names storage
/// providers they follow as a `u32` count and one length-prefixed id each.
///
/// Two claims are equal only if their signed payloads are byte-identical;
/// re-signing the same logical fields produces a different claim.
#[derive(Debug, Clone)]
pub struct UsernameClaim {
    username: String,
    expiry: NaiveDate,
    storage_providers: Vec<NodeId>,
    signed_payload: Vec<u8>,
}

impl UsernameClaim {
    /// Sign a claim for `username` with `identity`, expiring at `expiry`
    pub fn create(
        username: &str,
        identity: &SigningIdentity,
        expiry: NaiveDate,
    ) -> Result<Self, IdentityError> {
        Self::create_with_providers(username, identity, expiry, Vec::new())
    }

    /// Sign a claim that also names the storage nodes holding the owner's
    /// data, the first being authoritative
    pub fn create_with_providers(
        username: &str,
        identity: &SigningIdentity,
        expiry: NaiveDate,
        storage_providers: Vec<NodeId>,
    ) -> Result<Self, IdentityError> {
        if username.len() > MAX_USERNAME_SIZE {
            return Err(IdentityError::FieldTooLarge {
                size: username.len(),
                limit: MAX_USERNAME_SIZE,
            });
        }
        if storage_providers.len() > MAX_STORAGE_PROVIDERS {
            return Err(IdentityError::Malformed(format!(
                "{} storage providers exceeds limit of {}",
                storage_providers.len(),
                MAX_STORAGE_PROVIDERS
            )));
        }

        let mut payload = ByteWriter::new();
        payload.write_string(username);
        payload.write_string(&expiry.to_string());
        if !storage_providers.is_empty() {
            payload.write_u32(storage_providers.len() as u32);
            for provider in &storage_providers {
                payload.write_bytes(provider.as_bytes());
            }
        }

        let signed_payload = identity.sign(&payload.into_bytes())?;
        Ok(Self {
            username: username.to_string(),
            expiry,
            storage_providers,
            signed_payload,
        })
    }

    /// Verify `signed_payload` under `owner` and parse the claim it carries
    pub fn from_signed(owner: &PublicKey, signed_payload: Vec<u8>) -> Result<Self, IdentityError> {
        let payload = owner.unsign(&signed_payload)?;
        let mut reader = ByteReader::new(&payload);

        let username = reader.read_string(MAX_USERNAME_SIZE)?;
        let expiry = reader.read_string(MAX_DATE_SIZE)?;
        let expiry = expiry
            .parse::<NaiveDate>()
            .map_err(|error| IdentityError::Malformed(format!("invalid expiry date: {error}")))?;

        let mut storage_providers = Vec::new();
        if !reader.is_exhausted() {
            let count = reader.read_u32()? as usize;
            if count > MAX_STORAGE_PROVIDERS {
                return Err(IdentityError::Malformed(format!(
                    "{count} storage providers exceeds limit of {MAX_STORAGE_PROVIDERS}"
                )));
            }
            for _ in 0..count {
                storage_providers.push(NodeId::from(reader.read_bytes(MAX_NODE_ID_SIZE)?));
            }
        }
        reader.finish()?;

        Ok(Self {
            username,
            expiry,
            storage_providers,
            signed_payload,
        })
    }

    /// The expiry used for claims that certify a key change and must never
    /// lapse
    pub fn never_expires() -> NaiveDate {
        NaiveDate::MAX
    }

    /// The claimed username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The last day on which the claim is valid
    pub fn expiry(&self) -> NaiveDate {
        self.expiry
    }

    /// Storage nodes named by the claim, authoritative node first
    pub fn storage_providers(&self) -> &[NodeId] {
        &self.storage_providers
    }

    /// The signature followed by the payload it covers
    pub fn signed_payload(&self) -> &[u8] {
        &self.signed_payload
    }

    /// The length-prefixed signed payload
    pub fn serialize(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_bytes(&self.signed_payload);
        writer.into_bytes()
    }

    /// Parse the output of [UsernameClaim::serialize], verifying it under
    /// `owner`
    pub fn deserialize(owner: &PublicKey, bytes: &[u8]) -> Result<Self, IdentityError> {
        let mut reader = ByteReader::new(bytes);
        let signed = reader.read_bytes(MAX_FIELD_SIZE)?.to_vec();
        reader.finish()?;
        Self::from_signed(owner, signed)
    }

    /// Whether the claim is well formed, names `username` and has not lapsed
    /// by `today`
    pub fn is_valid_for(&self, username: &str, today: NaiveDate) -> bool {
        is_acceptable_username(username) && self.username == username && self.expiry >= today
    }
}

impl PartialEq for UsernameClaim {
    fn eq(&self, other: &Self) -> bool {
        self.signed_payload == other.signed_payload
    }
}

impl Eq for UsernameClaim {}

impl std::hash::Hash for UsernameClaim {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.signed_payload.hash(state);
    }
}

/// Usernames may not contain spaces, tabs or newlines
pub fn is_acceptable_username(username: &str) -> bool {
    !username.contains([' ', '\t', '\n'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn it_signs_username_and_expiry() {
        let identity = SigningIdentity::from_seed(&[1; 32]);
        let claim = UsernameClaim::create("alice", &identity, date(2030, 1, 1)).unwrap();

        let parsed =
            UsernameClaim::from_signed(identity.public_key(), claim.signed_payload().to_vec())
                .unwrap();
        assert_eq!(parsed.username(), "alice");
        assert_eq!(parsed.expiry(), date(2030, 1, 1));
        assert!(parsed.storage_providers().is_empty());
        assert_eq!(parsed, claim);
    }

    #[test]
    fn it_encodes_exactly_username_and_date_without_providers() {
        let identity = SigningIdentity::from_seed(&[1; 32]);
        let claim = UsernameClaim::create("bob", &identity, date(2031, 2, 3)).unwrap();
        let payload = identity.public_key().unsign(claim.signed_payload()).unwrap();

        let mut expected = ByteWriter::new();
        expected.write_string("bob");
        expected.write_string("2031-02-03");
        assert_eq!(payload, expected.into_bytes());
    }

    #[test]
    fn it_carries_storage_providers() {
        let identity = SigningIdentity::from_seed(&[1; 32]);
        let providers = vec![NodeId::from(vec![1, 2, 3]), NodeId::from(vec![4, 5])];
        let claim = UsernameClaim::create_with_providers(
            "carol",
            &identity,
            date(2030, 6, 1),
            providers.clone(),
        )
        .unwrap();

        let parsed =
            UsernameClaim::deserialize(identity.public_key(), &claim.serialize()).unwrap();
        assert_eq!(parsed.storage_providers(), providers.as_slice());
    }

    #[test]
    fn it_preserves_the_far_future_sentinel() {
        let identity = SigningIdentity::from_seed(&[1; 32]);
        let claim =
            UsernameClaim::create("dave", &identity, UsernameClaim::never_expires()).unwrap();

        let parsed =
            UsernameClaim::deserialize(identity.public_key(), &claim.serialize()).unwrap();
        assert_eq!(parsed.expiry(), UsernameClaim::never_expires());
    }

    #[test]
    fn it_distinguishes_independently_signed_claims_with_equal_fields() {
        let first = SigningIdentity::from_seed(&[1; 32]);
        let second = SigningIdentity::from_seed(&[2; 32]);
        let a = UsernameClaim::create("erin", &first, date(2030, 1, 1)).unwrap();
        let b = UsernameClaim::create("erin", &second, date(2030, 1, 1)).unwrap();

        assert_eq!(a.username(), b.username());
        assert_eq!(a.expiry(), b.expiry());
        assert_ne!(a, b);
    }

    #[test]
    fn it_refuses_a_claim_verified_under_the_wrong_key() {
        let owner = SigningIdentity::from_seed(&[1; 32]);
        let other = SigningIdentity::from_seed(&[2; 32]);
        let claim = UsernameClaim::create("frank", &owner, date(2030, 1, 1)).unwrap();

        assert!(matches!(
            UsernameClaim::deserialize(other.public_key(), &claim.serialize()),
            Err(IdentityError::InvalidSignature(_))
        ));
    }

    #[test]
    fn it_refuses_overlong_usernames() {
        let identity = SigningIdentity::from_seed(&[1; 32]);
        let username = "x".repeat(MAX_USERNAME_SIZE + 1);

        assert!(matches!(
            UsernameClaim::create(&username, &identity, date(2030, 1, 1)),
            Err(IdentityError::FieldTooLarge { .. })
        ));
    }

    #[test]
    fn it_treats_the_expiry_day_itself_as_valid() {
        let identity = SigningIdentity::from_seed(&[1; 32]);
        let claim = UsernameClaim::create("gina", &identity, date(2030, 1, 1)).unwrap();

        assert!(claim.is_valid_for("gina", date(2030, 1, 1)));
        assert!(!claim.is_valid_for("gina", date(2030, 1, 2)));
        assert!(!claim.is_valid_for("gin", date(2029, 1, 1)));
    }
}
