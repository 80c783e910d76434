use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use cairn_identity::{OwnerId, PublicKey};
use cairn_s3_credentials::{Credentials, DEFAULT_EXPIRES, PresignedRequest};
use chrono::Utc;
use ipld_core::cid::Cid;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
    BlockAuthorizer, BlockKind, ContentHash, QuotaControl, SHA2_256_CODE, StorageError,
    TransactionId, hash_to_key,
};

/// A [BlockAuthorizer] that holds the object store's credentials and
/// presigns requests on behalf of writers it can verify.
///
/// Each write signature must be a signed message, by a registered writer,
/// whose payload is the CID of the block. Only SHA-256 CIDs of the declared
/// block kind are authorized, and the upload is bound to that digest and
/// the declared size.
pub struct S3Authorizer {
    credentials: Credentials,
    public_reads: bool,
    read_expiry: u64,
    writers: RwLock<HashMap<OwnerId, PublicKey>>,
    quota: Option<Arc<dyn QuotaControl>>,
}

impl S3Authorizer {
    /// Authorize requests against the store `credentials` give access to
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            public_reads: false,
            read_expiry: DEFAULT_EXPIRES,
            writers: RwLock::new(HashMap::new()),
            quota: None,
        }
    }

    /// Mark uploaded objects as publicly readable
    pub fn with_public_reads(mut self, enabled: bool) -> Self {
        self.public_reads = enabled;
        self
    }

    /// Seconds that presigned downloads remain valid
    pub fn with_read_expiry(mut self, seconds: u64) -> Self {
        self.read_expiry = seconds;
        self
    }

    /// Refuse batches larger than the owner's quota
    pub fn with_quota(mut self, quota: Arc<dyn QuotaControl>) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Allow `key` to sign writes
    pub fn register_writer(&self, key: PublicKey) {
        self.writers.write().insert(key.hash(), key);
    }

    /// The credentials requests are signed with
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn writer_key(&self, writer: &OwnerId) -> Result<PublicKey, StorageError> {
        self.writers
            .read()
            .get(writer)
            .copied()
            .ok_or_else(|| StorageError::Refused(format!("Unknown writer {writer}")))
    }

    async fn check_quota(&self, owner: &OwnerId, block_sizes: &[u64]) -> Result<(), StorageError> {
        let Some(quota) = &self.quota else {
            return Ok(());
        };
        let requested = block_sizes
            .iter()
            .try_fold(0u64, |total, size| total.checked_add(*size))
            .ok_or_else(|| StorageError::Refused("Declared block sizes overflow".into()))?;
        let available = quota.quota(owner).await?;
        if requested > available {
            warn!(%owner, requested, available, "Write exceeds quota");
            return Err(StorageError::QuotaExceeded {
                owner: owner.to_string(),
                requested,
                available,
            });
        }
        Ok(())
    }
}

/// The CID a writer signed, checked against the kind of block being written
fn signed_hash(
    key: &PublicKey,
    signature: &[u8],
    kind: BlockKind,
) -> Result<(ContentHash, [u8; 32]), StorageError> {
    let payload = key.unsign(signature)?;
    let hash = Cid::try_from(payload.as_slice())
        .map_err(|_| StorageError::Refused("Signed payload is not a block hash".into()))?;

    if hash.codec() != kind.codec() {
        return Err(StorageError::Refused(format!(
            "Block {hash} is not a {kind:?} block"
        )));
    }
    if hash.hash().code() != SHA2_256_CODE {
        return Err(StorageError::Refused(format!(
            "Block {hash} is not addressed by SHA-256"
        )));
    }
    let digest: [u8; 32] = hash
        .hash()
        .digest()
        .try_into()
        .map_err(|_| StorageError::Refused(format!("Block {hash} has a truncated digest")))?;

    Ok((hash, digest))
}

#[async_trait]
impl BlockAuthorizer for S3Authorizer {
    async fn auth_writes(
        &self,
        owner: &OwnerId,
        writer: &OwnerId,
        signatures: &[Vec<u8>],
        block_sizes: &[u64],
        kind: BlockKind,
        transaction: &TransactionId,
    ) -> Result<Vec<PresignedRequest>, StorageError> {
        if signatures.len() != block_sizes.len() {
            return Err(StorageError::Refused(format!(
                "{} signatures for {} blocks",
                signatures.len(),
                block_sizes.len()
            )));
        }
        let key = self.writer_key(writer)?;
        self.check_quota(owner, block_sizes).await?;

        let now = Utc::now();
        let uploads = signatures
            .iter()
            .zip(block_sizes)
            .map(|(signature, size)| {
                let (hash, digest) = signed_hash(&key, signature, kind)?;
                Ok(self.credentials.presign_put(
                    &hash_to_key(&hash),
                    *size,
                    digest,
                    self.public_reads,
                    now,
                    BTreeMap::new(),
                ))
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        debug!(%owner, %writer, %transaction, blocks = uploads.len(), "Authorized uploads");
        Ok(uploads)
    }

    async fn auth_reads(
        &self,
        hashes: &[ContentHash],
    ) -> Result<Vec<PresignedRequest>, StorageError> {
        let now = Utc::now();
        Ok(hashes
            .iter()
            .map(|hash| {
                self.credentials
                    .presign_get(&hash_to_key(hash), Some(self.read_expiry), now)
            })
            .collect())
    }
}

impl std::fmt::Debug for S3Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Authorizer")
            .field("credentials", &self.credentials)
            .field("public_reads", &self.public_reads)
            .field("read_expiry", &self.read_expiry)
            .field("writers", &self.writers.read().len())
            .finish()
    }
}
