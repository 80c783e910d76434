//! In-memory doubles for the contracts a [BlockRouter](crate::BlockRouter)
//! depends on, for use in tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cairn_identity::{
    Chain, Directory, IdentityError, KeyLink, NodeId, OwnerId, SIGNATURE_LENGTH, SigningIdentity,
    UsernameClaim,
};
use cairn_s3_credentials::PresignedRequest;
use ipld_core::cid::Cid;
use parking_lot::Mutex;

use crate::{
    BlockAuthorizer, BlockKind, ContentAddressedStorage, ContentHash, HttpTransport,
    QuotaControl, SpaceRequest, StorageError, TransactionId, hash_block, hash_to_key,
};

/// Sign the hash of each block as `writer`, the way a client proves to a
/// [BlockAuthorizer] that it may write them
pub fn sign_blocks(
    writer: &SigningIdentity,
    blocks: &[Vec<u8>],
    kind: BlockKind,
) -> Result<Vec<Vec<u8>>, StorageError> {
    blocks
        .iter()
        .map(|block| Ok(writer.sign(&hash_block(block, kind)?.to_bytes())?))
        .collect()
}

/// Register `username` for `identity` with a claim naming `storage_providers`
pub async fn register<D: Directory>(
    directory: &D,
    identity: &SigningIdentity,
    username: &str,
    storage_providers: Vec<NodeId>,
) -> Result<OwnerId, IdentityError> {
    let claim = UsernameClaim::create_with_providers(
        username,
        identity,
        UsernameClaim::never_expires(),
        storage_providers,
    )?;
    let link = KeyLink::new(*identity.public_key(), claim);
    directory.update_chain(username, Chain::single(link)).await?;
    Ok(identity.public_key().hash())
}

/// A [ContentAddressedStorage] and [BlockAuthorizer] that keeps blocks in
/// memory.
///
/// Authorizations are unsigned URLs under `base_url`, so a
/// [MemoryTransport] can serve them. Write signatures are only unwrapped,
/// never verified.
#[derive(Debug)]
pub struct MemoryBlockStore {
    node: NodeId,
    base_url: String,
    blocks: Mutex<HashMap<ContentHash, Vec<u8>>>,
    transactions: AtomicUsize,
    puts: AtomicUsize,
    reads: AtomicUsize,
    write_authorizations: AtomicUsize,
    read_authorizations: AtomicUsize,
}

impl MemoryBlockStore {
    /// An empty store identified as `node`, authorizing URLs under
    /// `base_url`
    pub fn new(node: NodeId, base_url: impl Into<String>) -> Self {
        Self {
            node,
            base_url: base_url.into(),
            blocks: Mutex::new(HashMap::new()),
            transactions: AtomicUsize::default(),
            puts: AtomicUsize::default(),
            reads: AtomicUsize::default(),
            write_authorizations: AtomicUsize::default(),
            read_authorizations: AtomicUsize::default(),
        }
    }

    /// The URL that authorizations for `hash` point at
    pub fn url_for(&self, hash: &ContentHash) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), hash_to_key(hash))
    }

    /// Whether `hash` was stored through this service
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.blocks.lock().contains_key(hash)
    }

    /// Number of put or put_raw calls
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::Relaxed)
    }

    /// Number of get_raw calls
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of auth_writes calls
    pub fn write_authorizations(&self) -> usize {
        self.write_authorizations.load(Ordering::Relaxed)
    }

    /// Number of auth_reads calls
    pub fn read_authorizations(&self) -> usize {
        self.read_authorizations.load(Ordering::Relaxed)
    }

    fn store(&self, blocks: &[Vec<u8>], kind: BlockKind) -> Result<Vec<ContentHash>, StorageError> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        let mut stored = self.blocks.lock();
        blocks
            .iter()
            .map(|block| {
                let hash = hash_block(block, kind)?;
                stored.insert(hash, block.clone());
                Ok(hash)
            })
            .collect()
    }
}

#[async_trait]
impl ContentAddressedStorage for MemoryBlockStore {
    async fn id(&self) -> Result<NodeId, StorageError> {
        Ok(self.node.clone())
    }

    async fn start_transaction(&self, _owner: &OwnerId) -> Result<TransactionId, StorageError> {
        let next = self.transactions.fetch_add(1, Ordering::Relaxed);
        Ok(TransactionId::new(format!("tx-{next}")))
    }

    async fn close_transaction(
        &self,
        _owner: &OwnerId,
        _transaction: &TransactionId,
    ) -> Result<(), StorageError> {
        Ok(())
    }

    async fn put(
        &self,
        _owner: &OwnerId,
        _writer: &OwnerId,
        _signatures: &[Vec<u8>],
        blocks: &[Vec<u8>],
        _transaction: &TransactionId,
    ) -> Result<Vec<ContentHash>, StorageError> {
        self.store(blocks, BlockKind::Cbor)
    }

    async fn put_raw(
        &self,
        _owner: &OwnerId,
        _writer: &OwnerId,
        _signatures: &[Vec<u8>],
        blocks: &[Vec<u8>],
        _transaction: &TransactionId,
    ) -> Result<Vec<ContentHash>, StorageError> {
        self.store(blocks, BlockKind::Raw)
    }

    async fn get_raw(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StorageError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.blocks.lock().get(hash).cloned())
    }

    async fn get_size(&self, hash: &ContentHash) -> Result<Option<u64>, StorageError> {
        Ok(self
            .blocks
            .lock()
            .get(hash)
            .map(|block| block.len() as u64))
    }

    async fn pin_update(
        &self,
        _owner: &OwnerId,
        _existing: &ContentHash,
        updated: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError> {
        Ok(vec![*updated])
    }

    async fn recursive_pin(
        &self,
        _owner: &OwnerId,
        hash: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError> {
        Ok(vec![*hash])
    }

    async fn recursive_unpin(
        &self,
        _owner: &OwnerId,
        hash: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError> {
        Ok(vec![*hash])
    }

    async fn gc(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[async_trait]
impl BlockAuthorizer for MemoryBlockStore {
    async fn auth_writes(
        &self,
        _owner: &OwnerId,
        _writer: &OwnerId,
        signatures: &[Vec<u8>],
        block_sizes: &[u64],
        _kind: BlockKind,
        _transaction: &TransactionId,
    ) -> Result<Vec<PresignedRequest>, StorageError> {
        self.write_authorizations.fetch_add(1, Ordering::Relaxed);
        if signatures.len() != block_sizes.len() {
            return Err(StorageError::Refused(
                "one signature is required per block".into(),
            ));
        }
        signatures
            .iter()
            .map(|signature| {
                let hash = signature
                    .get(SIGNATURE_LENGTH..)
                    .and_then(|bytes| Cid::try_from(bytes).ok())
                    .ok_or_else(|| StorageError::Refused("signature is not over a hash".into()))?;
                Ok(PresignedRequest::unsigned(self.url_for(&hash)))
            })
            .collect()
    }

    async fn auth_reads(
        &self,
        hashes: &[ContentHash],
    ) -> Result<Vec<PresignedRequest>, StorageError> {
        self.read_authorizations.fetch_add(1, Ordering::Relaxed);
        Ok(hashes
            .iter()
            .map(|hash| PresignedRequest::unsigned(self.url_for(hash)))
            .collect())
    }
}

/// An [HttpTransport] serving objects from memory, keyed by URL without its
/// query string.
///
/// Missing objects answer 404. URLs under a prefix registered with
/// [MemoryTransport::fail_under] answer 403.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    requests: Mutex<Vec<PresignedRequest>>,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl MemoryTransport {
    /// An empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `url`
    pub fn insert(&self, url: impl Into<String>, body: Vec<u8>) {
        self.objects.lock().insert(url.into(), body);
    }

    /// The object uploaded to `url`, if any
    pub fn object(&self, url: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(url).cloned()
    }

    /// Refuse every request to a URL starting with `prefix`
    pub fn fail_under(&self, prefix: impl Into<String>) {
        self.failing.lock().insert(prefix.into());
    }

    /// Every request made so far, in order
    pub fn requests(&self) -> Vec<PresignedRequest> {
        self.requests.lock().clone()
    }

    /// Number of GET requests
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::Relaxed)
    }

    /// Number of PUT requests
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::Relaxed)
    }

    fn admit(&self, request: &PresignedRequest) -> Result<String, StorageError> {
        self.requests.lock().push(request.clone());
        let url = request
            .url
            .split('?')
            .next()
            .unwrap_or_default()
            .to_string();
        if self
            .failing
            .lock()
            .iter()
            .any(|prefix| url.starts_with(prefix.as_str()))
        {
            return Err(StorageError::Backend { url, status: 403 });
        }
        Ok(url)
    }
}

#[async_trait]
impl HttpTransport for MemoryTransport {
    async fn get(&self, request: &PresignedRequest) -> Result<Vec<u8>, StorageError> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let url = self.admit(request)?;
        let object = self.objects.lock().get(&url).cloned();
        object.ok_or(StorageError::Backend { url, status: 404 })
    }

    async fn put(&self, request: &PresignedRequest, body: Vec<u8>) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        let url = self.admit(request)?;
        self.objects.lock().insert(url, body);
        Ok(())
    }
}

/// A [MeasuredDirectory] acts as a proxy over a [Directory] implementation
/// that counts lookups.
#[derive(Debug)]
pub struct MeasuredDirectory<D> {
    directory: D,
    username_lookups: AtomicUsize,
    chain_lookups: AtomicUsize,
}

impl<D> MeasuredDirectory<D>
where
    D: Directory,
{
    /// Wrap the provided [Directory] so that lookups against it may be
    /// measured
    pub fn new(directory: D) -> Self {
        Self {
            directory,
            username_lookups: AtomicUsize::default(),
            chain_lookups: AtomicUsize::default(),
        }
    }

    /// The aggregate number of owner to username lookups
    pub fn username_lookups(&self) -> usize {
        self.username_lookups.load(Ordering::Relaxed)
    }

    /// The aggregate number of chain fetches
    pub fn chain_lookups(&self) -> usize {
        self.chain_lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<D> Directory for MeasuredDirectory<D>
where
    D: Directory,
{
    async fn get_username(&self, owner: &OwnerId) -> Result<String, IdentityError> {
        self.username_lookups.fetch_add(1, Ordering::Relaxed);
        self.directory.get_username(owner).await
    }

    async fn get_chain(&self, username: &str) -> Result<Chain, IdentityError> {
        self.chain_lookups.fetch_add(1, Ordering::Relaxed);
        self.directory.get_chain(username).await
    }

    async fn update_chain(&self, username: &str, tail: Chain) -> Result<(), IdentityError> {
        self.directory.update_chain(username, tail).await
    }
}

/// A [QuotaControl] that grants any request up to a fixed ceiling
#[derive(Debug)]
pub struct MemoryQuota {
    default_quota: u64,
    ceiling: u64,
    quotas: Mutex<HashMap<OwnerId, u64>>,
}

impl MemoryQuota {
    /// Every owner starts with `default_quota` bytes and may ask for up to
    /// `ceiling`
    pub fn new(default_quota: u64, ceiling: u64) -> Self {
        Self {
            default_quota,
            ceiling,
            quotas: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl QuotaControl for MemoryQuota {
    async fn quota(&self, owner: &OwnerId) -> Result<u64, StorageError> {
        Ok(self
            .quotas
            .lock()
            .get(owner)
            .copied()
            .unwrap_or(self.default_quota))
    }

    async fn request_space(&self, request: SpaceRequest) -> Result<bool, StorageError> {
        if request.bytes > self.ceiling {
            return Ok(false);
        }
        self.quotas.lock().insert(request.owner, request.bytes);
        Ok(true)
    }
}
