use async_trait::async_trait;
use cairn_identity::{Directory, NodeId, OwnerId};
use cairn_s3_credentials::PresignedRequest;
use futures_util::future::try_join_all;
use tracing::{debug, trace};

use crate::{
    Attempts, BlockKind, BlockStoreProperties, ContentAddressedStorage, ContentHash,
    FallbackService, HttpTransport, RoutingCache, StorageError, TransactionId, hash_to_key,
    inline_bytes, key_to_hash, verify_block,
};

/// A [BlockRouter] is a [ContentAddressedStorage] that moves blocks straight
/// to and from an S3-compatible object store whenever it can, and defers to
/// a fallback service otherwise.
///
/// Writes go direct only when this node is the authoritative storage node
/// of the owner, as declared by the owner's identity chain. Reads try, in
/// order: an anonymous fetch from the public base URL, a fetch with a URL
/// presigned by the fallback service, and finally the fallback service
/// itself; which of the first two are attempted depends on the
/// [BlockStoreProperties].
pub struct BlockRouter<Service, Dir, Transport>
where
    Service: FallbackService,
    Dir: Directory,
    Transport: HttpTransport,
{
    properties: BlockStoreProperties,
    fallback: Service,
    directory: Dir,
    transport: Transport,
    node_id: NodeId,
    cache: RoutingCache,
}

impl<Service, Dir, Transport> BlockRouter<Service, Dir, Transport>
where
    Service: FallbackService,
    Dir: Directory,
    Transport: HttpTransport,
{
    /// Route for the node identified as `node_id`
    pub fn new(
        properties: BlockStoreProperties,
        fallback: Service,
        directory: Dir,
        transport: Transport,
        node_id: NodeId,
    ) -> Result<Self, StorageError> {
        let cache = RoutingCache::new(properties.routing_cache_size)?;
        Ok(Self {
            properties,
            fallback,
            directory,
            transport,
            node_id,
            cache,
        })
    }

    /// Route for whichever node the fallback service reports as its own
    pub async fn connect(
        properties: BlockStoreProperties,
        fallback: Service,
        directory: Dir,
        transport: Transport,
    ) -> Result<Self, StorageError> {
        let node_id = fallback.id().await?;
        Self::new(properties, fallback, directory, transport, node_id)
    }

    /// The identity of the local storage node
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// How this router may reach the object store
    pub fn properties(&self) -> &BlockStoreProperties {
        &self.properties
    }

    /// The owner to storage node routing cache
    pub fn cache(&self) -> &RoutingCache {
        &self.cache
    }

    /// The storage node authoritative for `owner`: the first storage
    /// provider named by the active claim of the owner's chain.
    ///
    /// The chain is validated before it is trusted. Results are cached and
    /// never invalidated; a key rotation that moves the owner is noticed
    /// only once the entry is evicted.
    pub async fn resolve_storage_node(&self, owner: &OwnerId) -> Result<NodeId, StorageError> {
        if let Some(node) = self.cache.get(owner) {
            trace!(%owner, %node, "Routing cache hit");
            return Ok(node);
        }

        let username = self.directory.get_username(owner).await?;
        let chain = self.directory.get_chain(&username).await?;
        chain.validate(&username)?;

        let node = chain
            .storage_providers()
            .first()
            .cloned()
            .ok_or_else(|| StorageError::Resolution {
                owner: owner.to_string(),
                reason: format!("the chain of '{username}' names no storage provider"),
            })?;

        debug!(%owner, %username, %node, "Resolved storage node");
        self.cache.insert(*owner, node.clone());
        Ok(node)
    }

    /// Whether this node is the authoritative storage node for `owner`
    pub async fn on_owners_node(&self, owner: &OwnerId) -> Result<bool, StorageError> {
        Ok(self.resolve_storage_node(owner).await? == self.node_id)
    }

    async fn route_put(
        &self,
        owner: &OwnerId,
        writer: &OwnerId,
        signatures: &[Vec<u8>],
        blocks: &[Vec<u8>],
        kind: BlockKind,
        transaction: &TransactionId,
    ) -> Result<Vec<ContentHash>, StorageError> {
        if self.properties.direct_writes && self.on_owners_node(owner).await? {
            debug!(%owner, blocks = blocks.len(), ?kind, "Writing directly to the object store");
            return self
                .put_direct(owner, writer, signatures, blocks, kind, transaction)
                .await;
        }

        debug!(%owner, blocks = blocks.len(), ?kind, "Delegating write to the fallback service");
        match kind {
            BlockKind::Cbor => {
                self.fallback
                    .put(owner, writer, signatures, blocks, transaction)
                    .await
            }
            BlockKind::Raw => {
                self.fallback
                    .put_raw(owner, writer, signatures, blocks, transaction)
                    .await
            }
        }
    }

    /// Upload every block with its own presigned request. Any failure fails
    /// the whole batch.
    async fn put_direct(
        &self,
        owner: &OwnerId,
        writer: &OwnerId,
        signatures: &[Vec<u8>],
        blocks: &[Vec<u8>],
        kind: BlockKind,
        transaction: &TransactionId,
    ) -> Result<Vec<ContentHash>, StorageError> {
        let sizes: Vec<u64> = blocks.iter().map(|block| block.len() as u64).collect();
        let uploads = self
            .fallback
            .auth_writes(owner, writer, signatures, &sizes, kind, transaction)
            .await?;

        if uploads.len() != blocks.len() {
            return Err(StorageError::Refused(format!(
                "{} blocks were submitted but {} uploads were authorized",
                blocks.len(),
                uploads.len()
            )));
        }

        try_join_all(uploads.iter().zip(blocks).map(|(upload, block)| async move {
            self.transport.put(upload, block.clone()).await?;
            key_to_hash(upload.object_key())
        }))
        .await
    }

    async fn get_public(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StorageError> {
        let url = self
            .properties
            .public_url(&hash_to_key(hash))
            .ok_or_else(|| StorageError::Configuration("public reads need a base URL".into()))?;
        let block = self
            .transport
            .get(&PresignedRequest::unsigned(url))
            .await?;
        verify_block(hash, &block)?;
        Ok(Some(block))
    }

    async fn get_authorized(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StorageError> {
        let download = self
            .fallback
            .auth_reads(std::slice::from_ref(hash))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Refused(format!("no download authorized for {hash}")))?;
        let block = self.transport.get(&download).await?;
        verify_block(hash, &block)?;
        Ok(Some(block))
    }
}

#[async_trait]
impl<Service, Dir, Transport> ContentAddressedStorage for BlockRouter<Service, Dir, Transport>
where
    Service: FallbackService,
    Dir: Directory,
    Transport: HttpTransport,
{
    async fn id(&self) -> Result<NodeId, StorageError> {
        self.fallback.id().await
    }

    async fn start_transaction(&self, owner: &OwnerId) -> Result<TransactionId, StorageError> {
        self.fallback.start_transaction(owner).await
    }

    async fn close_transaction(
        &self,
        owner: &OwnerId,
        transaction: &TransactionId,
    ) -> Result<(), StorageError> {
        self.fallback.close_transaction(owner, transaction).await
    }

    async fn put(
        &self,
        owner: &OwnerId,
        writer: &OwnerId,
        signatures: &[Vec<u8>],
        blocks: &[Vec<u8>],
        transaction: &TransactionId,
    ) -> Result<Vec<ContentHash>, StorageError> {
        self.route_put(owner, writer, signatures, blocks, BlockKind::Cbor, transaction)
            .await
    }

    async fn put_raw(
        &self,
        owner: &OwnerId,
        writer: &OwnerId,
        signatures: &[Vec<u8>],
        blocks: &[Vec<u8>],
        transaction: &TransactionId,
    ) -> Result<Vec<ContentHash>, StorageError> {
        self.route_put(owner, writer, signatures, blocks, BlockKind::Raw, transaction)
            .await
    }

    async fn get_raw(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(bytes) = inline_bytes(hash) {
            return Ok(Some(bytes.to_vec()));
        }

        let public = self.properties.public_reads;
        let authed = public || self.properties.authed_reads;

        Attempts::new()
            .then_if(public, "public", || self.get_public(hash))
            .then_if(authed, "authorized", || self.get_authorized(hash))
            .then("fallback", || self.fallback.get_raw(hash))
            .run()
            .await
    }

    async fn get_size(&self, hash: &ContentHash) -> Result<Option<u64>, StorageError> {
        self.fallback.get_size(hash).await
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
        Err(StorageError::Unsupported("gc"))
    }
}

impl<Service, Dir, Transport> std::fmt::Debug for BlockRouter<Service, Dir, Transport>
where
    Service: FallbackService,
    Dir: Directory,
    Transport: HttpTransport,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRouter")
            .field("node_id", &self.node_id.to_string())
            .field("properties", &self.properties)
            .field("cache", &self.cache)
            .finish()
    }
}
