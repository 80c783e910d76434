//! Contracts of the storage services a [BlockRouter](crate::BlockRouter)
//! sits in front of.

use std::sync::Arc;

use async_trait::async_trait;
use cairn_identity::{NodeId, OwnerId};
use cairn_s3_credentials::PresignedRequest;
use ipld_core::ipld::Ipld;
use serde::{Deserialize, Serialize};

use crate::{BlockKind, ContentHash, StorageError};

/// Identifies an open write transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// Wrap a transaction id issued by a storage service
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as issued
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A [ContentAddressedStorage] is able to store and retrieve blocks by the
/// hash of their content, on behalf of an owner.
///
/// `signatures[i]` is the writer's signed message over the hash of
/// `blocks[i]`; stores use it to check that the writer may write for the
/// owner.
#[async_trait]
pub trait ContentAddressedStorage: Send + Sync {
    /// The identity of the node providing this storage
    async fn id(&self) -> Result<NodeId, StorageError>;

    /// Open a transaction that keeps blocks written for `owner` alive until
    /// it is closed
    async fn start_transaction(&self, owner: &OwnerId) -> Result<TransactionId, StorageError>;

    /// Close a transaction opened with
    /// [ContentAddressedStorage::start_transaction]
    async fn close_transaction(
        &self,
        owner: &OwnerId,
        transaction: &TransactionId,
    ) -> Result<(), StorageError>;

    /// Store DAG-CBOR blocks, returning their hashes in input order
    async fn put(
        &self,
        owner: &OwnerId,
        writer: &OwnerId,
        signatures: &[Vec<u8>],
        blocks: &[Vec<u8>],
        transaction: &TransactionId,
    ) -> Result<Vec<ContentHash>, StorageError>;

    /// Store raw blocks, returning their hashes in input order
    async fn put_raw(
        &self,
        owner: &OwnerId,
        writer: &OwnerId,
        signatures: &[Vec<u8>],
        blocks: &[Vec<u8>],
        transaction: &TransactionId,
    ) -> Result<Vec<ContentHash>, StorageError>;

    /// Fetch the bytes of a block
    async fn get_raw(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StorageError>;

    /// Fetch and decode a DAG-CBOR block
    async fn get(&self, hash: &ContentHash) -> Result<Option<Ipld>, StorageError> {
        let Some(bytes) = self.get_raw(hash).await? else {
            return Ok(None);
        };
        let object = serde_ipld_dagcbor::from_slice(&bytes)
            .map_err(|error| StorageError::Decode(error.to_string()))?;
        Ok(Some(object))
    }

    /// Size in bytes of a stored block
    async fn get_size(&self, hash: &ContentHash) -> Result<Option<u64>, StorageError>;

    /// Move a pin from `existing` to `updated`, returning what is now pinned
    async fn pin_update(
        &self,
        owner: &OwnerId,
        existing: &ContentHash,
        updated: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError>;

    /// Pin the graph rooted at `hash`
    async fn recursive_pin(
        &self,
        owner: &OwnerId,
        hash: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError>;

    /// Unpin the graph rooted at `hash`
    async fn recursive_unpin(
        &self,
        owner: &OwnerId,
        hash: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError>;

    /// Remove unreferenced blocks
    async fn gc(&self) -> Result<(), StorageError>;
}

/// Grants short-lived access to objects in the backing object store
#[async_trait]
pub trait BlockAuthorizer: Send + Sync {
    /// One presigned upload per block, in input order.
    ///
    /// `signatures[i]` must be `writer`'s signature over the hash of a block
    /// of `block_sizes[i]` bytes.
    async fn auth_writes(
        &self,
        owner: &OwnerId,
        writer: &OwnerId,
        signatures: &[Vec<u8>],
        block_sizes: &[u64],
        kind: BlockKind,
        transaction: &TransactionId,
    ) -> Result<Vec<PresignedRequest>, StorageError>;

    /// One presigned download per hash, in input order
    async fn auth_reads(
        &self,
        hashes: &[ContentHash],
    ) -> Result<Vec<PresignedRequest>, StorageError>;
}

/// A service that can both authorize object-store access and act as a
/// complete [ContentAddressedStorage] when direct access fails.
pub trait FallbackService: ContentAddressedStorage + BlockAuthorizer {}

impl<T> FallbackService for T where T: ContentAddressedStorage + BlockAuthorizer {}

/// Pairs a [BlockAuthorizer] with the [ContentAddressedStorage] it
/// authorizes access to.
#[derive(Debug, Clone)]
pub struct Fallback<Authorizer, Storage> {
    /// Grants presigned access
    pub authorizer: Authorizer,
    /// Serves everything else
    pub storage: Storage,
}

impl<Authorizer, Storage> Fallback<Authorizer, Storage> {
    /// Combine an authorizer and a storage service
    pub fn new(authorizer: Authorizer, storage: Storage) -> Self {
        Self {
            authorizer,
            storage,
        }
    }
}

#[async_trait]
impl<Authorizer, Storage> BlockAuthorizer for Fallback<Authorizer, Storage>
where
    Authorizer: BlockAuthorizer,
    Storage: Send + Sync,
{
    async fn auth_writes(
        &self,
        owner: &OwnerId,
        writer: &OwnerId,
        signatures: &[Vec<u8>],
        block_sizes: &[u64],
        kind: BlockKind,
        transaction: &TransactionId,
    ) -> Result<Vec<PresignedRequest>, StorageError> {
        self.authorizer
            .auth_writes(owner, writer, signatures, block_sizes, kind, transaction)
            .await
    }

    async fn auth_reads(
        &self,
        hashes: &[ContentHash],
    ) -> Result<Vec<PresignedRequest>, StorageError> {
        self.authorizer.auth_reads(hashes).await
    }
}

#[async_trait]
impl<Authorizer, Storage> ContentAddressedStorage for Fallback<Authorizer, Storage>
where
    Authorizer: Send + Sync,
    Storage: ContentAddressedStorage,
{
    async fn id(&self) -> Result<NodeId, StorageError> {
        self.storage.id().await
    }

    async fn start_transaction(&self, owner: &OwnerId) -> Result<TransactionId, StorageError> {
        self.storage.start_transaction(owner).await
    }

    async fn close_transaction(
        &self,
        owner: &OwnerId,
        transaction: &TransactionId,
    ) -> Result<(), StorageError> {
        self.storage.close_transaction(owner, transaction).await
    }

    async fn put(
        &self,
        owner: &OwnerId,
        writer: &OwnerId,
        signatures: &[Vec<u8>],
        blocks: &[Vec<u8>],
        transaction: &TransactionId,
    ) -> Result<Vec<ContentHash>, StorageError> {
        self.storage
            .put(owner, writer, signatures, blocks, transaction)
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
        self.storage
            .put_raw(owner, writer, signatures, blocks, transaction)
            .await
    }

    async fn get_raw(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StorageError> {
        self.storage.get_raw(hash).await
    }

    async fn get(&self, hash: &ContentHash) -> Result<Option<Ipld>, StorageError> {
        self.storage.get(hash).await
    }

    async fn get_size(&self, hash: &ContentHash) -> Result<Option<u64>, StorageError> {
        self.storage.get_size(hash).await
    }

    async fn pin_update(
        &self,
        owner: &OwnerId,
        existing: &ContentHash,
        updated: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError> {
        self.storage.pin_update(owner, existing, updated).await
    }

    async fn recursive_pin(
        &self,
        owner: &OwnerId,
        hash: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError> {
        self.storage.recursive_pin(owner, hash).await
    }

    async fn recursive_unpin(
        &self,
        owner: &OwnerId,
        hash: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError> {
        self.storage.recursive_unpin(owner, hash).await
    }

    async fn gc(&self) -> Result<(), StorageError> {
        self.storage.gc().await
    }
}

#[async_trait]
impl<T> BlockAuthorizer for Arc<T>
where
    T: BlockAuthorizer + ?Sized,
{
    async fn auth_writes(
        &self,
        owner: &OwnerId,
        writer: &OwnerId,
        signatures: &[Vec<u8>],
        block_sizes: &[u64],
        kind: BlockKind,
        transaction: &TransactionId,
    ) -> Result<Vec<PresignedRequest>, StorageError> {
        (**self)
            .auth_writes(owner, writer, signatures, block_sizes, kind, transaction)
            .await
    }

    async fn auth_reads(
        &self,
        hashes: &[ContentHash],
    ) -> Result<Vec<PresignedRequest>, StorageError> {
        (**self).auth_reads(hashes).await
    }
}

#[async_trait]
impl<T> ContentAddressedStorage for Arc<T>
where
    T: ContentAddressedStorage + ?Sized,
{
    async fn id(&self) -> Result<NodeId, StorageError> {
        (**self).id().await
    }

    async fn start_transaction(&self, owner: &OwnerId) -> Result<TransactionId, StorageError> {
        (**self).start_transaction(owner).await
    }

    async fn close_transaction(
        &self,
        owner: &OwnerId,
        transaction: &TransactionId,
    ) -> Result<(), StorageError> {
        (**self).close_transaction(owner, transaction).await
    }

    async fn put(
        &self,
        owner: &OwnerId,
        writer: &OwnerId,
        signatures: &[Vec<u8>],
        blocks: &[Vec<u8>],
        transaction: &TransactionId,
    ) -> Result<Vec<ContentHash>, StorageError> {
        (**self)
            .put(owner, writer, signatures, blocks, transaction)
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
        (**self)
            .put_raw(owner, writer, signatures, blocks, transaction)
            .await
    }

    async fn get_raw(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get_raw(hash).await
    }

    async fn get(&self, hash: &ContentHash) -> Result<Option<Ipld>, StorageError> {
        (**self).get(hash).await
    }

    async fn get_size(&self, hash: &ContentHash) -> Result<Option<u64>, StorageError> {
        (**self).get_size(hash).await
    }

    async fn pin_update(
        &self,
        owner: &OwnerId,
        existing: &ContentHash,
        updated: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError> {
        (**self).pin_update(owner, existing, updated).await
    }

    async fn recursive_pin(
        &self,
        owner: &OwnerId,
        hash: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError> {
        (**self).recursive_pin(owner, hash).await
    }

    async fn recursive_unpin(
        &self,
        owner: &OwnerId,
        hash: &ContentHash,
    ) -> Result<Vec<ContentHash>, StorageError> {
        (**self).recursive_unpin(owner, hash).await
    }

    async fn gc(&self) -> Result<(), StorageError> {
        (**self).gc().await
    }
}
