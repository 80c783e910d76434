use std::sync::Arc;

use async_trait::async_trait;
use cairn_identity::OwnerId;

use crate::StorageError;

/// A signed request by an owner for more storage space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceRequest {
    /// The owner asking for space
    pub owner: OwnerId,
    /// The total number of bytes requested
    pub bytes: u64,
    /// The owner's signed message over the request
    pub signature: Vec<u8>,
}

/// Reports and adjusts how many bytes each owner may store
#[async_trait]
pub trait QuotaControl: Send + Sync {
    /// The number of bytes `owner` may store in total
    async fn quota(&self, owner: &OwnerId) -> Result<u64, StorageError>;

    /// Ask for the quota of `request.owner` to become `request.bytes`;
    /// resolves to whether the request was granted
    async fn request_space(&self, request: SpaceRequest) -> Result<bool, StorageError>;
}

#[async_trait]
impl<T> QuotaControl for Arc<T>
where
    T: QuotaControl + ?Sized,
{
    async fn quota(&self, owner: &OwnerId) -> Result<u64, StorageError> {
        (**self).quota(owner).await
    }

    async fn request_space(&self, request: SpaceRequest) -> Result<bool, StorageError> {
        (**self).request_space(request).await
    }
}
