//! The directory service that stores identity chains and maps owners back to
//! usernames.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{Chain, IdentityError, OwnerId};

/// Stores and serves identity chains.
///
/// Implementations reject an update that does not validate against the
/// chain they already hold with [IdentityError::Conflict].
#[async_trait]
pub trait Directory: Send + Sync {
    /// Look up the username whose chain includes `owner`
    async fn get_username(&self, owner: &OwnerId) -> Result<String, IdentityError>;

    /// Fetch the current chain for `username`
    async fn get_chain(&self, username: &str) -> Result<Chain, IdentityError>;

    /// Register `username`, or extend its chain with `tail`
    async fn update_chain(&self, username: &str, tail: Chain) -> Result<(), IdentityError>;
}

#[async_trait]
impl<T> Directory for Arc<T>
where
    T: Directory + ?Sized,
{
    async fn get_username(&self, owner: &OwnerId) -> Result<String, IdentityError> {
        (**self).get_username(owner).await
    }

    async fn get_chain(&self, username: &str) -> Result<Chain, IdentityError> {
        (**self).get_chain(username).await
    }

    async fn update_chain(&self, username: &str, tail: Chain) -> Result<(), IdentityError> {
        (**self).update_chain(username, tail).await
    }
}

#[derive(Debug, Default)]
struct Registry {
    chains: HashMap<String, Chain>,
    owners: HashMap<OwnerId, String>,
}

/// A [Directory] held entirely in memory.
///
/// Cloning shares the underlying registry.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    registry: Arc<RwLock<Registry>>,
}

impl MemoryDirectory {
    /// An empty directory
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn get_username(&self, owner: &OwnerId) -> Result<String, IdentityError> {
        self.registry
            .read()
            .await
            .owners
            .get(owner)
            .cloned()
            .ok_or_else(|| IdentityError::UnknownOwner(owner.to_string()))
    }

    async fn get_chain(&self, username: &str) -> Result<Chain, IdentityError> {
        self.registry
            .read()
            .await
            .chains
            .get(username)
            .cloned()
            .ok_or_else(|| IdentityError::UnknownUsername(username.to_string()))
    }

    async fn update_chain(&self, username: &str, tail: Chain) -> Result<(), IdentityError> {
        if tail.first().claim().username() != username {
            return Err(
                IdentityError::InvalidClaim(tail.first().claim().username().to_string())
                    .into_conflict(username),
            );
        }

        let mut registry = self.registry.write().await;
        let updated = match registry.chains.get(username) {
            Some(existing) => existing.merge(&tail)?,
            None => {
                tail.validate(username)
                    .map_err(|error| error.into_conflict(username))?;
                tail
            }
        };

        for link in updated.links() {
            registry
                .owners
                .insert(link.owner().hash(), username.to_string());
        }
        debug!(username, links = updated.len(), "Stored identity chain");
        registry.chains.insert(username.to_string(), updated);
        Ok(())
    }
}
