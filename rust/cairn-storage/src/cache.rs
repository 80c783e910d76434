use std::sync::Arc;

use cairn_identity::{NodeId, OwnerId};
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::StorageError;

/// Entries ordered from least to most recently used
struct Entries {
    capacity: usize,
    nodes: IndexMap<OwnerId, NodeId>,
}

impl Entries {
    fn touch(&mut self, owner: &OwnerId) -> Option<NodeId> {
        let node = self.nodes.shift_remove(owner)?;
        self.nodes.insert(*owner, node.clone());
        Some(node)
    }

    fn insert(&mut self, owner: OwnerId, node: NodeId) {
        if self.nodes.shift_remove(&owner).is_none() && self.nodes.len() >= self.capacity {
            self.nodes.shift_remove_index(0);
        }
        self.nodes.insert(owner, node);
    }
}

/// Remembers which storage node is authoritative for each owner.
///
/// Bounded by capacity: once full, inserting evicts the least recently
/// used owner, where both reads and writes count as use. Entries never
/// expire otherwise; a stale entry costs at most one fallback round trip.
///
/// Clones share the same entries.
#[derive(Clone)]
pub struct RoutingCache {
    entries: Arc<Mutex<Entries>>,
}

impl RoutingCache {
    /// A cache holding at most `capacity` owners
    pub fn new(capacity: usize) -> Result<Self, StorageError> {
        if capacity == 0 {
            return Err(StorageError::Configuration(
                "Could not initialize routing cache: capacity must be greater than 0".into(),
            ));
        }
        Ok(Self {
            entries: Arc::new(Mutex::new(Entries {
                capacity,
                nodes: IndexMap::with_capacity(capacity),
            })),
        })
    }

    /// The cached node for `owner`, marking the entry as most recently used
    pub fn get(&self, owner: &OwnerId) -> Option<NodeId> {
        self.entries.lock().touch(owner)
    }

    /// Cache `node` for `owner`; the last write for an owner wins
    pub fn insert(&self, owner: OwnerId, node: NodeId) {
        self.entries.lock().insert(owner, node);
    }

    /// Whether `owner` is cached, without marking it as used
    pub fn contains(&self, owner: &OwnerId) -> bool {
        self.entries.lock().nodes.contains_key(owner)
    }

    /// Number of cached owners
    pub fn len(&self) -> usize {
        self.entries.lock().nodes.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached owners
    pub fn capacity(&self) -> usize {
        self.entries.lock().capacity
    }
}

impl std::fmt::Debug for RoutingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("RoutingCache")
            .field("len", &entries.nodes.len())
            .field("capacity", &entries.capacity)
            .finish()
    }
}
