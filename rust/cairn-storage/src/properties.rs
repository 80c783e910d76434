use serde::{Deserialize, Serialize};

/// Default number of owners whose storage node is remembered
pub const DEFAULT_ROUTING_CACHE_SIZE: usize = 100;

/// How a [BlockRouter](crate::BlockRouter) may reach the object store.
///
/// Typically deserialized from the fallback service's description of its
/// backend:
///
/// ```
/// use cairn_storage::BlockStoreProperties;
///
/// let properties: BlockStoreProperties = serde_json::from_str(
///     r#"{ "direct_writes": true, "public_reads": true, "base_url": "https://bucket.example/" }"#,
/// ).unwrap();
/// assert!(!properties.authed_reads);
/// assert_eq!(properties.routing_cache_size, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockStoreProperties {
    /// Upload blocks straight to the object store when this node is
    /// authoritative for the owner
    pub direct_writes: bool,
    /// Blocks can be fetched anonymously from [BlockStoreProperties::base_url]
    pub public_reads: bool,
    /// Blocks can be fetched with URLs presigned by the fallback service
    pub authed_reads: bool,
    /// Prefix that a block's object key is appended to for public reads
    pub base_url: Option<String>,
    /// Number of owners whose storage node is remembered
    pub routing_cache_size: usize,
}

impl Default for BlockStoreProperties {
    fn default() -> Self {
        Self {
            direct_writes: false,
            public_reads: false,
            authed_reads: false,
            base_url: None,
            routing_cache_size: DEFAULT_ROUTING_CACHE_SIZE,
        }
    }
}

impl BlockStoreProperties {
    /// Set whether blocks are uploaded directly
    pub fn with_direct_writes(mut self, enabled: bool) -> Self {
        self.direct_writes = enabled;
        self
    }

    /// Allow anonymous reads from `base_url`
    pub fn with_public_reads(mut self, base_url: impl Into<String>) -> Self {
        self.public_reads = true;
        self.base_url = Some(base_url.into());
        self
    }

    /// Set whether presigned reads are attempted
    pub fn with_authed_reads(mut self, enabled: bool) -> Self {
        self.authed_reads = enabled;
        self
    }

    /// Set the routing cache capacity
    pub fn with_routing_cache_size(mut self, size: usize) -> Self {
        self.routing_cache_size = size;
        self
    }

    /// The public URL of the object stored under `key`
    pub fn public_url(&self, key: &str) -> Option<String> {
        let base = self.base_url.as_deref()?;
        Some(if base.ends_with('/') {
            format!("{base}{key}")
        } else {
            format!("{base}/{key}")
        })
    }
}
