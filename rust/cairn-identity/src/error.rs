use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Bytes do not follow the expected layout
    #[error("Malformed input: {0}")]
    Malformed(String),

    /// A length-prefixed field exceeds the limit allowed for it
    #[error("Field of {size} bytes exceeds limit of {limit} bytes")]
    FieldTooLarge {
        /// The declared size of the field
        size: usize,
        /// The maximum size accepted for the field
        limit: usize,
    },

    /// A signed message did not verify under the expected key
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// The link at `index` does not certify its successor
    #[error("Link {index} does not certify the next key in the chain")]
    InvalidLink {
        /// Position of the offending link within the chain
        index: usize,
    },

    /// The active claim is expired, names a different user, or the username
    /// itself is not acceptable
    #[error("Invalid claim for username '{0}'")]
    InvalidClaim(String),

    /// The key at the junction of a merge is not the key that currently ends
    /// the stored chain
    #[error("Submitted chain does not continue from the current key")]
    KeyMismatch,

    /// A chain update could not be reconciled with the stored chain
    #[error("Chain conflict for '{username}': {source}")]
    Conflict {
        /// The username whose chain was being updated
        username: String,
        /// The reason the update was rejected
        #[source]
        source: Box<IdentityError>,
    },

    /// Producing a signature failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// The directory has no username registered for the owner
    #[error("No username registered for owner {0}")]
    UnknownOwner(String),

    /// The directory has no chain for the username
    #[error("No chain registered for username '{0}'")]
    UnknownUsername(String),

    /// The directory service could not be reached or failed internally
    #[error("Directory service error: {0}")]
    Directory(String),
}

impl IdentityError {
    /// Wraps `self` as the reason a chain update for `username` conflicts
    pub fn into_conflict(self, username: impl Into<String>) -> Self {
        IdentityError::Conflict {
            username: username.into(),
            source: Box::new(self),
        }
    }
}
