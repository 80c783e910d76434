use cairn_identity::IdentityError;
use cairn_s3_credentials::AuthorizationError;
use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum StorageError {
    /// An identity chain was malformed, failed verification or conflicted
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A signed request could not be prepared or interpreted
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    /// The storage node responsible for an owner could not be determined
    #[error("Cannot resolve storage node for owner {owner}: {reason}")]
    Resolution {
        /// The owner being resolved
        owner: String,
        /// Why resolution failed
        reason: String,
    },

    /// The object store or fallback service answered with a failure status
    #[error("Request to {url} failed with status {status}")]
    Backend {
        /// The URL that was requested, without its query string
        url: String,
        /// The HTTP status code
        status: u16,
    },

    /// The request never produced a response
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// An authorizer refused to grant access
    #[error("Authorization refused: {0}")]
    Refused(String),

    /// Bytes received for a block do not hash to the requested hash
    #[error("Block {0} does not match its hash")]
    Integrity(String),

    /// An object key is not the encoding of a content hash
    #[error("Invalid object key '{0}'")]
    InvalidKey(String),

    /// A block could not be decoded
    #[error("Failed to decode block: {0}")]
    Decode(String),

    /// The requested block is not stored
    #[error("Block {0} not found")]
    NotFound(String),

    /// A component was configured with unusable settings
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The operation has no meaning for this store
    #[error("{0} is not supported by this store")]
    Unsupported(&'static str),

    /// The owner has no space left for the requested write
    #[error("Quota exceeded for owner {owner}: {requested} bytes requested, {available} available")]
    QuotaExceeded {
        /// The owner whose quota would be exceeded
        owner: String,
        /// Bytes the write needs
        requested: u64,
        /// Bytes remaining in the quota
        available: u64,
    },
}

impl From<reqwest::Error> for StorageError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => StorageError::Backend {
                url: error
                    .url()
                    .map(|url| {
                        let mut url = url.clone();
                        url.set_query(None);
                        url.to_string()
                    })
                    .unwrap_or_default(),
                status: status.as_u16(),
            },
            None => StorageError::Transfer(error.without_url().to_string()),
        }
    }
}
