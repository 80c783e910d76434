use thiserror::Error;

/// Errors that can occur while preparing or interpreting signed requests.
#[derive(Error, Debug)]
pub enum AuthorizationError {
    /// The configured host cannot be used to address objects
    #[error("invalid host: {0}")]
    InvalidHost(String),
    /// A bucket listing could not be parsed
    #[error("invalid listing: {0}")]
    InvalidListing(String),
    /// The object store answered with an error document
    #[error("object store error {code}: {message}")]
    Service {
        /// The error code reported by the store (e.g. `NoSuchBucket`)
        code: String,
        /// The accompanying message, if any
        message: String,
    },
}
