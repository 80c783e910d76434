#![warn(missing_docs)]

//! Content-addressed block storage that routes between an S3-compatible
//! object store and a fallback storage service.
//!
//! A [BlockRouter] writes an owner's blocks straight to the object store
//! when the local node is the owner's authoritative storage node, as named
//! by the owner's identity chain in a [Directory](cairn_identity::Directory).
//! Uploads and private downloads use requests presigned by a
//! [BlockAuthorizer] such as [S3Authorizer]. Everything the router cannot do
//! directly is handed to the fallback [ContentAddressedStorage].
//!
//! Blocks are stored under [hash_to_key] of their [ContentHash].

mod attempt;
pub use attempt::*;

mod authorizer;
pub use authorizer::*;

mod cache;
pub use cache::*;

mod error;
pub use error::*;

mod hash;
pub use hash::*;

mod properties;
pub use properties::*;

mod quota;
pub use quota::*;

mod router;
pub use router::*;

mod service;
pub use service::*;

mod transport;
pub use transport::*;

#[cfg(any(test, feature = "helpers"))]
pub mod helpers;
