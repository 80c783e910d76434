#![warn(missing_docs)]

//! Identity chains binding a username to a sequence of rotating Ed25519
//! keys.
//!
//! Each [KeyLink] pairs an owner key with a signed [UsernameClaim]. When the
//! owner rotates to a new key the old link carries a key-change proof: the
//! old key's signature over the new key. A [Chain] of links is valid for a
//! username when every active link certifies its successor and the final
//! link holds a live claim.
//!
//! ```rust
//! use cairn_identity::{Chain, KeyLink, SigningIdentity, UsernameClaim};
//! use chrono::NaiveDate;
//!
//! # fn main() -> Result<(), cairn_identity::IdentityError> {
//! let old = SigningIdentity::generate()?;
//! let new = SigningIdentity::generate()?;
//! let expiry = NaiveDate::from_ymd_opt(2999, 1, 1).unwrap();
//!
//! let existing = Chain::single(KeyLink::new(
//!     *old.public_key(),
//!     UsernameClaim::create("alice", &old, expiry)?,
//! ));
//! let rotated = existing.merge(&Chain::create(&old, &new, "alice", expiry)?)?;
//!
//! assert_eq!(rotated.owner(), new.public_key());
//! # Ok(())
//! # }
//! ```

mod chain;
pub use chain::*;

mod claim;
pub use claim::*;

mod codec;
pub use codec::MAX_FIELD_SIZE;

mod directory;
pub use directory::*;

mod error;
pub use error::*;

mod id;
pub use id::*;

mod key;
pub use key::*;

mod link;
pub use link::*;
