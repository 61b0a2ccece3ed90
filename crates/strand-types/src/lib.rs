//! Foundation types for strand.
//!
//! Every other strand crate depends on `strand-types` for the content
//! identifier that keys the object database.
//!
//! # Key Types
//!
//! - [`ObjectId`] — SHA-1 digest of an object's framed bytes
//! - [`FramedHasher`] — incremental hasher producing an [`ObjectId`] from a
//!   type name and payload without materializing the framed buffer

pub mod error;
pub mod hasher;
pub mod object;

pub use error::TypeError;
pub use hasher::FramedHasher;
pub use object::ObjectId;
