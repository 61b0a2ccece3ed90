//! Object model and content-addressed storage for strand.
//!
//! This crate implements Git's object layer: every blob, tree, commit, and
//! tag is stored as an immutable object identified by the SHA-1 of its framed
//! bytes (`<type> <len>\0<payload>`), zlib-compressed on disk under
//! `objects/<2 hex>/<38 hex>`.
//!
//! # Object Types
//!
//! - [`Blob`] -- raw content
//! - [`Tree`] -- directory listing of `(mode, name, id)` entries
//! - [`Commit`] -- tree, parents, identities, message
//! - [`Tag`] -- named, annotated pointer to another object
//!
//! [`Object`] is the closed union over the four; decoding dispatches on the
//! framing type name and rejects anything else.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`LooseObjectStore`] -- one compressed file per object
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Writes are all-or-nothing: compress in memory, write a temporary file,
//!    rename into place.
//! 3. Concurrent writers of the same ID are harmless; their bytes are equal.
//! 4. Every read goes back to disk; there is no cache at this layer.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod commit;
pub mod error;
pub mod frame;
pub mod kvlm;
pub mod loose;
pub mod memory;
pub mod object;
pub mod traits;
pub mod tree;

// Re-export primary types at crate root for ergonomic imports.
pub use commit::{Commit, Signature, Tag};
pub use error::{StoreError, StoreResult};
pub use kvlm::Kvlm;
pub use loose::LooseObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{hash_object, Blob, Object, ObjectKind};
pub use traits::ObjectStore;
pub use tree::{EntryMode, Tree, TreeEntry};
