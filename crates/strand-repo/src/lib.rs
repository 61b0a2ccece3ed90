//! Repository layer for strand: finding, creating, and opening repositories,
//! reading their configuration, and resolving refs and names to objects.
//!
//! # Layout
//!
//! A [`Repository`] is a working tree plus its `.git` metadata directory.
//! Objects live in a [`strand_store::LooseObjectStore`] under `.git/objects`;
//! the repository hands out that store and adds ref lookup on top.
//!
//! # Usage
//!
//! ```no_run
//! use strand_repo::Repository;
//!
//! if let Some(repo) = Repository::discover(".", false)? {
//!     let head = repo.find_object("HEAD")?;
//!     println!("{}", head.short_hex());
//! }
//! # Ok::<(), strand_repo::RepoError>(())
//! ```

pub mod config;
pub mod error;
pub mod refs;
pub mod repository;

pub use config::{Config, Section, REPOSITORY_FORMAT_VERSION};
pub use error::{RepoError, RepoResult};
pub use refs::{validate_ref_name, Head, MAX_SYMREF_DEPTH};
pub use repository::{InitOptions, Repository, DEFAULT_BRANCH, DEFAULT_DESCRIPTION, GIT_DIR};
