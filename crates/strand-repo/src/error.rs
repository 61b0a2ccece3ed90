use std::path::{Path, PathBuf};

use strand_store::ObjectKind;
use strand_types::ObjectId;
use thiserror::Error;

/// Errors from repository discovery, creation, configuration, and refs.
#[derive(Debug, Error)]
pub enum RepoError {
    /// No metadata directory was found where one was required.
    #[error("not a repository (or any parent up to the filesystem root): {}", .path.display())]
    NotARepository { path: PathBuf },

    /// The creation target cannot be used for a new repository.
    #[error("cannot create repository at {}: {reason}", .path.display())]
    PathConflict { path: PathBuf, reason: String },

    /// A path component expected to be a directory is something else.
    #[error("not a directory: {}", .path.display())]
    NotADirectory { path: PathBuf },

    /// The config declares a repository format this implementation does not understand.
    #[error("unsupported repositoryformatversion {found} in {} (expected 0)", .path.display())]
    UnsupportedFormatVersion { path: PathBuf, found: i64 },

    /// The config file is missing or cannot be parsed.
    #[error("corrupt config {}{}: {reason}", .path.display(), fmt_line(*.line))]
    ConfigCorrupt {
        path: PathBuf,
        line: Option<usize>,
        reason: String,
    },

    /// A config key cannot be written in a form the config parser reads back.
    #[error("invalid config key {key:?}: {reason}")]
    InvalidConfigKey { key: String, reason: String },

    /// A ref name or ref file is invalid.
    #[error("invalid ref {name:?}: {reason}")]
    InvalidRef { name: String, reason: String },

    /// A name did not resolve to any ref or object.
    #[error("no ref or object named {name:?}")]
    NameNotFound { name: String },

    /// Peeling reached an object that cannot lead to the wanted kind.
    #[error("object {id} is a {found}, not a {expected}")]
    KindMismatch {
        id: ObjectId,
        expected: ObjectKind,
        found: ObjectKind,
    },

    /// Object store failure.
    #[error(transparent)]
    Store(#[from] strand_store::StoreError),

    /// I/O error outside the object store.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RepoError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(line: Option<usize>, reason: impl Into<String>) -> Self {
        Self::ConfigCorrupt {
            path: PathBuf::new(),
            line,
            reason: reason.into(),
        }
    }

    /// Fill in the config path on errors raised while parsing in-memory text.
    pub(crate) fn at_path(self, at: &Path) -> Self {
        match self {
            Self::ConfigCorrupt { path, line, reason } if path.as_os_str().is_empty() => {
                Self::ConfigCorrupt {
                    path: at.to_path_buf(),
                    line,
                    reason,
                }
            }
            Self::UnsupportedFormatVersion { path, found } if path.as_os_str().is_empty() => {
                Self::UnsupportedFormatVersion {
                    path: at.to_path_buf(),
                    found,
                }
            }
            other => other,
        }
    }
}

fn fmt_line(line: Option<usize>) -> String {
    line.map(|l| format!(":{l}")).unwrap_or_default()
}

/// Result alias for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;
