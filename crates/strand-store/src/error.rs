use std::path::PathBuf;

use strand_types::ObjectId;

/// Errors from object codec and object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object file exists for the requested identifier.
    #[error("object not found: {id}")]
    ObjectNotFound { id: ObjectId },

    /// The stored bytes could not be decompressed.
    #[error("corrupt object at {}: {reason}", .path.display())]
    CorruptObject { path: PathBuf, reason: String },

    /// Decompressed bytes violate the framing or payload contract.
    #[error("malformed object{}: {reason}", fmt_id(.id))]
    MalformedObject {
        id: Option<ObjectId>,
        reason: String,
    },

    /// Type name outside `blob`, `tree`, `commit`, `tag`.
    #[error("unknown object type {type_name:?}{}", fmt_id(.id))]
    UnknownObjectType {
        type_name: String,
        id: Option<ObjectId>,
    },

    /// An abbreviated identifier matched more than one object.
    #[error("ambiguous object prefix {prefix}: {} candidates", .candidates.len())]
    AmbiguousPrefix {
        prefix: String,
        candidates: Vec<ObjectId>,
    },

    /// An abbreviated identifier matched nothing, or is not valid hex.
    #[error("no object matches prefix {prefix:?}")]
    PrefixNotFound { prefix: String },

    /// I/O error from the underlying storage.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedObject {
            id: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach the identifier being read to codec errors raised without one.
    pub fn with_id(self, oid: ObjectId) -> Self {
        match self {
            Self::MalformedObject { id: None, reason } => Self::MalformedObject {
                id: Some(oid),
                reason,
            },
            Self::UnknownObjectType {
                type_name,
                id: None,
            } => Self::UnknownObjectType {
                type_name,
                id: Some(oid),
            },
            other => other,
        }
    }
}

fn fmt_id(id: &Option<ObjectId>) -> String {
    id.map(|id| format!(" {id}")).unwrap_or_default()
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
