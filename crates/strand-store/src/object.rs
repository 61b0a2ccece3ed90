use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strand_types::{FramedHasher, ObjectId};

use crate::commit::{Commit, Tag};
use crate::error::{StoreError, StoreResult};
use crate::frame;
use crate::tree::Tree;

/// The kind of object stored. A closed set: anything else on disk is an
/// [`StoreError::UnknownObjectType`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Raw file content.
    Blob,
    /// Directory snapshot.
    Tree,
    /// Snapshot metadata: tree, parents, identities, message.
    Commit,
    /// Annotated pointer to another object.
    Tag,
}

impl ObjectKind {
    /// The type name used in the framing header.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// Map a framing type name to a kind without looking at any payload.
    pub fn from_name(name: &str) -> StoreResult<Self> {
        match name {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            "tag" => Ok(Self::Tag),
            other => Err(StoreError::UnknownObjectType {
                type_name: other.to_string(),
                id: None,
            }),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObjectKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw content object. No internal structure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    /// Create a new blob from raw bytes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Size of the content in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the blob holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// A typed object: exactly one of the four kinds, owning its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    /// The kind tag of this object.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
            Self::Tag(_) => ObjectKind::Tag,
        }
    }

    /// Encode the variant payload, without the framing header.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Self::Blob(blob) => blob.data.clone(),
            Self::Tree(tree) => tree.serialize(),
            Self::Commit(commit) => commit.serialize(),
            Self::Tag(tag) => tag.serialize(),
        }
    }

    /// Decode a payload whose framing header named `type_name`.
    ///
    /// Unknown type names are rejected before the payload is inspected.
    pub fn deserialize(type_name: &str, payload: &[u8]) -> StoreResult<Self> {
        let kind = ObjectKind::from_name(type_name)?;
        Self::decode(kind, payload)
    }

    /// Decode a payload of a known kind.
    pub fn decode(kind: ObjectKind, payload: &[u8]) -> StoreResult<Self> {
        Ok(match kind {
            ObjectKind::Blob => Self::Blob(Blob::new(payload)),
            ObjectKind::Tree => Self::Tree(Tree::deserialize(payload)?),
            ObjectKind::Commit => Self::Commit(Commit::deserialize(payload)?),
            ObjectKind::Tag => Self::Tag(Tag::deserialize(payload)?),
        })
    }

    /// The framed representation `<type> <len>\0<payload>` that is hashed
    /// and, compressed, written to disk.
    pub fn to_framed(&self) -> Vec<u8> {
        frame::encode(self.kind(), &self.serialize())
    }

    /// Compute the content-addressed identifier without touching any store.
    pub fn id(&self) -> ObjectId {
        FramedHasher::hash(self.kind().name(), &self.serialize())
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(blob) => Some(blob),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Self::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_commit(&self) -> Option<&Commit> {
        match self {
            Self::Commit(commit) => Some(commit),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Self::Tag(tag) => Some(tag),
            _ => None,
        }
    }
}

impl From<Blob> for Object {
    fn from(blob: Blob) -> Self {
        Self::Blob(blob)
    }
}

impl From<Tree> for Object {
    fn from(tree: Tree) -> Self {
        Self::Tree(tree)
    }
}

impl From<Commit> for Object {
    fn from(commit: Commit) -> Self {
        Self::Commit(commit)
    }
}

impl From<Tag> for Object {
    fn from(tag: Tag) -> Self {
        Self::Tag(tag)
    }
}

/// Compute an object's identifier: the write path with persistence off.
pub fn hash_object(object: &Object) -> ObjectId {
    object.id()
}
