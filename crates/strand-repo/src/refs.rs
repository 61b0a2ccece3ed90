//! Read-only references: `HEAD`, loose refs under `refs/`, and `packed-refs`.
//!
//! A ref file holds either a 40-hex object id or `ref: <other ref>`. Lookups
//! check the loose file first and fall back to `packed-refs`.

use std::collections::BTreeMap;
use std::fs;
use std::io;

use serde::Serialize;
use strand_store::{Object, ObjectKind, StoreError};
use strand_types::ObjectId;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{RepoError, RepoResult};
use crate::repository::Repository;

/// Longest chain of `ref:` indirections followed before giving up.
pub const MAX_SYMREF_DEPTH: usize = 5;

/// Longest chain of tags followed by [`Repository::peel`].
const MAX_PEEL_DEPTH: usize = 16;

/// Characters that may not appear anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &[' ', '~', '^', ':', '?', '*', '[', '\\'];

/// Check a full ref name such as `HEAD` or `refs/heads/feature/x` against
/// Git's naming rules.
pub fn validate_ref_name(name: &str) -> RepoResult<()> {
    let invalid = |reason: &str| RepoError::InvalidRef {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(RepoError::InvalidRef {
            name: name.to_string(),
            reason: format!("contains forbidden character {ch:?}"),
        });
    }
    if name.contains("..") {
        return Err(invalid("must not contain '..'"));
    }
    if name.contains("@{") || name == "@" {
        return Err(invalid("must not contain '@{' or be '@'"));
    }
    if name.ends_with('.') {
        return Err(invalid("must not end with '.'"));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid("path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid("components must not start with '.'"));
        }
        if component.ends_with(".lock") {
            return Err(invalid("components must not end with '.lock'"));
        }
    }
    Ok(())
}

/// What `HEAD` points at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Head {
    /// On a branch, named by its full ref (`refs/heads/main`). The branch may
    /// not exist yet.
    Symbolic(String),
    /// Detached at a specific object.
    Detached(ObjectId),
}

impl Head {
    /// Short branch name when on a branch.
    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::Symbolic(name) => Some(name.strip_prefix("refs/heads/").unwrap_or(name)),
            Self::Detached(_) => None,
        }
    }
}

/// Contents of a single ref file.
enum RefValue {
    Symbolic(String),
    Direct(ObjectId),
}

fn parse_ref_value(name: &str, raw: &str) -> RepoResult<RefValue> {
    let raw = raw.trim_end();
    if let Some(target) = raw.strip_prefix("ref:") {
        return Ok(RefValue::Symbolic(target.trim().to_string()));
    }
    ObjectId::from_hex(raw)
        .map(RefValue::Direct)
        .map_err(|e| RepoError::InvalidRef {
            name: name.to_string(),
            reason: format!("not an object id or symbolic ref: {e}"),
        })
}

impl Repository {
    /// Read `HEAD` without following it.
    pub fn head(&self) -> RepoResult<Head> {
        let raw = self.read_loose_ref("HEAD")?.ok_or_else(|| RepoError::InvalidRef {
            name: "HEAD".into(),
            reason: "HEAD is missing".into(),
        })?;
        Ok(match parse_ref_value("HEAD", &raw)? {
            RefValue::Symbolic(target) => Head::Symbolic(target),
            RefValue::Direct(id) => Head::Detached(id),
        })
    }

    /// Follow `name` to an object id. Returns `None` when the ref (or the
    /// branch a symbolic ref points at) does not exist yet.
    pub fn resolve_ref(&self, name: &str) -> RepoResult<Option<ObjectId>> {
        let mut current = name.to_string();
        for _ in 0..=MAX_SYMREF_DEPTH {
            validate_ref_name(&current)?;
            let value = match self.read_loose_ref(&current)? {
                Some(raw) => parse_ref_value(&current, &raw)?,
                None => match self.packed_refs()?.remove(&current) {
                    Some(id) => RefValue::Direct(id),
                    None => return Ok(None),
                },
            };
            match value {
                RefValue::Direct(id) => return Ok(Some(id)),
                RefValue::Symbolic(target) => current = target,
            }
        }
        Err(RepoError::InvalidRef {
            name: name.to_string(),
            reason: format!("symbolic ref chain is deeper than {MAX_SYMREF_DEPTH}"),
        })
    }

    /// Every ref under `refs/` that resolves to an object, sorted by name.
    pub fn list_refs(&self) -> RepoResult<Vec<(String, ObjectId)>> {
        let mut refs = self.packed_refs()?;
        let root = self.path("refs");
        if !root.is_dir() {
            return Ok(refs.into_iter().collect());
        }

        for entry in WalkDir::new(&root) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root.as_path()).to_path_buf();
                RepoError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(self.git_dir()) else {
                continue;
            };
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if validate_ref_name(&name).is_err() {
                debug!(name = %name, "skipping file with an invalid ref name");
                continue;
            }
            if let Some(id) = self.resolve_ref(&name)? {
                refs.insert(name, id);
            }
        }
        Ok(refs.into_iter().collect())
    }

    /// Resolve a user-supplied name: an abbreviated or full hex id, `HEAD`,
    /// a full ref name, or a short name looked up under `refs/`,
    /// `refs/tags/`, `refs/heads/`, and `refs/remotes/`, in that order.
    pub fn find_object(&self, name: &str) -> RepoResult<ObjectId> {
        let name = name.trim();
        let not_found = || RepoError::NameNotFound {
            name: name.to_string(),
        };
        if name.is_empty() {
            return Err(not_found());
        }

        if name.bytes().all(|b| b.is_ascii_hexdigit()) {
            match self.objects().resolve_prefix(name) {
                Ok(id) => return Ok(id),
                Err(StoreError::PrefixNotFound { .. } | StoreError::ObjectNotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        // Only all-caps names such as HEAD live directly in the metadata dir.
        let top_level = name.starts_with("refs/")
            || name.bytes().all(|b| b.is_ascii_uppercase() || b == b'_');
        let candidates = [
            top_level.then(|| name.to_string()),
            Some(format!("refs/{name}")),
            Some(format!("refs/tags/{name}")),
            Some(format!("refs/heads/{name}")),
            Some(format!("refs/remotes/{name}")),
            Some(format!("refs/remotes/{name}/HEAD")),
        ];
        for candidate in candidates.into_iter().flatten() {
            if validate_ref_name(&candidate).is_err() {
                continue;
            }
            if let Some(id) = self.resolve_ref(&candidate)? {
                debug!(name, resolved = %candidate, id = %id, "resolved name");
                return Ok(id);
            }
        }
        Err(not_found())
    }

    /// Follow `id` until an object of kind `want` is reached: tags are
    /// unwrapped, and a commit yields its tree when a tree is wanted.
    pub fn peel(&self, id: ObjectId, want: ObjectKind) -> RepoResult<ObjectId> {
        let mut current = id;
        for _ in 0..MAX_PEEL_DEPTH {
            let object = self.read_object(&current)?;
            if object.kind() == want {
                return Ok(current);
            }
            current = match (&object, want) {
                (Object::Tag(tag), _) => tag.object,
                (Object::Commit(commit), ObjectKind::Tree) => commit.tree,
                _ => {
                    return Err(RepoError::KindMismatch {
                        id: current,
                        expected: want,
                        found: object.kind(),
                    })
                }
            };
        }
        Err(RepoError::KindMismatch {
            id: current,
            expected: want,
            found: ObjectKind::Tag,
        })
    }

    fn read_loose_ref(&self, name: &str) -> RepoResult<Option<String>> {
        let path = self.path(name);
        if path.is_dir() {
            return Ok(None);
        }
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RepoError::io(path, e)),
        }
    }

    /// Parse `packed-refs`. Peeled lines (`^<id>`) and comments are skipped.
    fn packed_refs(&self) -> RepoResult<BTreeMap<String, ObjectId>> {
        let path = self.path("packed-refs");
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(RepoError::io(path, e)),
        };

        let mut refs = BTreeMap::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
                continue;
            }
            let malformed = || RepoError::InvalidRef {
                name: "packed-refs".into(),
                reason: format!("line {}: malformed entry {line:?}", idx + 1),
            };
            let (hex, name) = line.split_once(' ').ok_or_else(malformed)?;
            let id = ObjectId::from_hex(hex).map_err(|_| malformed())?;
            refs.insert(name.to_string(), id);
        }
        Ok(refs)
    }
}
