//! Loose object database: one zlib-compressed file per object under
//! `objects/<first 2 hex>/<remaining 38 hex>`.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use strand_types::object::OID_HEX_LEN;
use strand_types::{FramedHasher, ObjectId};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::frame;
use crate::object::{Object, ObjectKind};
use crate::traits::ObjectStore;

/// Shortest abbreviated identifier accepted by [`LooseObjectStore::resolve_prefix`].
pub const MIN_PREFIX_LEN: usize = 4;

/// On-disk object store rooted at a repository's `objects/` directory.
///
/// Every read opens, decompresses, and closes the file; nothing is cached.
#[derive(Clone, Debug)]
pub struct LooseObjectStore {
    root: PathBuf,
}

impl LooseObjectStore {
    /// Open a store rooted at `root` (usually `<worktree>/.git/objects`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `id`.
    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        let (dir, file) = id.loose_path_parts();
        self.root.join(dir).join(file)
    }

    /// Returns `true` if a file exists for `id`.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.object_path(id).is_file()
    }

    /// Read an object's kind and undecoded payload, with the framing verified.
    pub fn read_raw(&self, id: &ObjectId) -> StoreResult<(ObjectKind, Vec<u8>)> {
        let path = self.object_path(id);
        let compressed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::ObjectNotFound { id: *id })
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let mut raw = Vec::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut raw)
            .map_err(|e| StoreError::CorruptObject {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let (type_name, payload) = frame::decode(&raw).map_err(|e| e.with_id(*id))?;
        let kind = ObjectKind::from_name(type_name).map_err(|e| e.with_id(*id))?;
        debug!(id = %id.short_hex(), kind = %kind, len = payload.len(), "read object");
        Ok((kind, payload.to_vec()))
    }

    /// Read and decode an object.
    pub fn read_object(&self, id: &ObjectId) -> StoreResult<Object> {
        let (kind, payload) = self.read_raw(id)?;
        Object::decode(kind, &payload).map_err(|e| e.with_id(*id))
    }

    /// Compute an object's identifier and, if `persist` is set, store it.
    ///
    /// Storing is skipped when a file for the identifier already exists. The
    /// compressed bytes are written to a temporary file in the target
    /// directory and renamed into place, so the final path only ever holds a
    /// complete object.
    pub fn write_object(&self, object: &Object, persist: bool) -> StoreResult<ObjectId> {
        let kind = object.kind();
        let payload = object.serialize();
        let id = FramedHasher::hash(kind.name(), &payload);
        if persist {
            self.persist(&id, &frame::encode(kind, &payload))?;
        }
        Ok(id)
    }

    fn persist(&self, id: &ObjectId, framed: &[u8]) -> StoreResult<()> {
        let path = self.object_path(id);
        if path.exists() {
            debug!(id = %id.short_hex(), "object already present");
            return Ok(());
        }
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(framed)
            .map_err(|e| StoreError::io(&path, e))?;
        let compressed = encoder.finish().map_err(|e| StoreError::io(&path, e))?;

        let mut tmp = tempfile::Builder::new()
            .prefix("tmp_obj_")
            .tempfile_in(&dir)
            .map_err(|e| StoreError::io(&dir, e))?;
        tmp.write_all(&compressed)
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        // A concurrent writer may win the rename; its bytes are identical.
        tmp.persist(&path)
            .map_err(|e| StoreError::io(&path, e.error))?;

        debug!(
            id = %id.short_hex(),
            framed = framed.len(),
            compressed = compressed.len(),
            "wrote object"
        );
        Ok(())
    }

    /// All identifiers present in the store, sorted.
    pub fn iter_ids(&self) -> StoreResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        let fanout = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };
        for dir in fanout {
            let dir = dir.map_err(|e| StoreError::io(&self.root, e))?;
            let Some(prefix) = dir.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if prefix.len() != 2 || !dir.path().is_dir() {
                continue;
            }
            ids.extend(self.scan_fanout_dir(&prefix, "")?);
        }
        ids.sort();
        Ok(ids)
    }

    /// Identifiers in `objects/<prefix>/` whose remaining hex starts with `rest`.
    fn scan_fanout_dir(&self, prefix: &str, rest: &str) -> StoreResult<Vec<ObjectId>> {
        let dir = self.root.join(prefix);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(rest) {
                continue;
            }
            // Temporary files and foreign names fail to parse and are skipped.
            if let Ok(id) = ObjectId::from_hex(&format!("{prefix}{name}")) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Expand an abbreviated hex identifier to the unique stored object.
    pub fn resolve_prefix(&self, prefix: &str) -> StoreResult<ObjectId> {
        let prefix = prefix.to_ascii_lowercase();
        let not_found = || StoreError::PrefixNotFound {
            prefix: prefix.clone(),
        };
        if !(MIN_PREFIX_LEN..=OID_HEX_LEN).contains(&prefix.len())
            || !prefix.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(not_found());
        }
        if prefix.len() == OID_HEX_LEN {
            let id = ObjectId::from_hex(&prefix).map_err(|_| not_found())?;
            return if self.contains(&id) {
                Ok(id)
            } else {
                Err(StoreError::ObjectNotFound { id })
            };
        }

        let mut candidates = self.scan_fanout_dir(&prefix[..2], &prefix[2..])?;
        candidates.sort();
        match candidates.len() {
            0 => Err(not_found()),
            1 => Ok(candidates[0]),
            _ => Err(StoreError::AmbiguousPrefix {
                prefix: prefix.clone(),
                candidates,
            }),
        }
    }
}

impl ObjectStore for LooseObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Object> {
        self.read_object(id)
    }

    fn write(&self, object: &Object) -> StoreResult<ObjectId> {
        self.write_object(object, true)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.contains(id))
    }
}
