use std::collections::HashMap;
use std::sync::RwLock;

use strand_types::{FramedHasher, ObjectId};

use crate::error::{StoreError, StoreResult};
use crate::object::{Object, ObjectKind};
use crate::traits::ObjectStore;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. Objects are kept as encoded payloads and
/// decoded on every read, so it exercises the same codec paths as the loose
/// store.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, (ObjectKind, Vec<u8>)>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Return a sorted list of all object IDs in the store.
    pub fn all_ids(&self) -> Vec<ObjectId> {
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Object> {
        let map = self.objects.read().expect("lock poisoned");
        let (kind, payload) = map
            .get(id)
            .ok_or(StoreError::ObjectNotFound { id: *id })?;
        Object::decode(*kind, payload).map_err(|e| e.with_id(*id))
    }

    fn write(&self, object: &Object) -> StoreResult<ObjectId> {
        let kind = object.kind();
        let payload = object.serialize();
        let id = FramedHasher::hash(kind.name(), &payload);
        let mut map = self.objects.write().expect("lock poisoned");
        map.entry(id).or_insert((kind, payload));
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}
