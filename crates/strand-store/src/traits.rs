use strand_types::ObjectId;

use crate::error::StoreResult;
use crate::object::Object;

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. The same object always produces the
///   same ID, and an ID never maps to different bytes.
/// - Writing an object that is already present is a no-op.
/// - A missing object is an error ([`StoreError::ObjectNotFound`]), not an
///   empty result.
/// - All I/O errors are propagated, never silently ignored.
///
/// [`StoreError::ObjectNotFound`]: crate::StoreError::ObjectNotFound
pub trait ObjectStore: Send + Sync {
    /// Read and decode an object by its ID.
    fn read(&self, id: &ObjectId) -> StoreResult<Object>;

    /// Write an object and return its ID.
    fn write(&self, object: &Object) -> StoreResult<ObjectId>;

    /// Check whether an object exists in the store.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Write multiple objects and return their IDs in order.
    ///
    /// Default implementation calls `write()` for each object.
    fn write_batch(&self, objects: &[Object]) -> StoreResult<Vec<ObjectId>> {
        objects.iter().map(|obj| self.write(obj)).collect()
    }
}
