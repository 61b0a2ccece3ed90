use sha1::{Digest, Sha1};

use crate::object::ObjectId;

/// Incremental SHA-1 hasher over the framed form of an object.
///
/// The framing header `<type> <len>\0` plays the role of a domain tag: a blob
/// and a tree with identical payloads hash differently because their headers
/// differ.
pub struct FramedHasher {
    inner: Sha1,
}

impl FramedHasher {
    /// Start a hash for an object of `type_name` whose payload is `len` bytes.
    pub fn new(type_name: &str, len: usize) -> Self {
        let mut inner = Sha1::new();
        inner.update(header(type_name, len));
        Self { inner }
    }

    /// Feed payload bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finish and return the identifier.
    pub fn finish(self) -> ObjectId {
        ObjectId::from_raw(self.inner.finalize().into())
    }

    /// One-shot hash of a complete payload.
    pub fn hash(type_name: &str, payload: &[u8]) -> ObjectId {
        let mut hasher = Self::new(type_name, payload.len());
        hasher.update(payload);
        hasher.finish()
    }

    /// Verify that a payload produces the expected identifier.
    pub fn verify(type_name: &str, payload: &[u8], expected: &ObjectId) -> bool {
        Self::hash(type_name, payload) == *expected
    }
}

/// Framing header bytes: `<type> <len>\0`.
pub fn header(type_name: &str, len: usize) -> Vec<u8> {
    format!("{type_name} {len}\0").into_bytes()
}
