//! Streaming SHA-1 computation with collision detection.

use crate::{HashError, ObjectId, HASH_LEN};

/// Streaming hash computation.
///
/// Wraps SHA-1 with collision detection behind a small interface. Data can
/// be fed incrementally with [`update`](Hasher::update) or through the
/// [`std::io::Write`] implementation, then finalised into an [`ObjectId`].
pub struct Hasher {
    inner: Box<sha1_checked::Sha1>,
}

impl Hasher {
    pub fn new() -> Self {
        use digest::Digest;
        Self {
            inner: Box::new(sha1_checked::Sha1::new()),
        }
    }

    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        use digest::Digest;
        self.inner.update(data);
    }

    /// Finalize and return the ObjectId.
    ///
    /// Fails if SHA-1 collision detection fires.
    pub fn finalize(self) -> Result<ObjectId, HashError> {
        let result = self.inner.try_finalize();
        if result.has_collision() {
            return Err(HashError::Sha1Collision);
        }
        let mut bytes = [0u8; HASH_LEN];
        bytes.copy_from_slice(result.hash().as_slice());
        Ok(ObjectId::from(bytes))
    }

    /// The digest of everything fed so far, without consuming the hasher.
    ///
    /// Used where a running checksum must be compared against a trailer
    /// that is itself excluded from the digest.
    pub fn digest_so_far(&self) -> Result<ObjectId, HashError> {
        let result = self.inner.clone().try_finalize();
        if result.has_collision() {
            return Err(HashError::Sha1Collision);
        }
        let mut bytes = [0u8; HASH_LEN];
        bytes.copy_from_slice(result.hash().as_slice());
        Ok(ObjectId::from(bytes))
    }

    /// Convenience: hash a byte slice in one call.
    pub fn digest(data: &[u8]) -> Result<ObjectId, HashError> {
        let mut h = Self::new();
        h.update(data);
        h.finalize()
    }

    /// Hash a git object: `"<kind> <size>\0<payload>"`.
    ///
    /// This is the content-address definition: an object's identity is the
    /// hash of its canonical header plus payload, never of in-memory state.
    pub fn hash_object(kind: &str, payload: &[u8]) -> Result<ObjectId, HashError> {
        let mut h = Self::new();
        h.update(kind.as_bytes());
        h.update(b" ");
        h.update(payload.len().to_string().as_bytes());
        h.update(b"\0");
        h.update(payload);
        h.finalize()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
