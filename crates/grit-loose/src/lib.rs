//! Loose object storage: read, write, and enumerate zlib-compressed objects.
//!
//! Each loose object lives at `objects/XX/YYYY…` where `XX` is the first
//! hash byte in hex and `YYYY…` the remaining 38 hex characters. The file
//! content is zlib-compressed `"<kind> <size>\0<payload>"`.

mod enumerate;
mod read;
mod write;

pub use enumerate::LooseIter;

use std::path::{Path, PathBuf};

use grit_hash::ObjectId;

/// Interface to a loose object directory.
pub struct LooseStore {
    /// Path to the objects directory.
    objects_dir: PathBuf,
    /// Zlib compression level for writes.
    compression: flate2::Compression,
}

impl LooseStore {
    /// Open the loose object store rooted at the given objects directory.
    pub fn open(objects_dir: impl AsRef<Path>) -> Self {
        Self {
            objects_dir: objects_dir.as_ref().to_path_buf(),
            compression: flate2::Compression::default(),
        }
    }

    /// Set the zlib compression level (0–9).
    pub fn set_compression_level(&mut self, level: u32) {
        self.compression = flate2::Compression::new(level);
    }

    /// The file path for a given OID.
    pub fn object_path(&self, oid: &ObjectId) -> PathBuf {
        self.objects_dir.join(oid.loose_path())
    }

    /// The objects directory this store is rooted at.
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }
}

/// Errors from loose object operations.
#[derive(Debug, thiserror::Error)]
pub enum LooseError {
    #[error("corrupt loose object {oid}: {reason}")]
    Corrupt { oid: String, reason: String },

    #[error("decompression error for {oid}: {source}")]
    Decompress {
        oid: String,
        #[source]
        source: std::io::Error,
    },

    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("operation canceled")]
    Canceled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("object parse error: {0}")]
    Object(#[from] grit_object::ObjectError),

    #[error("hash error: {0}")]
    Hash(#[from] grit_hash::HashError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_fans_out_on_first_byte() {
        let store = LooseStore::open("/tmp/objects");
        let oid = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        assert_eq!(
            store.object_path(&oid),
            PathBuf::from("/tmp/objects/da/39a3ee5e6b4b0d3255bfef95601890afd80709")
        );
    }
}
