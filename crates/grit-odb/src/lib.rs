//! Object storage for the grit engine.
//!
//! Storage is a capability set, not a base class: `ObjectStore`,
//! `RefStore` (from `grit-ref`), and `ConfigStore` are independent traits,
//! and a `Storage` implementation is a plain record satisfying all three.
//! Two reference implementations ship here: `MemoryStorage` (tests,
//! ephemeral repos) and `FilesystemStorage` (loose objects plus packfiles
//! with a byte-budget cache of decoded objects).

mod encoded;
mod filesystem;
mod memory;
mod unpack;

pub use encoded::EncodedObject;
pub use filesystem::FilesystemStorage;
pub use memory::MemoryStorage;
pub use unpack::{unpack_into, UnpackSummary};

use grit_config::Config;
use grit_hash::ObjectId;
use grit_object::ObjectType;
use grit_ref::RefStore;
use grit_utils::CancelToken;

/// Errors produced by storage operations.
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("unexpected object kind for {oid}: wanted {expected}, found {actual}")]
    UnexpectedObject {
        oid: ObjectId,
        expected: ObjectType,
        actual: ObjectType,
    },

    #[error("no usable packfile under {0} (all pack opens failed)")]
    AllPacksFailed(String),

    #[error("operation canceled")]
    Canceled,

    #[error(transparent)]
    Loose(#[from] grit_loose::LooseError),

    #[error(transparent)]
    Pack(#[from] grit_pack::PackError),

    #[error(transparent)]
    Ref(#[from] grit_ref::RefError),

    #[error(transparent)]
    Config(#[from] grit_config::ConfigError),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Content-addressed object storage.
///
/// Writes are idempotent: `put` of content that already exists returns the
/// same hash and changes nothing.
pub trait ObjectStore: Send + Sync {
    /// Store an object, returning its hash.
    fn put(&self, obj: &EncodedObject) -> Result<ObjectId, OdbError>;

    /// Fetch an object. A `Some(kind)` hint must match the stored kind or
    /// the call fails `UnexpectedObject`; `None` resolves across kinds.
    fn get(&self, kind: Option<ObjectType>, oid: &ObjectId) -> Result<EncodedObject, OdbError>;

    /// Is the hash present?
    fn exists(&self, oid: &ObjectId) -> bool;

    /// Snapshot all objects of a kind (`None` = every kind), unordered.
    fn iter(
        &self,
        kind: Option<ObjectType>,
        cancel: &CancelToken,
    ) -> Result<Vec<EncodedObject>, OdbError>;

    /// A fresh writable object builder (not yet stored).
    fn new_object(&self) -> EncodedObject {
        EncodedObject::new(ObjectType::Blob)
    }
}

/// Repository configuration access.
pub trait ConfigStore: Send + Sync {
    fn config(&self) -> Result<Config, OdbError>;
    fn set_config(&self, config: &Config) -> Result<(), OdbError>;
}

/// The full storage capability set a repository façade composes over.
pub trait Storage: Send + Sync {
    fn objects(&self) -> &dyn ObjectStore;
    fn refs(&self) -> &dyn RefStore;
    fn config_store(&self) -> &dyn ConfigStore;
}

/// Enforce a kind hint against an object's actual kind.
pub(crate) fn check_kind(
    oid: &ObjectId,
    hint: Option<ObjectType>,
    actual: ObjectType,
) -> Result<(), OdbError> {
    match hint {
        Some(expected) if expected != actual => Err(OdbError::UnexpectedObject {
            oid: *oid,
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}
