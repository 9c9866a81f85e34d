//! References for the grit engine.
//!
//! A reference is a named pointer: either directly to an object hash, or
//! symbolically to another reference (`HEAD → refs/heads/master`). The
//! file-backed store keeps one file per loose ref under `refs/…` plus a
//! single sorted `packed-refs` file; a name present in both resolves to
//! the loose value.

mod loose;
mod name;
mod packed;
mod store;

pub use name::RefName;
pub use packed::{PackedRef, PackedRefs};
pub use store::{FileRefStore, RefStore, MAX_RESOLVE_DEPTH};

use grit_hash::ObjectId;

/// Errors produced by reference operations.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("invalid ref name: {0}")]
    InvalidName(String),

    #[error("ref not found: {0}")]
    NotFound(String),

    #[error("symbolic ref chain deeper than {MAX_RESOLVE_DEPTH}: {0}")]
    MaxResolveDepth(String),

    #[error("packed-refs parse error at line {line}: {reason}")]
    PackedParse { line: usize, reason: String },

    #[error("malformed ref file {name}: {reason}")]
    MalformedRef { name: String, reason: String },

    #[error("operation canceled")]
    Canceled,

    #[error("lock error: {0}")]
    Lock(#[from] grit_utils::LockError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),
}

impl From<grit_utils::UtilError> for RefError {
    fn from(e: grit_utils::UtilError) -> Self {
        match e {
            grit_utils::UtilError::Lock(lock) => RefError::Lock(lock),
            grit_utils::UtilError::Canceled => RefError::Canceled,
            grit_utils::UtilError::Io(io) => RefError::Io(io),
            other => RefError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

/// A reference: an immutable snapshot of `name → hash` or `name → name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Direct reference to an object.
    Hash { name: RefName, target: ObjectId },
    /// Symbolic reference to another ref.
    Symbolic { name: RefName, target: RefName },
}

impl Reference {
    /// Build a direct reference.
    pub fn hash(name: RefName, target: ObjectId) -> Self {
        Self::Hash { name, target }
    }

    /// Build a symbolic reference. The target must be well-formed: it
    /// either starts with `refs/` or is `HEAD`.
    pub fn symbolic(name: RefName, target: RefName) -> Result<Self, RefError> {
        if !target.is_valid_symref_target() {
            return Err(RefError::InvalidName(format!(
                "symbolic target '{target}' must be under refs/ or be HEAD"
            )));
        }
        Ok(Self::Symbolic { name, target })
    }

    pub fn name(&self) -> &RefName {
        match self {
            Reference::Hash { name, .. } | Reference::Symbolic { name, .. } => name,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Reference::Symbolic { .. })
    }

    /// The target hash, for a direct reference.
    pub fn target_hash(&self) -> Option<ObjectId> {
        match self {
            Reference::Hash { target, .. } => Some(*target),
            Reference::Symbolic { .. } => None,
        }
    }

    /// The target name, for a symbolic reference.
    pub fn symbolic_target(&self) -> Option<&RefName> {
        match self {
            Reference::Symbolic { target, .. } => Some(target),
            Reference::Hash { .. } => None,
        }
    }
}
