//! Packfile reading for the grit engine.
//!
//! A packfile is a `PACK` header, a sequence of zlib-compressed objects
//! (possibly stored as deltas against other objects), and a trailing SHA-1
//! of everything before it. This crate provides the streaming scanner over
//! that wire format, the delta instruction codec and resolver, and the v2
//! pack index — both reading (`PackIndex`) and construction
//! (`IndexBuilder`).

pub mod delta;
pub mod entry;
pub mod index;
pub mod pack;
pub mod scanner;

use grit_hash::ObjectId;
use grit_object::ObjectType;

/// Errors that can occur during pack operations.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("malformed pack: {0}")]
    Malformed(String),

    #[error("truncated pack: {0}")]
    Truncated(String),

    #[error("pack checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("invalid delta at offset {offset}: {reason}")]
    InvalidDelta { offset: u64, reason: String },

    #[error("delta base not found: {0}")]
    MissingBase(ObjectId),

    #[error("delta cycle detected at offset {0}")]
    DeltaCycle(u64),

    #[error("corrupt pack entry at offset {0}")]
    CorruptEntry(u64),

    #[error("operation canceled")]
    Canceled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),
}

/// Kind of a packed entry, including the two pack-only delta kinds.
///
/// Delta kinds never escape the resolver: by the time an object leaves this
/// crate it has been flattened to one of the four object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackEntryType {
    Commit,
    Tree,
    Blob,
    Tag,
    /// Delta whose base lives at an earlier absolute offset in the same pack.
    OfsDelta { base_offset: u64 },
    /// Delta whose base is identified by hash.
    RefDelta { base_oid: ObjectId },
}

impl PackEntryType {
    /// The object kind, for non-delta entries.
    pub fn to_object_type(self) -> Option<ObjectType> {
        match self {
            Self::Commit => Some(ObjectType::Commit),
            Self::Tree => Some(ObjectType::Tree),
            Self::Blob => Some(ObjectType::Blob),
            Self::Tag => Some(ObjectType::Tag),
            Self::OfsDelta { .. } | Self::RefDelta { .. } => None,
        }
    }

    /// The numeric code used in pack entry headers.
    pub fn wire_code(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
            Self::OfsDelta { .. } => 6,
            Self::RefDelta { .. } => 7,
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, Self::OfsDelta { .. } | Self::RefDelta { .. })
    }
}

/// A fully resolved object read from a packfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedObject {
    pub obj_type: ObjectType,
    pub data: Vec<u8>,
}

/// Pack format constants.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_HEADER_SIZE: usize = 12;

/// Pack index v2 constants.
pub const IDX_SIGNATURE: [u8; 4] = [0xff, 0x74, 0x4f, 0x63]; // "\377tOc"
pub const IDX_VERSION: u32 = 2;

/// Maximum delta chain depth before the resolver bails out.
pub const MAX_DELTA_CHAIN_DEPTH: usize = 512;
