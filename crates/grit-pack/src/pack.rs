//! Random-access reads from an on-disk `.pack`/`.idx` pair.
//!
//! The pack and its index are memory-mapped once at open and read-only for
//! the life of the process, so reads need no locking. Delta chains are
//! walked iteratively with a depth cap.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::bufread::ZlibDecoder;
use grit_hash::{ObjectId, HASH_LEN};
use grit_object::ObjectType;
use memmap2::Mmap;

use crate::entry::parse_entry_header;
use crate::index::PackIndex;
use crate::{
    PackEntryType, PackError, PackedObject, MAX_DELTA_CHAIN_DEPTH, PACK_HEADER_SIZE,
    PACK_SIGNATURE,
};

/// A memory-mapped packfile with its index.
pub struct PackFile {
    data: Mmap,
    index: PackIndex,
    pack_path: PathBuf,
    num_objects: u32,
}

impl std::fmt::Debug for PackFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackFile")
            .field("pack_path", &self.pack_path)
            .field("num_objects", &self.num_objects)
            .finish()
    }
}

impl PackFile {
    /// Open a `.pack` file and its sibling `.idx`.
    pub fn open(pack_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let pack_path = pack_path.as_ref().to_path_buf();
        let idx_path = pack_path.with_extension("idx");

        let file = std::fs::File::open(&pack_path)?;
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < PACK_HEADER_SIZE + HASH_LEN {
            return Err(PackError::Truncated("pack file too small".into()));
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(PackError::Malformed("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != 2 && version != 3 {
            return Err(PackError::UnsupportedVersion(version));
        }
        let num_objects = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let index = PackIndex::open(&idx_path)?;
        if index.num_objects() != num_objects {
            return Err(PackError::Malformed(format!(
                "pack has {} objects but index has {}",
                num_objects,
                index.num_objects()
            )));
        }
        // The index records which pack it describes; a mismatch means the
        // pair is mixed up or corrupt.
        if index.pack_checksum() != Self::trailer_checksum(&data) {
            return Err(PackError::ChecksumMismatch {
                expected: index.pack_checksum().to_hex(),
                actual: Self::trailer_checksum(&data).to_hex(),
            });
        }

        Ok(Self {
            data,
            index,
            pack_path,
            num_objects,
        })
    }

    /// Read an object by hash. `None` if the hash is not in this pack.
    pub fn read_object(&self, oid: &ObjectId) -> Result<Option<PackedObject>, PackError> {
        self.read_object_with_resolver(oid, |_| None)
    }

    /// Read an object by hash, with an external source for ref-delta bases
    /// that live outside this pack.
    pub fn read_object_with_resolver(
        &self,
        oid: &ObjectId,
        resolver: impl Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<Option<PackedObject>, PackError> {
        match self.index.lookup(oid) {
            Some(offset) => self.read_at_offset_with_resolver(offset, resolver).map(Some),
            None => Ok(None),
        }
    }

    /// Read the object whose entry header starts at `offset`.
    pub fn read_at_offset(&self, offset: u64) -> Result<PackedObject, PackError> {
        self.read_at_offset_with_resolver(offset, |_| None)
    }

    fn read_at_offset_with_resolver(
        &self,
        offset: u64,
        resolver: impl Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<PackedObject, PackError> {
        // Collect the delta chain, innermost delta first.
        let mut chain: Vec<Vec<u8>> = Vec::new();
        let mut current = offset;

        loop {
            if chain.len() > MAX_DELTA_CHAIN_DEPTH {
                return Err(PackError::InvalidDelta {
                    offset,
                    reason: format!("delta chain deeper than {MAX_DELTA_CHAIN_DEPTH}"),
                });
            }

            let (entry_type, payload) = self.entry_at(current)?;

            match entry_type {
                PackEntryType::Commit
                | PackEntryType::Tree
                | PackEntryType::Blob
                | PackEntryType::Tag => {
                    let obj_type = entry_type.to_object_type().expect("non-delta kind");
                    let mut data = payload;
                    for delta in chain.iter().rev() {
                        data = crate::delta::apply_delta(&data, delta)?;
                    }
                    return Ok(PackedObject { obj_type, data });
                }
                PackEntryType::OfsDelta { base_offset } => {
                    // Negative offsets strictly decrease, so progress is
                    // guaranteed; the depth cap handles corrupt arithmetic.
                    chain.push(payload);
                    current = base_offset;
                }
                PackEntryType::RefDelta { base_oid } => {
                    chain.push(payload);
                    if let Some(base_offset) = self.index.lookup(&base_oid) {
                        if base_offset == current {
                            return Err(PackError::DeltaCycle(current));
                        }
                        current = base_offset;
                    } else if let Some((obj_type, base)) = resolver(&base_oid) {
                        let mut data = base;
                        for delta in chain.iter().rev() {
                            data = crate::delta::apply_delta(&data, delta)?;
                        }
                        return Ok(PackedObject { obj_type, data });
                    } else {
                        return Err(PackError::MissingBase(base_oid));
                    }
                }
            }
        }
    }

    /// Parse and inflate the entry at `offset`.
    fn entry_at(&self, offset: u64) -> Result<(PackEntryType, Vec<u8>), PackError> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Err(PackError::CorruptEntry(offset));
        }
        let header = parse_entry_header(&self.data[start..], offset)?;

        let compressed = &self.data[start + header.header_size..];
        let mut decoder = ZlibDecoder::new(compressed);
        let mut payload = Vec::with_capacity(header.size as usize);
        decoder
            .read_to_end(&mut payload)
            .map_err(|_| PackError::CorruptEntry(offset))?;
        if payload.len() as u64 != header.size {
            return Err(PackError::CorruptEntry(offset));
        }
        Ok((header.entry_type, payload))
    }

    /// Does this pack contain the hash?
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.index.lookup(oid).is_some()
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.pack_path
    }

    /// The trailing SHA-1 of the pack bytes.
    pub fn checksum(&self) -> ObjectId {
        Self::trailer_checksum(&self.data)
    }

    fn trailer_checksum(data: &[u8]) -> ObjectId {
        let start = data.len() - HASH_LEN;
        ObjectId::from_bytes(&data[start..]).expect("trailer hash")
    }
}
