//! Pack index (v2): construction, serialization, and lookup.
//!
//! Layout:
//!
//! ```text
//! Header:  \xff t O c | version (=2)
//! Fanout:  256 × 4-byte big-endian cumulative counts
//! Hashes:  N × 20-byte sorted hashes
//! CRC32:   N × 4-byte CRC32 of the raw pack entries
//! Offsets: N × 4-byte offsets (high bit set → index into 64-bit table)
//! 64-bit:  M × 8-byte large offsets (packs over 2 GiB)
//! Trailer: 20-byte pack checksum | 20-byte index checksum
//! ```

use std::path::{Path, PathBuf};

use grit_hash::{FanoutTable, Hasher, ObjectId, HASH_LEN};
use memmap2::Mmap;

use crate::{PackError, IDX_SIGNATURE, IDX_VERSION};

const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// Memory-mapped pack index providing hash ↔ offset mapping.
pub struct PackIndex {
    data: Mmap,
    num_objects: u32,
    oid_offset: usize,
    crc_offset: usize,
    offset32_offset: usize,
    offset64_offset: usize,
    /// `(pack_offset, sorted_index)` pairs ordered by offset, for the
    /// reverse (offset → hash) direction.
    by_offset: Vec<(u64, u32)>,
    idx_path: PathBuf,
}

impl std::fmt::Debug for PackIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackIndex")
            .field("idx_path", &self.idx_path)
            .field("num_objects", &self.num_objects)
            .finish()
    }
}

impl PackIndex {
    /// Open and validate a `.idx` file.
    pub fn open(idx_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let idx_path = idx_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&idx_path)?;
        let data = unsafe { Mmap::map(&file)? };

        // header(8) + fanout(1024) + trailer(2 × 20)
        if data.len() < 8 + 1024 + 2 * HASH_LEN {
            return Err(PackError::Truncated("index file too small".into()));
        }
        if data[0..4] != IDX_SIGNATURE {
            return Err(PackError::Malformed("bad index signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != IDX_VERSION {
            return Err(PackError::Malformed(format!(
                "unsupported index version {version}, expected {IDX_VERSION}"
            )));
        }

        let fanout_offset = 8;
        let last_fanout = fanout_offset + 255 * 4;
        let num_objects = read_u32(&data, last_fanout);

        let n = num_objects as usize;
        let oid_offset = fanout_offset + 1024;
        let crc_offset = oid_offset + n * HASH_LEN;
        let offset32_offset = crc_offset + n * 4;
        let offset64_offset = offset32_offset + n * 4;

        if data.len() < offset64_offset + 2 * HASH_LEN {
            return Err(PackError::Truncated(format!(
                "index shorter than its {n} entries require"
            )));
        }

        let mut index = Self {
            data,
            num_objects,
            oid_offset,
            crc_offset,
            offset32_offset,
            offset64_offset,
            by_offset: Vec::new(),
            idx_path,
        };

        let mut by_offset: Vec<(u64, u32)> = (0..num_objects)
            .map(|i| (index.offset_at_index(i), i))
            .collect();
        by_offset.sort_unstable();
        index.by_offset = by_offset;

        Ok(index)
    }

    /// Look up a hash, returning its pack offset.
    pub fn lookup(&self, oid: &ObjectId) -> Option<u64> {
        let range = self.fanout_range(oid.first_byte());
        let target = oid.as_bytes().as_slice();

        let mut low = range.start;
        let mut high = range.end;
        while low < high {
            let mid = low + (high - low) / 2;
            match self.oid_bytes_at(mid).cmp(target) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(self.offset_at_index(mid as u32)),
            }
        }
        None
    }

    /// Reverse lookup: the hash of the entry at an exact pack offset.
    pub fn lookup_offset(&self, pack_offset: u64) -> Option<ObjectId> {
        let i = self
            .by_offset
            .binary_search_by_key(&pack_offset, |&(off, _)| off)
            .ok()?;
        Some(self.oid_at_index(self.by_offset[i].1))
    }

    /// All hashes starting with the given byte prefix, with their offsets.
    pub fn lookup_prefix(&self, prefix: &[u8]) -> Vec<(ObjectId, u64)> {
        if prefix.is_empty() {
            return Vec::new();
        }
        self.fanout_range(prefix[0])
            .filter_map(|i| {
                let bytes = self.oid_bytes_at(i);
                (bytes.len() >= prefix.len() && bytes[..prefix.len()] == *prefix).then(|| {
                    (self.oid_at_index(i as u32), self.offset_at_index(i as u32))
                })
            })
            .collect()
    }

    /// The hash at sorted position `index`.
    pub fn oid_at_index(&self, index: u32) -> ObjectId {
        ObjectId::from_bytes(self.oid_bytes_at(index as usize)).expect("index holds raw hashes")
    }

    /// The pack offset at sorted position `index`.
    pub fn offset_at_index(&self, index: u32) -> u64 {
        let val = read_u32(&self.data, self.offset32_offset + index as usize * 4);
        if val & LARGE_OFFSET_FLAG != 0 {
            let idx64 = (val & !LARGE_OFFSET_FLAG) as usize;
            let pos = self.offset64_offset + idx64 * 8;
            u64::from_be_bytes(self.data[pos..pos + 8].try_into().expect("8 bytes"))
        } else {
            val as u64
        }
    }

    /// The entry CRC32 at sorted position `index`.
    pub fn crc32_at_index(&self, index: u32) -> u32 {
        read_u32(&self.data, self.crc_offset + index as usize * 4)
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn path(&self) -> &Path {
        &self.idx_path
    }

    /// The pack checksum recorded in the index trailer.
    pub fn pack_checksum(&self) -> ObjectId {
        let start = self.data.len() - 2 * HASH_LEN;
        ObjectId::from_bytes(&self.data[start..start + HASH_LEN]).expect("trailer hash")
    }

    /// Iterate `(hash, offset)` pairs in hash order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, u64)> + '_ {
        (0..self.num_objects).map(|i| (self.oid_at_index(i), self.offset_at_index(i)))
    }

    fn fanout_range(&self, first_byte: u8) -> std::ops::Range<usize> {
        let fanout_offset = 8;
        let end = read_u32(&self.data, fanout_offset + first_byte as usize * 4) as usize;
        let start = if first_byte == 0 {
            0
        } else {
            read_u32(&self.data, fanout_offset + (first_byte as usize - 1) * 4) as usize
        };
        start..end
    }

    fn oid_bytes_at(&self, index: usize) -> &[u8] {
        let start = self.oid_offset + index * HASH_LEN;
        &self.data[start..start + HASH_LEN]
    }
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes(data[pos..pos + 4].try_into().expect("4 bytes"))
}

/// Accumulates `(hash, offset, crc32)` triples during a pack scan and
/// serializes the v2 index.
#[derive(Default)]
pub struct IndexBuilder {
    entries: Vec<(ObjectId, u64, u32)>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one resolved object.
    pub fn push(&mut self, oid: ObjectId, offset: u64, crc32: u32) {
        self.entries.push((oid, offset, crc32));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sort, build the fanout, and serialize the v2 index bytes.
    ///
    /// `pack_checksum` is the trailing SHA-1 of the `.pack` this index
    /// describes.
    pub fn build(mut self, pack_checksum: &ObjectId) -> Result<Vec<u8>, PackError> {
        self.entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut buf = Vec::with_capacity(8 + 1024 + self.entries.len() * (HASH_LEN + 8));
        buf.extend_from_slice(&IDX_SIGNATURE);
        buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

        let oids: Vec<ObjectId> = self.entries.iter().map(|(oid, _, _)| *oid).collect();
        buf.extend_from_slice(&FanoutTable::build(&oids).to_bytes());

        for (oid, _, _) in &self.entries {
            buf.extend_from_slice(oid.as_bytes());
        }
        for (_, _, crc) in &self.entries {
            buf.extend_from_slice(&crc.to_be_bytes());
        }

        // 31-bit offsets, escaping to the 64-bit table where needed.
        let mut large: Vec<u64> = Vec::new();
        for (_, offset, _) in &self.entries {
            if *offset < LARGE_OFFSET_FLAG as u64 {
                buf.extend_from_slice(&(*offset as u32).to_be_bytes());
            } else {
                let idx = large.len() as u32;
                large.push(*offset);
                buf.extend_from_slice(&(LARGE_OFFSET_FLAG | idx).to_be_bytes());
            }
        }
        for offset in large {
            buf.extend_from_slice(&offset.to_be_bytes());
        }

        buf.extend_from_slice(pack_checksum.as_bytes());

        let index_checksum = Hasher::digest(&buf)?;
        buf.extend_from_slice(index_checksum.as_bytes());
        Ok(buf)
    }
}
