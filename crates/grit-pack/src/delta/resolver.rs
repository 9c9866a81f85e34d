//! Delta resolution over a scanned pack.
//!
//! The resolver owns the raw entries of a single pack (so cache keys are
//! plain offsets; the packfile identity is implicit). Ref-delta bases are
//! looked up among already-resolved entries of this pack first, then
//! through the external lookup; ofs-delta bases are entries at earlier
//! offsets. Chains are walked iteratively with an explicit visited set, so
//! a corrupted pack that loops fails with `DeltaCycle` instead of
//! recursing forever.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

use grit_hash::{Hasher, ObjectId};
use grit_object::ObjectType;
use grit_utils::CancelToken;
use lru::LruCache;

use crate::delta::apply_delta;
use crate::scanner::ScannedObject;
use crate::{PackEntryType, PackError, MAX_DELTA_CHAIN_DEPTH};

/// Number of intermediate base results kept hot.
const BASE_CACHE_ENTRIES: usize = 128;

/// A raw pack entry held for resolution.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub offset: u64,
    pub entry_type: PackEntryType,
    /// Inflated payload: object bytes, or the delta instruction stream.
    pub data: Vec<u8>,
    pub crc32: u32,
}

impl From<ScannedObject> for RawEntry {
    fn from(obj: ScannedObject) -> Self {
        Self {
            offset: obj.offset,
            entry_type: obj.entry_type,
            data: obj.data,
            crc32: obj.crc32,
        }
    }
}

/// A fully resolved pack member: flattened bytes plus identity.
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub oid: ObjectId,
    pub offset: u64,
    pub crc32: u32,
    pub obj_type: ObjectType,
    pub data: Vec<u8>,
}

/// Resolves delta chains within one pack.
///
/// `external` supplies ref-delta bases that live outside this pack (thin
/// packs); return `None` for unknown hashes.
pub struct Resolver<F> {
    by_offset: HashMap<u64, RawEntry>,
    hash_to_offset: HashMap<ObjectId, u64>,
    base_cache: LruCache<u64, (ObjectType, Vec<u8>)>,
    external: F,
}

impl<F> Resolver<F>
where
    F: FnMut(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
{
    pub fn new(entries: Vec<RawEntry>, external: F) -> Self {
        let by_offset = entries.into_iter().map(|e| (e.offset, e)).collect();
        Self {
            by_offset,
            hash_to_offset: HashMap::new(),
            base_cache: LruCache::new(NonZeroUsize::new(BASE_CACHE_ENTRIES).unwrap()),
            external,
        }
    }

    /// Resolve every entry to its final bytes, in pack file order.
    ///
    /// The token is checked between objects. Hashes computed along the way
    /// are registered so later ref-deltas can target earlier deltas.
    pub fn resolve_all(&mut self, cancel: &CancelToken) -> Result<Vec<ResolvedEntry>, PackError> {
        let mut offsets: Vec<u64> = self.by_offset.keys().copied().collect();
        offsets.sort_unstable();

        let mut out = Vec::with_capacity(offsets.len());
        for offset in offsets {
            if cancel.is_canceled() {
                return Err(PackError::Canceled);
            }
            let (obj_type, data) = self.resolve_at(offset)?;
            let oid = Hasher::hash_object(obj_type.as_str(), &data)?;
            self.hash_to_offset.insert(oid, offset);

            let crc32 = self.by_offset[&offset].crc32;
            out.push(ResolvedEntry {
                oid,
                offset,
                crc32,
                obj_type,
                data,
            });
        }
        Ok(out)
    }

    /// Resolve the entry at `offset` to `(kind, bytes)`.
    pub fn resolve_at(&mut self, offset: u64) -> Result<(ObjectType, Vec<u8>), PackError> {
        // Walk down the chain until a non-delta base (or cached bytes).
        let mut chain: Vec<u64> = Vec::new();
        let mut in_chain: HashSet<u64> = HashSet::new();
        let mut cursor = offset;

        let (base_type, mut data) = loop {
            if let Some((ty, bytes)) = self.base_cache.get(&cursor) {
                break (*ty, bytes.clone());
            }

            let entry = self
                .by_offset
                .get(&cursor)
                .ok_or(PackError::CorruptEntry(cursor))?;

            match entry.entry_type {
                PackEntryType::Commit
                | PackEntryType::Tree
                | PackEntryType::Blob
                | PackEntryType::Tag => {
                    let ty = entry.entry_type.to_object_type().expect("non-delta kind");
                    break (ty, entry.data.clone());
                }
                PackEntryType::OfsDelta { base_offset } => {
                    if !in_chain.insert(cursor) {
                        return Err(PackError::DeltaCycle(cursor));
                    }
                    chain.push(cursor);
                    cursor = base_offset;
                }
                PackEntryType::RefDelta { base_oid } => {
                    if !in_chain.insert(cursor) {
                        return Err(PackError::DeltaCycle(cursor));
                    }
                    chain.push(cursor);
                    if let Some(&base_offset) = self.hash_to_offset.get(&base_oid) {
                        cursor = base_offset;
                    } else if let Some((ty, bytes)) = (self.external)(&base_oid) {
                        break (ty, bytes);
                    } else {
                        return Err(PackError::MissingBase(base_oid));
                    }
                }
            }

            if in_chain.contains(&cursor) {
                return Err(PackError::DeltaCycle(cursor));
            }
            if chain.len() > MAX_DELTA_CHAIN_DEPTH {
                return Err(PackError::InvalidDelta {
                    offset,
                    reason: format!("delta chain deeper than {MAX_DELTA_CHAIN_DEPTH}"),
                });
            }
        };

        // Replay the chain outward, caching each intermediate result.
        for &delta_offset in chain.iter().rev() {
            let delta = &self.by_offset[&delta_offset].data;
            data = apply_delta(&data, delta)?;
            self.base_cache
                .put(delta_offset, (base_type, data.clone()));
        }

        Ok((base_type, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{encode_copy, encode_insert, write_varint};
    use crate::PackEntryType;

    fn full_entry(offset: u64, ty: PackEntryType, data: &[u8]) -> RawEntry {
        RawEntry {
            offset,
            entry_type: ty,
            data: data.to_vec(),
            crc32: 0,
        }
    }

    fn make_delta(base: &[u8], result: &[u8]) -> Vec<u8> {
        // A trivial delta: one insert of the full result.
        let mut delta = Vec::new();
        delta.extend_from_slice(&write_varint(base.len() as u64));
        delta.extend_from_slice(&write_varint(result.len() as u64));
        delta.extend_from_slice(&encode_insert(result));
        delta
    }

    fn no_external(_: &ObjectId) -> Option<(ObjectType, Vec<u8>)> {
        None
    }

    #[test]
    fn resolves_full_objects_as_is() {
        let entries = vec![full_entry(12, PackEntryType::Blob, b"plain")];
        let mut resolver = Resolver::new(entries, no_external);
        let (ty, data) = resolver.resolve_at(12).unwrap();
        assert_eq!(ty, ObjectType::Blob);
        assert_eq!(data, b"plain");
    }

    #[test]
    fn resolves_ofs_delta_chain() {
        let base = b"base bytes";
        let mid = b"mid bytes!";
        let tip = b"tip";

        let entries = vec![
            full_entry(12, PackEntryType::Blob, base),
            RawEntry {
                offset: 40,
                entry_type: PackEntryType::OfsDelta { base_offset: 12 },
                data: make_delta(base, mid),
                crc32: 0,
            },
            RawEntry {
                offset: 80,
                entry_type: PackEntryType::OfsDelta { base_offset: 40 },
                data: make_delta(mid, tip),
                crc32: 0,
            },
        ];

        let mut resolver = Resolver::new(entries, no_external);
        let (ty, data) = resolver.resolve_at(80).unwrap();
        assert_eq!(ty, ObjectType::Blob);
        assert_eq!(data, tip);
    }

    #[test]
    fn resolves_ref_delta_against_earlier_entry() {
        let base = b"base";
        let base_oid = Hasher::hash_object("blob", base).unwrap();

        let entries = vec![
            full_entry(12, PackEntryType::Blob, base),
            RawEntry {
                offset: 40,
                entry_type: PackEntryType::RefDelta { base_oid },
                data: make_delta(base, b"derived"),
                crc32: 0,
            },
        ];

        let mut resolver = Resolver::new(entries, no_external);
        let resolved = resolver.resolve_all(&CancelToken::new()).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1].data, b"derived");
        assert_eq!(resolved[0].oid, base_oid);
    }

    #[test]
    fn ref_delta_falls_back_to_external_store() {
        let base = b"external base";
        let base_oid = Hasher::hash_object("blob", base).unwrap();

        let entries = vec![RawEntry {
            offset: 12,
            entry_type: PackEntryType::RefDelta { base_oid },
            data: make_delta(base, b"thin result"),
            crc32: 0,
        }];

        let mut resolver = Resolver::new(entries, move |oid: &ObjectId| {
            (*oid == base_oid).then(|| (ObjectType::Blob, base.to_vec()))
        });
        let (_, data) = resolver.resolve_at(12).unwrap();
        assert_eq!(data, b"thin result");
    }

    #[test]
    fn missing_base_is_reported() {
        let ghost = ObjectId::from_hex("1234567812345678123456781234567812345678").unwrap();
        let entries = vec![RawEntry {
            offset: 12,
            entry_type: PackEntryType::RefDelta { base_oid: ghost },
            data: make_delta(b"", b"x"),
            crc32: 0,
        }];
        let mut resolver = Resolver::new(entries, no_external);
        assert!(matches!(
            resolver.resolve_at(12).unwrap_err(),
            PackError::MissingBase(oid) if oid == ghost
        ));
    }

    #[test]
    fn ofs_cycle_detected() {
        // Corrupt pack: two deltas pointing at each other.
        let entries = vec![
            RawEntry {
                offset: 12,
                entry_type: PackEntryType::OfsDelta { base_offset: 40 },
                data: make_delta(b"", b"a"),
                crc32: 0,
            },
            RawEntry {
                offset: 40,
                entry_type: PackEntryType::OfsDelta { base_offset: 12 },
                data: make_delta(b"", b"b"),
                crc32: 0,
            },
        ];
        let mut resolver = Resolver::new(entries, no_external);
        assert!(matches!(
            resolver.resolve_at(12).unwrap_err(),
            PackError::DeltaCycle(_)
        ));
    }

    #[test]
    fn copy_delta_through_resolver() {
        let base = b"Hello, World!";
        let mut delta = Vec::new();
        delta.extend_from_slice(&write_varint(base.len() as u64));
        delta.extend_from_slice(&write_varint(10));
        delta.extend_from_slice(&encode_copy(0, 5));
        delta.extend_from_slice(&encode_copy(7, 5));

        let entries = vec![
            full_entry(12, PackEntryType::Blob, base),
            RawEntry {
                offset: 40,
                entry_type: PackEntryType::OfsDelta { base_offset: 12 },
                data: delta,
                crc32: 0,
            },
        ];
        let mut resolver = Resolver::new(entries, no_external);
        let (_, data) = resolver.resolve_at(40).unwrap();
        assert_eq!(data, b"HelloWorld");
    }

    #[test]
    fn canceled_resolution_stops() {
        let entries = vec![full_entry(12, PackEntryType::Blob, b"x")];
        let mut resolver = Resolver::new(entries, no_external);
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(
            resolver.resolve_all(&token).unwrap_err(),
            PackError::Canceled
        ));
    }
}
