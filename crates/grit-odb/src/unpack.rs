//! Decode a packfile stream into an object store.
//!
//! This is the landing path for a fetched pack: scan every entry, resolve
//! delta chains (falling back to the store for thin-pack bases), and put
//! each flattened object. The store's idempotent writes make re-unpacking
//! the same pack harmless.

use std::io::Read;

use grit_hash::ObjectId;
use grit_pack::delta::resolver::{RawEntry, Resolver};
use grit_pack::scanner::Scanner;
use grit_utils::CancelToken;

use crate::{EncodedObject, ObjectStore, OdbError};

/// Outcome of unpacking one pack stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackSummary {
    /// Objects the pack carried (after delta flattening).
    pub object_count: usize,
    /// The pack's trailing checksum.
    pub pack_hash: ObjectId,
}

/// Scan `source` as a packfile and store every object it carries.
///
/// The trailer checksum is validated before anything else; a pack that
/// fails its checksum inserts nothing. The token is checked between
/// objects during both scan and store.
pub fn unpack_into(
    store: &dyn ObjectStore,
    source: impl Read,
    cancel: &CancelToken,
) -> Result<UnpackSummary, OdbError> {
    let mut scanner = Scanner::new(source)?;

    let mut entries: Vec<RawEntry> = Vec::with_capacity(scanner.object_count() as usize);
    while let Some(obj) = scanner.next_object()? {
        if cancel.is_canceled() {
            return Err(OdbError::Canceled);
        }
        entries.push(obj.into());
    }
    // Checksum first: a corrupt pack must not insert anything.
    let pack_hash = scanner.finish()?;

    let mut resolver = Resolver::new(entries, |oid: &ObjectId| {
        store
            .get(None, oid)
            .ok()
            .map(|obj| (obj.kind(), obj.payload().to_vec()))
    });

    let resolved = resolver.resolve_all(cancel)?;
    let object_count = resolved.len();
    for entry in resolved {
        if cancel.is_canceled() {
            return Err(OdbError::Canceled);
        }
        let stored = store.put(&EncodedObject::from_payload(entry.obj_type, entry.data))?;
        debug_assert_eq!(stored, entry.oid);
    }

    Ok(UnpackSummary {
        object_count,
        pack_hash,
    })
}
