use std::fs;
use std::path::{Path, PathBuf};

use grit_hash::ObjectId;
use grit_utils::CancelToken;

use crate::{LooseError, LooseStore};

impl LooseStore {
    /// Iterate all loose object OIDs, in unspecified order.
    ///
    /// The token is checked between directory entries; a canceled iteration
    /// yields `Err(Canceled)` and stops.
    pub fn iter(&self, cancel: CancelToken) -> LooseIter {
        LooseIter {
            fanout_dirs: read_fanout_dirs(self.objects_dir()),
            current: Vec::new(),
            cancel,
        }
    }
}

fn read_fanout_dirs(objects_dir: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(entries) = fs::read_dir(objects_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            // Fan-out directories are exactly two hex characters.
            if name.len() == 2 && name.bytes().all(|b| b.is_ascii_hexdigit()) {
                dirs.push(entry.path());
            }
        }
    }
    dirs
}

/// Iterator over loose object OIDs.
pub struct LooseIter {
    fanout_dirs: Vec<PathBuf>,
    current: Vec<ObjectId>,
    cancel: CancelToken,
}

impl Iterator for LooseIter {
    type Item = Result<ObjectId, LooseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cancel.is_canceled() {
                self.fanout_dirs.clear();
                self.current.clear();
                return Some(Err(LooseError::Canceled));
            }

            if let Some(oid) = self.current.pop() {
                return Some(Ok(oid));
            }

            let dir = self.fanout_dirs.pop()?;
            let prefix = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => return Some(Err(LooseError::Io(e))),
            };

            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                let hex = format!("{prefix}{name}");
                if let Ok(oid) = ObjectId::from_hex(&hex) {
                    self.current.push(oid);
                }
                // Anything that is not 38 hex chars (tmp files and the like)
                // is silently skipped.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_object::ObjectType;
    use std::collections::HashSet;

    #[test]
    fn iterates_all_written_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());

        let mut expected = HashSet::new();
        for content in [&b"one"[..], b"two", b"three"] {
            expected.insert(store.write(ObjectType::Blob, content).unwrap());
        }

        let found: HashSet<_> = store
            .iter(CancelToken::new())
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn empty_store_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        assert_eq!(store.iter(CancelToken::new()).count(), 0);
    }

    #[test]
    fn canceled_iteration_stops_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        store.write(ObjectType::Blob, b"x").unwrap();

        let token = CancelToken::new();
        token.cancel();
        let mut iter = store.iter(token);
        assert!(matches!(iter.next(), Some(Err(LooseError::Canceled))));
        assert!(iter.next().is_none());
    }
}
