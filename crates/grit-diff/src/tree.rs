//! Synchronized two-trie diff.

use bstr::BString;
use grit_hash::ObjectId;
use grit_object::{FileMode, TreeEntry};
use grit_odb::ObjectStore;

use crate::walker::join_path;
use crate::{load_tree, DiffError};

/// One structural change between two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Present only on the right side.
    Insert {
        path: BString,
        mode: FileMode,
        hash: ObjectId,
    },
    /// Present only on the left side.
    Delete {
        path: BString,
        mode: FileMode,
        hash: ObjectId,
    },
    /// Present on both sides with differing content (or kind).
    Modify {
        path: BString,
        old_mode: FileMode,
        old_hash: ObjectId,
        new_mode: FileMode,
        new_hash: ObjectId,
    },
}

impl Change {
    pub fn path(&self) -> &BString {
        match self {
            Change::Insert { path, .. }
            | Change::Delete { path, .. }
            | Change::Modify { path, .. } => path,
        }
    }
}

/// Diff two trees, yielding changes in tree-entry order.
///
/// `None` stands for the empty tree (initial commits). Entries whose hash
/// and mode agree are skipped without descent — equal Merkle hashes cover
/// the whole subtree. The regular and deprecated-regular file modes count
/// as equal.
pub fn diff_tree(
    store: &dyn ObjectStore,
    old: Option<&ObjectId>,
    new: Option<&ObjectId>,
) -> Result<Vec<Change>, DiffError> {
    let old_entries = match old {
        Some(oid) => load_tree(store, oid)?.entries,
        None => Vec::new(),
    };
    let new_entries = match new {
        Some(oid) => load_tree(store, oid)?.entries,
        None => Vec::new(),
    };

    let mut changes = Vec::new();
    diff_entries(
        store,
        &old_entries,
        &new_entries,
        &BString::from(""),
        &mut changes,
    )?;
    Ok(changes)
}

fn diff_entries(
    store: &dyn ObjectStore,
    old: &[TreeEntry],
    new: &[TreeEntry],
    prefix: &BString,
    changes: &mut Vec<Change>,
) -> Result<(), DiffError> {
    let mut oi = 0;
    let mut ni = 0;

    while oi < old.len() || ni < new.len() {
        match (old.get(oi), new.get(ni)) {
            (Some(old_entry), Some(new_entry)) => {
                match TreeEntry::cmp_entries(old_entry, new_entry) {
                    std::cmp::Ordering::Less => {
                        collect_one_side(store, old_entry, prefix, Side::Left, changes)?;
                        oi += 1;
                    }
                    std::cmp::Ordering::Greater => {
                        collect_one_side(store, new_entry, prefix, Side::Right, changes)?;
                        ni += 1;
                    }
                    std::cmp::Ordering::Equal => {
                        diff_matched(store, old_entry, new_entry, prefix, changes)?;
                        oi += 1;
                        ni += 1;
                    }
                }
            }
            (Some(old_entry), None) => {
                collect_one_side(store, old_entry, prefix, Side::Left, changes)?;
                oi += 1;
            }
            (None, Some(new_entry)) => {
                collect_one_side(store, new_entry, prefix, Side::Right, changes)?;
                ni += 1;
            }
            (None, None) => break,
        }
    }
    Ok(())
}

fn diff_matched(
    store: &dyn ObjectStore,
    old_entry: &TreeEntry,
    new_entry: &TreeEntry,
    prefix: &BString,
    changes: &mut Vec<Change>,
) -> Result<(), DiffError> {
    // Equal hash and equivalent mode: the whole subtree (or file) matches.
    if old_entry.oid == new_entry.oid && old_entry.mode.is_equivalent(&new_entry.mode) {
        return Ok(());
    }

    let path = join_path(prefix, &old_entry.name);

    if old_entry.mode.is_tree() && new_entry.mode.is_tree() {
        let old_tree = load_tree(store, &old_entry.oid)?;
        let new_tree = load_tree(store, &new_entry.oid)?;
        return diff_entries(store, &old_tree.entries, &new_tree.entries, &path, changes);
    }

    changes.push(Change::Modify {
        path,
        old_mode: old_entry.mode,
        old_hash: old_entry.oid,
        new_mode: new_entry.mode,
        new_hash: new_entry.oid,
    });
    Ok(())
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// Record an entry present on one side only, descending into subtrees so
/// the changes name leaves.
fn collect_one_side(
    store: &dyn ObjectStore,
    entry: &TreeEntry,
    prefix: &BString,
    side: Side,
    changes: &mut Vec<Change>,
) -> Result<(), DiffError> {
    let path = join_path(prefix, &entry.name);

    if entry.mode.is_tree() {
        let tree = load_tree(store, &entry.oid)?;
        for child in &tree.entries {
            collect_one_side(store, child, &path, side, changes)?;
        }
        return Ok(());
    }

    changes.push(match side {
        Side::Left => Change::Delete {
            path,
            mode: entry.mode,
            hash: entry.oid,
        },
        Side::Right => Change::Insert {
            path,
            mode: entry.mode,
            hash: entry.oid,
        },
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_object::{Object, Tree};
    use grit_odb::{EncodedObject, MemoryStorage};

    fn store_blob(storage: &MemoryStorage, content: &[u8]) -> ObjectId {
        storage
            .put(&EncodedObject::from_payload(
                grit_object::ObjectType::Blob,
                content.to_vec(),
            ))
            .unwrap()
    }

    fn store_tree(storage: &MemoryStorage, entries: Vec<TreeEntry>) -> ObjectId {
        storage
            .put(&EncodedObject::from_object(&Object::Tree(Tree { entries })))
            .unwrap()
    }

    fn entry(mode: FileMode, name: &str, oid: ObjectId) -> TreeEntry {
        TreeEntry {
            mode,
            name: BString::from(name),
            oid,
        }
    }

    /// Opposite change kinds with identical paths.
    fn assert_mirrored(forward: &[Change], backward: &[Change]) {
        assert_eq!(forward.len(), backward.len());
        for change in forward {
            let mirrored = backward
                .iter()
                .find(|c| c.path() == change.path())
                .expect("path present both ways");
            match (change, mirrored) {
                (Change::Insert { .. }, Change::Delete { .. })
                | (Change::Delete { .. }, Change::Insert { .. })
                | (Change::Modify { .. }, Change::Modify { .. }) => {}
                other => panic!("not mirrored: {other:?}"),
            }
        }
    }

    #[test]
    fn identical_trees_have_no_changes() {
        let storage = MemoryStorage::new();
        let blob = store_blob(&storage, b"same");
        let tree = store_tree(&storage, vec![entry(FileMode::Regular, "file", blob)]);

        assert!(diff_tree(&storage, Some(&tree), Some(&tree)).unwrap().is_empty());
    }

    #[test]
    fn insert_and_delete_against_empty() {
        let storage = MemoryStorage::new();
        let blob = store_blob(&storage, b"content");
        let tree = store_tree(&storage, vec![entry(FileMode::Regular, "new.txt", blob)]);

        let inserts = diff_tree(&storage, None, Some(&tree)).unwrap();
        assert_eq!(
            inserts,
            vec![Change::Insert {
                path: BString::from("new.txt"),
                mode: FileMode::Regular,
                hash: blob,
            }]
        );

        let deletes = diff_tree(&storage, Some(&tree), None).unwrap();
        assert_mirrored(&inserts, &deletes);
    }

    #[test]
    fn modified_file_is_one_modify() {
        let storage = MemoryStorage::new();
        let old_blob = store_blob(&storage, b"v1");
        let new_blob = store_blob(&storage, b"v2");
        let old = store_tree(&storage, vec![entry(FileMode::Regular, "file", old_blob)]);
        let new = store_tree(&storage, vec![entry(FileMode::Regular, "file", new_blob)]);

        let changes = diff_tree(&storage, Some(&old), Some(&new)).unwrap();
        assert_eq!(
            changes,
            vec![Change::Modify {
                path: BString::from("file"),
                old_mode: FileMode::Regular,
                old_hash: old_blob,
                new_mode: FileMode::Regular,
                new_hash: new_blob,
            }]
        );
    }

    #[test]
    fn mode_only_change_is_a_modify() {
        let storage = MemoryStorage::new();
        let blob = store_blob(&storage, b"script");
        let old = store_tree(&storage, vec![entry(FileMode::Regular, "run", blob)]);
        let new = store_tree(&storage, vec![entry(FileMode::Executable, "run", blob)]);

        let changes = diff_tree(&storage, Some(&old), Some(&new)).unwrap();
        assert!(matches!(changes.as_slice(), [Change::Modify { .. }]));
    }

    #[test]
    fn deprecated_regular_mode_matches_regular() {
        let storage = MemoryStorage::new();
        let blob = store_blob(&storage, b"x");
        let old = store_tree(&storage, vec![entry(FileMode::Regular, "file", blob)]);
        let new = store_tree(&storage, vec![entry(FileMode::Deprecated, "file", blob)]);

        assert!(diff_tree(&storage, Some(&old), Some(&new)).unwrap().is_empty());
    }

    #[test]
    fn nested_change_descends_into_subtree() {
        let storage = MemoryStorage::new();
        let old_blob = store_blob(&storage, b"old");
        let new_blob = store_blob(&storage, b"new");
        let same = store_blob(&storage, b"same");

        let old_sub = store_tree(
            &storage,
            vec![
                entry(FileMode::Regular, "changed", old_blob),
                entry(FileMode::Regular, "same", same),
            ],
        );
        let new_sub = store_tree(
            &storage,
            vec![
                entry(FileMode::Regular, "changed", new_blob),
                entry(FileMode::Regular, "same", same),
            ],
        );
        let old = store_tree(&storage, vec![entry(FileMode::Tree, "dir", old_sub)]);
        let new = store_tree(&storage, vec![entry(FileMode::Tree, "dir", new_sub)]);

        let changes = diff_tree(&storage, Some(&old), Some(&new)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path(), "dir/changed");
    }

    #[test]
    fn added_subtree_lists_its_leaves() {
        let storage = MemoryStorage::new();
        let one = store_blob(&storage, b"1");
        let two = store_blob(&storage, b"2");
        let sub = store_tree(
            &storage,
            vec![
                entry(FileMode::Regular, "one", one),
                entry(FileMode::Regular, "two", two),
            ],
        );
        let old = store_tree(&storage, Vec::new());
        let new = store_tree(&storage, vec![entry(FileMode::Tree, "dir", sub)]);

        let changes = diff_tree(&storage, Some(&old), Some(&new)).unwrap();
        let paths: Vec<String> = changes.iter().map(|c| c.path().to_string()).collect();
        assert_eq!(paths, vec!["dir/one", "dir/two"]);
        assert!(changes.iter().all(|c| matches!(c, Change::Insert { .. })));
    }

    #[test]
    fn tree_replaced_by_file_is_a_modify() {
        let storage = MemoryStorage::new();
        let blob = store_blob(&storage, b"flat");
        let inner = store_blob(&storage, b"inner");
        let sub = store_tree(&storage, vec![entry(FileMode::Regular, "inner", inner)]);
        let old = store_tree(&storage, vec![entry(FileMode::Tree, "thing", sub)]);
        let new = store_tree(&storage, vec![entry(FileMode::Regular, "thing", blob)]);

        let changes = diff_tree(&storage, Some(&old), Some(&new)).unwrap();
        assert!(matches!(
            changes.as_slice(),
            [Change::Modify { old_mode: FileMode::Tree, new_mode: FileMode::Regular, .. }]
        ));
    }

    #[test]
    fn diff_is_symmetric() {
        let storage = MemoryStorage::new();
        let a = store_blob(&storage, b"a");
        let b = store_blob(&storage, b"b");
        let c = store_blob(&storage, b"c");

        let old = store_tree(
            &storage,
            vec![
                entry(FileMode::Regular, "deleted", a),
                entry(FileMode::Regular, "modified", b),
            ],
        );
        let new = store_tree(
            &storage,
            vec![
                entry(FileMode::Regular, "inserted", c),
                entry(FileMode::Regular, "modified", a),
            ],
        );

        let forward = diff_tree(&storage, Some(&old), Some(&new)).unwrap();
        let backward = diff_tree(&storage, Some(&new), Some(&old)).unwrap();
        assert_mirrored(&forward, &backward);
    }

    #[test]
    fn changes_come_out_in_entry_order() {
        let storage = MemoryStorage::new();
        let blob = store_blob(&storage, b"x");
        let new = store_tree(
            &storage,
            vec![
                entry(FileMode::Regular, "a.txt", blob),
                entry(FileMode::Regular, "b.txt", blob),
                entry(FileMode::Regular, "z.txt", blob),
            ],
        );

        let changes = diff_tree(&storage, None, Some(&new)).unwrap();
        let paths: Vec<String> = changes.iter().map(|c| c.path().to_string()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt", "z.txt"]);
    }
}
