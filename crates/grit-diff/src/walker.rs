//! Pre-order iterator over the nodes of a tree trie.

use bstr::BString;
use grit_hash::ObjectId;
use grit_object::{FileMode, TreeEntry};
use grit_odb::ObjectStore;

use crate::{load_tree, DiffError};

/// One visited node: its slash-joined path from the root, its mode, and
/// its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub path: BString,
    pub mode: FileMode,
    pub hash: ObjectId,
}

impl TreeNode {
    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }
}

/// Walks a tree and its subtrees in entry order, yielding every node
/// (subtree nodes before their children).
pub struct TreeWalker<'a> {
    store: &'a dyn ObjectStore,
    /// Pending nodes, pushed in reverse entry order so pops follow it.
    stack: Vec<TreeNode>,
}

impl<'a> TreeWalker<'a> {
    pub fn new(store: &'a dyn ObjectStore, root: &ObjectId) -> Result<Self, DiffError> {
        let tree = load_tree(store, root)?;
        let mut walker = Self {
            store,
            stack: Vec::new(),
        };
        walker.push_children(&BString::from(""), &tree.entries);
        Ok(walker)
    }

    fn push_children(&mut self, prefix: &BString, entries: &[TreeEntry]) {
        for entry in entries.iter().rev() {
            self.stack.push(TreeNode {
                path: join_path(prefix, &entry.name),
                mode: entry.mode,
                hash: entry.oid,
            });
        }
    }
}

impl Iterator for TreeWalker<'_> {
    type Item = Result<TreeNode, DiffError>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if node.is_tree() {
            match load_tree(self.store, &node.hash) {
                Ok(subtree) => self.push_children(&node.path, &subtree.entries),
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(node))
    }
}

pub(crate) fn join_path(prefix: &BString, name: &BString) -> BString {
    if prefix.is_empty() {
        name.clone()
    } else {
        let mut path = prefix.clone();
        path.push(b'/');
        path.extend_from_slice(name);
        path
    }
}
