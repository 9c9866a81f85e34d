//! Structural diff over Merkle tries.
//!
//! A tree object is a Merkle trie: a node's hash covers its whole subtree,
//! so two subtrees with equal hashes need no descent. The diff walks two
//! tries in tree-entry order, emitting insert/delete/modify changes.

mod tree;
mod walker;

pub use tree::{diff_tree, Change};
pub use walker::{TreeNode, TreeWalker};

use grit_hash::ObjectId;

/// Errors produced by tree walks and diffs.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("tree not found: {0}")]
    TreeNotFound(ObjectId),

    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),
}

pub(crate) fn load_tree(
    store: &dyn grit_odb::ObjectStore,
    oid: &ObjectId,
) -> Result<grit_object::Tree, DiffError> {
    let encoded = store
        .get(Some(grit_object::ObjectType::Tree), oid)
        .map_err(|e| match e {
            grit_odb::OdbError::NotFound(_) => DiffError::TreeNotFound(*oid),
            other => DiffError::Odb(other),
        })?;
    match encoded.decode()? {
        grit_object::Object::Tree(tree) => Ok(tree),
        _ => Err(DiffError::TreeNotFound(*oid)),
    }
}
