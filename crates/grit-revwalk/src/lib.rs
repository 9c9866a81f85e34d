//! History iterators over the commit graph.
//!
//! Commits carry parent hashes, not parent pointers; every walker resolves
//! parents through the object store and keeps a seen-set, so diamond
//! shapes are visited once and every walk over a finite DAG terminates.
//! Walkers are single-pass; restart by constructing a fresh one.

mod merge_base;
mod walk;

pub use merge_base::{is_ancestor, merge_base};
pub use walk::{BfsFilterWalk, CommitTimeWalk, PostOrderWalk, PreOrderWalk};

use grit_hash::ObjectId;
use grit_object::{Commit, Object, ObjectType};
use grit_odb::ObjectStore;

/// Errors produced by history walks.
#[derive(Debug, thiserror::Error)]
pub enum RevWalkError {
    #[error("commit not found: {0}")]
    CommitNotFound(ObjectId),

    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),
}

/// Load and decode a commit from the store.
pub(crate) fn load_commit(
    store: &dyn ObjectStore,
    oid: &ObjectId,
) -> Result<Commit, RevWalkError> {
    let encoded = store
        .get(Some(ObjectType::Commit), oid)
        .map_err(|e| match e {
            grit_odb::OdbError::NotFound(_) => RevWalkError::CommitNotFound(*oid),
            other => RevWalkError::Odb(other),
        })?;
    match encoded.decode()? {
        Object::Commit(commit) => Ok(commit),
        _ => Err(RevWalkError::CommitNotFound(*oid)),
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Builders for synthetic commit DAGs in memory.

    use bstr::BString;
    use grit_hash::ObjectId;
    use grit_object::{Commit, Object};
    use grit_odb::{EncodedObject, MemoryStorage, ObjectStore};
    use grit_utils::date::{GitDate, Signature};

    pub fn signature(timestamp: i64) -> Signature {
        Signature {
            name: BString::from("Test Author"),
            email: BString::from("test@example.com"),
            date: GitDate::new(timestamp, 0),
        }
    }

    /// Store a commit with the given parents and committer time.
    pub fn store_commit(
        storage: &MemoryStorage,
        parents: &[ObjectId],
        timestamp: i64,
        message: &str,
    ) -> ObjectId {
        let commit = Commit {
            tree: ObjectId::NULL,
            parents: parents.to_vec(),
            author: signature(timestamp),
            committer: signature(timestamp),
            encoding: None,
            extra_headers: Vec::new(),
            gpgsig: None,
            message: BString::from(message),
        };
        storage
            .put(&EncodedObject::from_object(&Object::Commit(commit)))
            .unwrap()
    }
}
