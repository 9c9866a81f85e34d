//! The reference store: trait and file-backed implementation.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use grit_hash::ObjectId;
use grit_utils::CancelToken;

use crate::loose::{delete_loose_ref, enumerate_loose_refs, read_loose_ref, write_loose_ref};
use crate::packed::PackedRefs;
use crate::{RefError, RefName, Reference};

/// Symbolic chains longer than this fail `MaxResolveDepth`.
pub const MAX_RESOLVE_DEPTH: usize = 10;

/// Reference CRUD plus symbolic resolution.
///
/// Iteration order is unspecified; callers must not depend on it. Returned
/// references are immutable snapshots — the store owns the canonical
/// copies.
pub trait RefStore: Send + Sync {
    /// Look up one reference. Fails `NotFound` when absent.
    fn get(&self, name: &RefName) -> Result<Reference, RefError>;

    /// Create or overwrite a reference.
    fn set(&self, reference: &Reference) -> Result<(), RefError>;

    /// Remove a reference. Removing an absent name is a no-op.
    fn remove(&self, name: &RefName) -> Result<(), RefError>;

    /// Snapshot all references, in unspecified order. The token is checked
    /// between underlying directory entries.
    fn iter(&self, cancel: &CancelToken) -> Result<Vec<Reference>, RefError>;

    /// Follow symbolic references to a hash, up to [`MAX_RESOLVE_DEPTH`]
    /// hops.
    fn resolve(&self, name: &RefName) -> Result<ObjectId, RefError> {
        let mut current = self.get(name)?;
        for _ in 0..=MAX_RESOLVE_DEPTH {
            match current {
                Reference::Hash { target, .. } => return Ok(target),
                Reference::Symbolic { target, .. } => current = self.get(&target)?,
            }
        }
        Err(RefError::MaxResolveDepth(name.to_string()))
    }
}

/// File-backed reference store: loose files under `refs/` plus the
/// `packed-refs` file.
///
/// Reads prefer loose over packed. Writes go loose and never touch packed
/// entries (loose-wins shadows them); removal drops both copies. Readers
/// proceed concurrently; writers hold an exclusive lock for the duration
/// of the loose-file rename.
pub struct FileRefStore {
    git_dir: PathBuf,
    /// Loaded packed-refs plus the writer exclusion for loose updates.
    packed: RwLock<PackedRefs>,
}

impl FileRefStore {
    /// Open the store rooted at a git directory, loading `packed-refs`.
    pub fn open(git_dir: impl AsRef<Path>) -> Result<Self, RefError> {
        let git_dir = git_dir.as_ref().to_path_buf();
        let packed = PackedRefs::load(&git_dir)?;
        Ok(Self {
            git_dir,
            packed: RwLock::new(packed),
        })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Re-read `packed-refs` from disk.
    pub fn reload_packed(&self) -> Result<(), RefError> {
        let fresh = PackedRefs::load(&self.git_dir)?;
        *self.packed.write().expect("packed lock") = fresh;
        Ok(())
    }
}

impl RefStore for FileRefStore {
    fn get(&self, name: &RefName) -> Result<Reference, RefError> {
        if let Some(reference) = read_loose_ref(&self.git_dir, name)? {
            return Ok(reference);
        }
        let packed = self.packed.read().expect("packed lock");
        if let Some(entry) = packed.get(name) {
            return Ok(Reference::hash(entry.name.clone(), entry.target));
        }
        Err(RefError::NotFound(name.to_string()))
    }

    fn set(&self, reference: &Reference) -> Result<(), RefError> {
        let _writer = self.packed.write().expect("packed lock");
        write_loose_ref(&self.git_dir, reference)
    }

    fn remove(&self, name: &RefName) -> Result<(), RefError> {
        let mut packed = self.packed.write().expect("packed lock");
        delete_loose_ref(&self.git_dir, name)?;
        if packed.remove(name) {
            packed.save(&self.git_dir)?;
        }
        Ok(())
    }

    fn iter(&self, cancel: &CancelToken) -> Result<Vec<Reference>, RefError> {
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for name in enumerate_loose_refs(&self.git_dir, cancel)? {
            if let Some(reference) = read_loose_ref(&self.git_dir, &name)? {
                seen.insert(name);
                out.push(reference);
            }
        }

        let packed = self.packed.read().expect("packed lock");
        for entry in packed.iter() {
            if cancel.is_canceled() {
                return Err(RefError::Canceled);
            }
            if !seen.contains(&entry.name) {
                out.push(Reference::hash(entry.name.clone(), entry.target));
            }
        }
        Ok(out)
    }
}
