//! On-disk storage: loose objects, packfiles, refs, and config under a
//! git directory.
//!
//! Reads consult the decoded-object cache, then the loose tree, then the
//! loaded packs. Writes always land loose (content-addressed, idempotent).
//! Pack and index memory is mapped once at open and read-only afterwards;
//! the cache sits behind a single mutex with O(1) critical sections.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use grit_config::Config;
use grit_hash::ObjectId;
use grit_loose::LooseStore;
use grit_object::cache::ObjectCache;
use grit_object::ObjectType;
use grit_pack::pack::PackFile;
use grit_ref::{FileRefStore, RefStore};
use grit_utils::CancelToken;

use crate::{check_kind, ConfigStore, EncodedObject, ObjectStore, OdbError, Storage};

/// File-backed storage rooted at a git directory.
pub struct FilesystemStorage {
    git_dir: PathBuf,
    loose: LooseStore,
    packs: Vec<PackFile>,
    cache: Mutex<ObjectCache<EncodedObject>>,
    refs: FileRefStore,
}

impl std::fmt::Debug for FilesystemStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemStorage")
            .field("git_dir", &self.git_dir)
            .field("packs", &self.packs.len())
            .finish()
    }
}

impl FilesystemStorage {
    /// Open storage at `git_dir`, discovering `.pack`/`.idx` pairs.
    ///
    /// A pack that fails to open is skipped with a log line; only every
    /// pack failing is fatal.
    pub fn open(git_dir: impl AsRef<Path>) -> Result<Self, OdbError> {
        Self::open_with_cache(git_dir, ObjectCache::with_default_capacity())
    }

    /// Open with an explicit cache budget (tests use tiny budgets).
    pub fn open_with_cache(
        git_dir: impl AsRef<Path>,
        cache: ObjectCache<EncodedObject>,
    ) -> Result<Self, OdbError> {
        let git_dir = git_dir.as_ref().to_path_buf();
        let objects_dir = git_dir.join("objects");
        fs::create_dir_all(&objects_dir)?;

        let loose = LooseStore::open(&objects_dir);
        let packs = Self::discover_packs(&objects_dir)?;
        let refs = FileRefStore::open(&git_dir)?;

        Ok(Self {
            git_dir,
            loose,
            packs,
            cache: Mutex::new(cache),
            refs,
        })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// The loaded packs.
    pub fn packs(&self) -> &[PackFile] {
        &self.packs
    }

    fn discover_packs(objects_dir: &Path) -> Result<Vec<PackFile>, OdbError> {
        let pack_dir = objects_dir.join("pack");
        if !pack_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut pack_paths: Vec<PathBuf> = fs::read_dir(&pack_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "pack"))
            .collect();
        pack_paths.sort();

        let mut packs = Vec::new();
        let mut failures = 0;
        for path in &pack_paths {
            match PackFile::open(path) {
                Ok(pack) => packs.push(pack),
                Err(e) => {
                    failures += 1;
                    log::warn!("skipping unusable pack {}: {e}", path.display());
                }
            }
        }
        if failures > 0 && packs.is_empty() {
            return Err(OdbError::AllPacksFailed(pack_dir.display().to_string()));
        }
        Ok(packs)
    }

    /// Read through loose then packs, without touching the cache.
    fn read_uncached(&self, oid: &ObjectId) -> Result<Option<EncodedObject>, OdbError> {
        if let Some((kind, payload)) = self.loose.read(oid)? {
            return Ok(Some(EncodedObject::from_payload(kind, payload)));
        }

        for pack in &self.packs {
            let resolved = pack.read_object_with_resolver(oid, |base| {
                // Ref-delta bases can live in another pack or loose.
                self.read_uncached(base)
                    .ok()
                    .flatten()
                    .map(|obj| (obj.kind(), obj.payload().to_vec()))
            })?;
            if let Some(packed) = resolved {
                return Ok(Some(EncodedObject::from_payload(
                    packed.obj_type,
                    packed.data,
                )));
            }
        }
        Ok(None)
    }
}

impl ObjectStore for FilesystemStorage {
    fn put(&self, obj: &EncodedObject) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write(obj.kind(), obj.payload())?)
    }

    fn get(&self, kind: Option<ObjectType>, oid: &ObjectId) -> Result<EncodedObject, OdbError> {
        {
            let mut cache = self.cache.lock().expect("cache lock");
            if let Some(obj) = cache.get(oid) {
                let obj = obj.clone();
                check_kind(oid, kind, obj.kind())?;
                return Ok(obj);
            }
        }

        let obj = self
            .read_uncached(oid)?
            .ok_or(OdbError::NotFound(*oid))?;
        check_kind(oid, kind, obj.kind())?;

        let size = obj.size() as usize;
        self.cache
            .lock()
            .expect("cache lock")
            .put(*oid, obj.clone(), size);
        Ok(obj)
    }

    fn exists(&self, oid: &ObjectId) -> bool {
        if self.cache.lock().expect("cache lock").contains(oid) {
            return true;
        }
        self.loose.contains(oid) || self.packs.iter().any(|p| p.contains(oid))
    }

    fn iter(
        &self,
        kind: Option<ObjectType>,
        cancel: &CancelToken,
    ) -> Result<Vec<EncodedObject>, OdbError> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        for result in self.loose.iter(cancel.clone()) {
            let oid = result?;
            if seen.insert(oid) {
                let obj = self.get(None, &oid)?;
                if kind.is_none() || kind == Some(obj.kind()) {
                    out.push(obj);
                }
            }
        }

        for pack in &self.packs {
            for (oid, _offset) in pack.index().iter() {
                if cancel.is_canceled() {
                    return Err(OdbError::Canceled);
                }
                if seen.insert(oid) {
                    let obj = self.get(None, &oid)?;
                    if kind.is_none() || kind == Some(obj.kind()) {
                        out.push(obj);
                    }
                }
            }
        }
        Ok(out)
    }
}

impl ConfigStore for FilesystemStorage {
    fn config(&self) -> Result<Config, OdbError> {
        let path = self.git_dir.join("config");
        match fs::read(&path) {
            Ok(data) => Ok(Config::from_bytes(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(OdbError::Io(e)),
        }
    }

    fn set_config(&self, config: &Config) -> Result<(), OdbError> {
        use std::io::Write;
        let mut tmp = grit_utils::tempfile::TempFile::new_for(self.git_dir.join("config"))
            .map_err(|e| OdbError::Io(std::io::Error::other(e.to_string())))?;
        tmp.write_all(&config.to_bytes())?;
        tmp.persist(self.git_dir.join("config"))
            .map_err(|e| OdbError::Io(std::io::Error::other(e.to_string())))?;
        Ok(())
    }
}

impl Storage for FilesystemStorage {
    fn objects(&self) -> &dyn ObjectStore {
        self
    }

    fn refs(&self) -> &dyn RefStore {
        &self.refs
    }

    fn config_store(&self) -> &dyn ConfigStore {
        self
    }
}
