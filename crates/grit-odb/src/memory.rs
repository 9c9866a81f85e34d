//! Map-backed storage for tests and ephemeral repositories.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use grit_config::Config;
use grit_hash::ObjectId;
use grit_object::ObjectType;
use grit_ref::{RefError, RefName, RefStore, Reference};
use grit_utils::CancelToken;

use crate::{check_kind, ConfigStore, EncodedObject, ObjectStore, OdbError, Storage};

/// In-memory storage: an object map, a reference map, and a config value.
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<ObjectId, EncodedObject>>,
    refs: MemRefStore,
    config: Mutex<Config>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().expect("object map lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryStorage {
    fn put(&self, obj: &EncodedObject) -> Result<ObjectId, OdbError> {
        let oid = obj.hash()?;
        self.objects
            .write()
            .expect("object map lock")
            .entry(oid)
            .or_insert_with(|| obj.clone());
        Ok(oid)
    }

    fn get(&self, kind: Option<ObjectType>, oid: &ObjectId) -> Result<EncodedObject, OdbError> {
        let objects = self.objects.read().expect("object map lock");
        let obj = objects.get(oid).ok_or(OdbError::NotFound(*oid))?;
        check_kind(oid, kind, obj.kind())?;
        Ok(obj.clone())
    }

    fn exists(&self, oid: &ObjectId) -> bool {
        self.objects.read().expect("object map lock").contains_key(oid)
    }

    fn iter(
        &self,
        kind: Option<ObjectType>,
        cancel: &CancelToken,
    ) -> Result<Vec<EncodedObject>, OdbError> {
        let objects = self.objects.read().expect("object map lock");
        let mut out = Vec::new();
        for obj in objects.values() {
            if cancel.is_canceled() {
                return Err(OdbError::Canceled);
            }
            if kind.is_none() || kind == Some(obj.kind()) {
                out.push(obj.clone());
            }
        }
        Ok(out)
    }
}

impl ConfigStore for MemoryStorage {
    fn config(&self) -> Result<Config, OdbError> {
        Ok(self.config.lock().expect("config lock").clone())
    }

    fn set_config(&self, config: &Config) -> Result<(), OdbError> {
        *self.config.lock().expect("config lock") = config.clone();
        Ok(())
    }
}

impl Storage for MemoryStorage {
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

/// In-memory reference store.
#[derive(Default)]
pub struct MemRefStore {
    refs: RwLock<HashMap<RefName, Reference>>,
}

impl RefStore for MemRefStore {
    fn get(&self, name: &RefName) -> Result<Reference, RefError> {
        self.refs
            .read()
            .expect("ref map lock")
            .get(name)
            .cloned()
            .ok_or_else(|| RefError::NotFound(name.to_string()))
    }

    fn set(&self, reference: &Reference) -> Result<(), RefError> {
        self.refs
            .write()
            .expect("ref map lock")
            .insert(reference.name().clone(), reference.clone());
        Ok(())
    }

    fn remove(&self, name: &RefName) -> Result<(), RefError> {
        self.refs.write().expect("ref map lock").remove(name);
        Ok(())
    }

    fn iter(&self, cancel: &CancelToken) -> Result<Vec<Reference>, RefError> {
        if cancel.is_canceled() {
            return Err(RefError::Canceled);
        }
        Ok(self.refs.read().expect("ref map lock").values().cloned().collect())
    }
}
