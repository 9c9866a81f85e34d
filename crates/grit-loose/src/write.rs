use std::fs;
use std::io::Write;

use flate2::write::ZlibEncoder;
use grit_hash::{Hasher, ObjectId};
use grit_object::{header, ObjectType};
use grit_utils::tempfile::TempFile;

use crate::{LooseError, LooseStore};

impl LooseStore {
    /// Write an object, returning its OID.
    ///
    /// Writes are content-addressed and idempotent: if the object already
    /// exists this is a no-op. The file lands via temp file + fsync +
    /// rename, so readers only ever see complete objects; the temp file is
    /// removed on any early exit.
    pub fn write(&self, obj_type: ObjectType, payload: &[u8]) -> Result<ObjectId, LooseError> {
        let hdr = header::write_header(obj_type, payload.len());

        let oid = {
            let mut hasher = Hasher::new();
            hasher.update(&hdr);
            hasher.update(payload);
            hasher.finalize()?
        };

        if self.contains(&oid) {
            return Ok(oid);
        }

        let final_path = self.object_path(&oid);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = TempFile::new_for(&final_path)
            .map_err(|e| LooseError::Io(std::io::Error::other(e.to_string())))?;
        {
            let mut encoder = ZlibEncoder::new(&mut tmp, self.compression);
            encoder.write_all(&hdr)?;
            encoder.write_all(payload)?;
            encoder.finish()?;
        }
        tmp.sync_all()?;

        match tmp.persist(&final_path) {
            Ok(()) => Ok(oid),
            // Another writer landed the same content first; that is success.
            Err(_) if final_path.exists() => Ok(oid),
            Err(e) => Err(LooseError::Io(std::io::Error::other(e.to_string()))),
        }
    }
}
