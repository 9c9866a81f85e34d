use std::fs;
use std::io::Read;

use flate2::read::ZlibDecoder;
use grit_hash::{Hasher, ObjectId};
use grit_object::{header, ObjectType};

use crate::{LooseError, LooseStore};

impl LooseStore {
    /// Does a loose object exist for this OID?
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.object_path(oid).is_file()
    }

    /// Read a loose object by OID, returning its kind and raw payload.
    ///
    /// Returns `Ok(None)` if the object does not exist; an absent file is an
    /// expected condition here, not an error. A present but undecodable
    /// file is an error.
    pub fn read(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, LooseError> {
        let Some(decompressed) = self.read_raw(oid)? else {
            return Ok(None);
        };
        let (obj_type, size, header_len) = header::parse_header(&decompressed)?;
        let payload = &decompressed[header_len..];
        if payload.len() != size {
            return Err(LooseError::Corrupt {
                oid: oid.to_hex(),
                reason: format!("declared size {size}, payload is {}", payload.len()),
            });
        }
        Ok(Some((obj_type, payload.to_vec())))
    }

    /// Read just the kind and declared size without inflating the payload.
    pub fn read_header(
        &self,
        oid: &ObjectId,
    ) -> Result<Option<(ObjectType, usize)>, LooseError> {
        let path = self.object_path(oid);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        // Inflate only enough to see the header. Headers are tiny; 64 bytes
        // is plenty.
        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut buf = [0u8; 64];
        let mut filled = 0;
        loop {
            if filled >= buf.len() {
                return Err(LooseError::Corrupt {
                    oid: oid.to_hex(),
                    reason: "header exceeds 64 bytes".into(),
                });
            }
            let n = decoder
                .read(&mut buf[filled..])
                .map_err(|e| LooseError::Decompress {
                    oid: oid.to_hex(),
                    source: e,
                })?;
            if n == 0 {
                return Err(LooseError::Corrupt {
                    oid: oid.to_hex(),
                    reason: "EOF before header null terminator".into(),
                });
            }
            filled += n;
            if buf[..filled].contains(&0) {
                break;
            }
        }

        let (obj_type, size, _header_len) = header::parse_header(&buf[..filled])?;
        Ok(Some((obj_type, size)))
    }

    /// Read a loose object and verify the inflated bytes hash to the OID.
    ///
    /// Fails with `HashMismatch` when the content disagrees with its name.
    pub fn read_verified(
        &self,
        oid: &ObjectId,
    ) -> Result<Option<(ObjectType, Vec<u8>)>, LooseError> {
        let Some(decompressed) = self.read_raw(oid)? else {
            return Ok(None);
        };

        let actual = Hasher::digest(&decompressed)?;
        if actual != *oid {
            return Err(LooseError::HashMismatch {
                path: self.object_path(oid),
                expected: oid.to_hex(),
                actual: actual.to_hex(),
            });
        }

        let (obj_type, size, header_len) = header::parse_header(&decompressed)?;
        let payload = &decompressed[header_len..];
        if payload.len() != size {
            return Err(LooseError::Corrupt {
                oid: oid.to_hex(),
                reason: format!("declared size {size}, payload is {}", payload.len()),
            });
        }
        Ok(Some((obj_type, payload.to_vec())))
    }

    /// Inflate the full header+payload bytes, or `None` when absent.
    fn read_raw(&self, oid: &ObjectId) -> Result<Option<Vec<u8>>, LooseError> {
        let path = self.object_path(oid);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| LooseError::Decompress {
                oid: oid.to_hex(),
                source: e,
            })?;
        Ok(Some(decompressed))
    }
}
