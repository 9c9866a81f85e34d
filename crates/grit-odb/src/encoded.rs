//! The encoded object: kind + size + payload, identity derived from content.

use grit_hash::{Hasher, ObjectId};
use grit_object::{Object, ObjectType};

use crate::OdbError;

/// An object as storage sees it: a kind, a declared size, and payload
/// bytes.
///
/// The hash is always computed from the canonical encoding
/// (`"<kind> <size>\0<payload>"`), never cached across mutation — any
/// change to kind or payload changes the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedObject {
    kind: ObjectType,
    payload: Vec<u8>,
}

impl EncodedObject {
    /// A fresh, empty, writable object of the given kind.
    pub fn new(kind: ObjectType) -> Self {
        Self {
            kind,
            payload: Vec::new(),
        }
    }

    /// Wrap an existing payload.
    pub fn from_payload(kind: ObjectType, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// Encode a typed object.
    pub fn from_object(obj: &Object) -> Self {
        Self {
            kind: obj.object_type(),
            payload: obj.serialize_payload(),
        }
    }

    pub fn kind(&self) -> ObjectType {
        self.kind
    }

    pub fn set_kind(&mut self, kind: ObjectType) {
        self.kind = kind;
    }

    /// Declared size in bytes (the payload length).
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Replace the payload wholesale.
    pub fn set_payload(&mut self, payload: Vec<u8>) {
        self.payload = payload;
    }

    /// The content address of this object.
    pub fn hash(&self) -> Result<ObjectId, OdbError> {
        Ok(Hasher::hash_object(self.kind.as_str(), &self.payload)?)
    }

    /// Parse into the typed object model.
    pub fn decode(&self) -> Result<Object, OdbError> {
        Ok(Object::parse_payload(self.kind, &self.payload)?)
    }
}

impl std::io::Write for EncodedObject {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.payload.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
