use crate::ObjectError;

/// A git blob — raw file content with no internal structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        Ok(Self {
            data: payload.to_vec(),
        })
    }

    pub fn serialize_payload(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
