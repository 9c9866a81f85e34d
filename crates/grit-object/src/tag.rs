use bstr::{BStr, BString};
use grit_hash::ObjectId;
use grit_utils::date::Signature;

use crate::signing::split_signature;
use crate::{ObjectError, ObjectType};

/// A git annotated tag object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// OID of the tagged object.
    pub target: ObjectId,
    /// Kind of the tagged object.
    pub target_type: ObjectType,
    /// Tag name.
    pub name: BString,
    /// Tagger identity and timestamp (absent on some historical tags).
    pub tagger: Option<Signature>,
    /// Tag message, without any trailing signature block.
    pub message: BString,
    /// Optional detached signature block appended to the message.
    pub signature: Option<BString>,
}

impl Tag {
    /// Parse tag payload from raw bytes (no object header).
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut target: Option<ObjectId> = None;
        let mut target_type: Option<ObjectType> = None;
        let mut name: Option<BString> = None;
        let mut tagger: Option<Signature> = None;

        let data = payload;
        let mut pos = 0;

        loop {
            if pos >= data.len() {
                break;
            }
            if data[pos] == b'\n' {
                pos += 1;
                break;
            }

            let line_end = data[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| p + pos)
                .unwrap_or(data.len());
            let line = &data[pos..line_end];

            if let Some(space_pos) = line.iter().position(|&b| b == b' ') {
                let key = &line[..space_pos];
                let value = &line[space_pos + 1..];

                match key {
                    b"object" => {
                        let hex = std::str::from_utf8(value).map_err(|_| {
                            ObjectError::InvalidHeader("non-UTF8 target hash".into())
                        })?;
                        target = Some(ObjectId::from_hex(hex)?);
                    }
                    b"type" => {
                        target_type = Some(ObjectType::from_bytes(value)?);
                    }
                    b"tag" => {
                        name = Some(BString::from(value));
                    }
                    b"tagger" => {
                        tagger = Some(
                            Signature::parse(BStr::new(value))
                                .map_err(|e| ObjectError::InvalidSignature(e.to_string()))?,
                        );
                    }
                    _ => {} // unknown tag headers are skipped
                }
            }

            pos = line_end + 1;
        }

        let (message, signature) = split_signature(&data[pos.min(data.len())..]);

        let target = target.ok_or(ObjectError::MissingTagField { field: "object" })?;
        let target_type = target_type.ok_or(ObjectError::MissingTagField { field: "type" })?;
        let name = name.ok_or(ObjectError::MissingTagField { field: "tag" })?;

        Ok(Self {
            target,
            target_type,
            name,
            tagger,
            message: BString::from(message),
            signature: signature.map(BString::from),
        })
    }

    /// Serialize tag payload (no object header).
    pub fn serialize_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(b"object ");
        out.extend_from_slice(self.target.to_hex().as_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"type ");
        out.extend_from_slice(self.target_type.as_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"tag ");
        out.extend_from_slice(&self.name);
        out.push(b'\n');

        if let Some(ref tagger) = self.tagger {
            out.extend_from_slice(b"tagger ");
            out.extend_from_slice(&tagger.to_bytes());
            out.push(b'\n');
        }

        out.push(b'\n');
        out.extend_from_slice(&self.message);
        if let Some(ref sig) = self.signature {
            out.extend_from_slice(sig);
        }
        out
    }

    /// Serialize without the trailing signature block.
    pub fn serialize_without_signature(&self) -> Vec<u8> {
        let mut out = self.serialize_payload();
        if let Some(ref sig) = self.signature {
            out.truncate(out.len() - sig.len());
        }
        out
    }
}
