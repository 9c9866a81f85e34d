use bstr::{BStr, BString, ByteSlice};
use grit_hash::ObjectId;
use grit_utils::date::Signature;

use crate::ObjectError;

/// A git commit object.
///
/// Unknown header keys (including `mergetag`) are preserved verbatim in
/// `extra_headers`, in source order, so a decode/encode round trip
/// reproduces the original bytes and therefore the original hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// OID of the root tree.
    pub tree: ObjectId,
    /// Parent commit OIDs, in order (empty for a root commit).
    pub parents: Vec<ObjectId>,
    /// Author identity and timestamp.
    pub author: Signature,
    /// Committer identity and timestamp.
    pub committer: Signature,
    /// Optional encoding header (e.g. "ISO-8859-1").
    pub encoding: Option<BString>,
    /// Extra headers (mergetag and friends), preserved for round-trip.
    pub extra_headers: Vec<(BString, BString)>,
    /// Optional detached signature (the `gpgsig` header, multi-line).
    pub gpgsig: Option<BString>,
    /// Commit message: everything after the blank separator line.
    pub message: BString,
}

impl Commit {
    /// Parse commit payload from raw bytes (no object header).
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut tree: Option<ObjectId> = None;
        let mut parents = Vec::new();
        let mut author: Option<Signature> = None;
        let mut committer: Option<Signature> = None;
        let mut encoding: Option<BString> = None;
        let mut gpgsig: Option<BString> = None;
        let mut extra_headers: Vec<(BString, BString)> = Vec::new();

        let data = payload;
        let mut pos = 0;

        loop {
            if pos >= data.len() {
                break; // no message, which is legal if unusual
            }
            if data[pos] == b'\n' {
                pos += 1;
                break;
            }

            let line_end = data[pos..]
                .find_byte(b'\n')
                .map(|p| p + pos)
                .unwrap_or(data.len());
            let line = &data[pos..line_end];

            let Some(space_pos) = line.find_byte(b' ') else {
                // A keyless line before the separator is tolerated and skipped.
                pos = line_end + 1;
                continue;
            };
            let key = &line[..space_pos];
            let value = &line[space_pos + 1..];

            match key {
                b"tree" => {
                    tree = Some(parse_oid_value(value, "tree")?);
                    pos = line_end + 1;
                }
                b"parent" => {
                    parents.push(parse_oid_value(value, "parent")?);
                    pos = line_end + 1;
                }
                b"author" => {
                    author = Some(parse_signature(value)?);
                    pos = line_end + 1;
                }
                b"committer" => {
                    committer = Some(parse_signature(value)?);
                    pos = line_end + 1;
                }
                b"encoding" => {
                    encoding = Some(BString::from(value));
                    pos = line_end + 1;
                }
                b"gpgsig" => {
                    let (sig, next) = read_continued_value(data, value, line_end);
                    gpgsig = Some(sig);
                    pos = next;
                }
                _ => {
                    // Unknown header: preserve key and (possibly multi-line)
                    // value for re-emission.
                    let (val, next) = read_continued_value(data, value, line_end);
                    extra_headers.push((BString::from(key), val));
                    pos = next;
                }
            }
        }

        let tree = tree.ok_or(ObjectError::MissingCommitField { field: "tree" })?;
        let author = author.ok_or(ObjectError::MissingCommitField { field: "author" })?;
        let committer =
            committer.ok_or(ObjectError::MissingCommitField { field: "committer" })?;

        Ok(Self {
            tree,
            parents,
            author,
            committer,
            encoding,
            extra_headers,
            gpgsig,
            message: BString::from(&data[pos.min(data.len())..]),
        })
    }

    /// Serialize commit payload (no object header).
    ///
    /// Header order is canonical: `tree`, `parent*`, `author`, `committer`,
    /// `encoding?`, extra headers in source order, `gpgsig?`, blank line,
    /// message.
    pub fn serialize_payload(&self) -> Vec<u8> {
        self.serialize_inner(true)
    }

    /// Serialize with the `gpgsig` header omitted.
    ///
    /// This is the payload a signer signs and a verifier checks; all other
    /// headers, including `mergetag`, remain in place.
    pub fn serialize_without_signature(&self) -> Vec<u8> {
        self.serialize_inner(false)
    }

    fn serialize_inner(&self, with_signature: bool) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(b"tree ");
        out.extend_from_slice(self.tree.to_hex().as_bytes());
        out.push(b'\n');

        for parent in &self.parents {
            out.extend_from_slice(b"parent ");
            out.extend_from_slice(parent.to_hex().as_bytes());
            out.push(b'\n');
        }

        out.extend_from_slice(b"author ");
        out.extend_from_slice(&self.author.to_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"committer ");
        out.extend_from_slice(&self.committer.to_bytes());
        out.push(b'\n');

        if let Some(ref enc) = self.encoding {
            out.extend_from_slice(b"encoding ");
            out.extend_from_slice(enc);
            out.push(b'\n');
        }

        for (key, val) in &self.extra_headers {
            out.extend_from_slice(key);
            out.push(b' ');
            write_continued_value(&mut out, val);
        }

        if with_signature {
            if let Some(ref sig) = self.gpgsig {
                out.extend_from_slice(b"gpgsig ");
                write_continued_value(&mut out, sig);
            }
        }

        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    /// The first parent, if any.
    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    /// More than one parent?
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// No parents?
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// The first line of the message.
    pub fn summary(&self) -> &BStr {
        let msg: &[u8] = self.message.as_ref();
        match msg.find_byte(b'\n') {
            Some(pos) => BStr::new(&msg[..pos]),
            None => BStr::new(msg),
        }
    }
}

/// Read a multi-line header value: continuation lines start with a space.
/// Returns the assembled value and the position after the last line read.
fn read_continued_value(data: &[u8], first: &[u8], line_end: usize) -> (BString, usize) {
    let mut val = Vec::from(first);
    let mut next = line_end + 1;
    while next < data.len() && data[next] == b' ' {
        val.push(b'\n');
        let cont_end = data[next..]
            .find_byte(b'\n')
            .map(|p| p + next)
            .unwrap_or(data.len());
        val.extend_from_slice(&data[next + 1..cont_end]);
        next = cont_end + 1;
    }
    (BString::from(val), next)
}

/// Write a multi-line header value with space-prefixed continuation lines.
fn write_continued_value(out: &mut Vec<u8>, val: &[u8]) {
    for (i, line) in val.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            out.push(b'\n');
            out.push(b' ');
        }
        out.extend_from_slice(line);
    }
    out.push(b'\n');
}

fn parse_oid_value(value: &[u8], field: &'static str) -> Result<ObjectId, ObjectError> {
    let hex = std::str::from_utf8(value)
        .map_err(|_| ObjectError::InvalidHeader(format!("non-UTF8 {field} hash")))?;
    Ok(ObjectId::from_hex(hex)?)
}

fn parse_signature(data: &[u8]) -> Result<Signature, ObjectError> {
    Signature::parse(BStr::new(data))
        .map_err(|e| ObjectError::InvalidSignature(e.to_string()))
}
