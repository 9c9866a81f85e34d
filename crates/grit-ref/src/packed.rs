//! The `packed-refs` file: a single sorted dump of references.
//!
//! Format:
//!
//! ```text
//! # pack-refs with: peeled fully-peeled sorted
//! <hex40> refs/heads/master
//! <hex40> refs/tags/v1.0
//! ^<hex40>
//! ```
//!
//! A `^` line carries the peeled target of the annotated tag on the
//! preceding line.

use std::fs;
use std::path::Path;

use grit_hash::ObjectId;
use grit_utils::lockfile::LockFile;

use crate::{RefError, RefName};

const HEADER: &str = "# pack-refs with: peeled fully-peeled sorted";

/// One packed reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedRef {
    pub name: RefName,
    pub target: ObjectId,
    /// For an annotated tag: the commit it ultimately points at.
    pub peeled: Option<ObjectId>,
}

/// The parsed `packed-refs` file.
#[derive(Debug, Clone, Default)]
pub struct PackedRefs {
    refs: Vec<PackedRef>,
}

impl PackedRefs {
    /// Load from the git directory; an absent file is an empty set.
    pub fn load(git_dir: &Path) -> Result<Self, RefError> {
        let path = git_dir.join("packed-refs");
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(RefError::Io(e)),
        };
        Self::parse(&data)
    }

    /// Parse the file content.
    pub fn parse(data: &[u8]) -> Result<Self, RefError> {
        let text = std::str::from_utf8(data).map_err(|_| RefError::PackedParse {
            line: 0,
            reason: "non-UTF-8 packed-refs".into(),
        })?;

        let mut refs: Vec<PackedRef> = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line_no = line_no + 1;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(peeled_hex) = line.strip_prefix('^') {
                let peeled =
                    ObjectId::from_hex(peeled_hex.trim()).map_err(|_| RefError::PackedParse {
                        line: line_no,
                        reason: "bad peeled hash".into(),
                    })?;
                let last = refs.last_mut().ok_or(RefError::PackedParse {
                    line: line_no,
                    reason: "peeled line without a preceding ref".into(),
                })?;
                last.peeled = Some(peeled);
                continue;
            }

            let (hex, name) = line.split_once(' ').ok_or(RefError::PackedParse {
                line: line_no,
                reason: "expected '<hash> <name>'".into(),
            })?;
            let target = ObjectId::from_hex(hex).map_err(|_| RefError::PackedParse {
                line: line_no,
                reason: "bad hash".into(),
            })?;
            let name = RefName::new(name.trim())?;
            refs.push(PackedRef {
                name,
                target,
                peeled: None,
            });
        }

        Ok(Self { refs })
    }

    /// Serialize, sorted by name, with the capability header.
    pub fn serialize(&self) -> Vec<u8> {
        let mut sorted: Vec<&PackedRef> = self.refs.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut out = Vec::new();
        out.extend_from_slice(HEADER.as_bytes());
        out.push(b'\n');
        for r in sorted {
            out.extend_from_slice(r.target.to_hex().as_bytes());
            out.push(b' ');
            out.extend_from_slice(r.name.as_str().as_bytes());
            out.push(b'\n');
            if let Some(peeled) = r.peeled {
                out.push(b'^');
                out.extend_from_slice(peeled.to_hex().as_bytes());
                out.push(b'\n');
            }
        }
        out
    }

    /// Write back to disk atomically under a lock.
    pub fn save(&self, git_dir: &Path) -> Result<(), RefError> {
        use std::io::Write;
        let path = git_dir.join("packed-refs");
        let mut lock = LockFile::acquire(&path)?;
        lock.write_all(&self.serialize())?;
        lock.commit()?;
        Ok(())
    }

    pub fn get(&self, name: &RefName) -> Option<&PackedRef> {
        self.refs.iter().find(|r| &r.name == name)
    }

    /// Remove an entry; reports whether it was present.
    pub fn remove(&mut self, name: &RefName) -> bool {
        let before = self.refs.len();
        self.refs.retain(|r| &r.name != name);
        self.refs.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackedRef> {
        self.refs.iter()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}
