use std::cmp::Ordering;

use bstr::{BStr, BString, ByteSlice};
use grit_hash::{ObjectId, HASH_LEN};

use crate::ObjectError;

/// File mode for tree entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Subdirectory (40000)
    Tree,
    /// Regular file (100644)
    Regular,
    /// Group-writable regular file (100664, deprecated but still decoded)
    Deprecated,
    /// Executable file (100755)
    Executable,
    /// Symbolic link (120000)
    Symlink,
    /// Submodule commit reference (160000)
    Submodule,
}

impl FileMode {
    /// Parse from octal ASCII bytes (e.g. `b"100644"`).
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        let raw = parse_octal(s)
            .ok_or_else(|| ObjectError::InvalidFileMode(String::from_utf8_lossy(s).into()))?;
        Self::from_raw(raw)
            .ok_or_else(|| ObjectError::InvalidFileMode(String::from_utf8_lossy(s).into()))
    }

    /// Create from the raw numeric value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0o040000 => Some(Self::Tree),
            0o100644 => Some(Self::Regular),
            0o100664 => Some(Self::Deprecated),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o160000 => Some(Self::Submodule),
            _ => None,
        }
    }

    /// The raw numeric value.
    pub fn raw(&self) -> u32 {
        match self {
            Self::Tree => 0o40000,
            Self::Regular => 0o100644,
            Self::Deprecated => 0o100664,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Submodule => 0o160000,
        }
    }

    /// Serialize to octal ASCII (git's canonical format, no leading zero
    /// for trees).
    pub fn as_bytes(&self) -> BString {
        BString::from(format!("{:o}", self.raw()))
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree)
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::Regular | Self::Deprecated | Self::Executable)
    }

    /// Mode equivalence for diffing: the deprecated group-writable mode is
    /// the same content type as a regular file.
    pub fn is_equivalent(&self, other: &FileMode) -> bool {
        self == other
            || matches!(
                (self, other),
                (Self::Regular, Self::Deprecated) | (Self::Deprecated, Self::Regular)
            )
    }
}

fn parse_octal(s: &[u8]) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut val: u32 = 0;
    for &b in s {
        if !(b'0'..=b'7').contains(&b) {
            return None;
        }
        val = val.checked_mul(8)?.checked_add(u32::from(b - b'0'))?;
    }
    Some(val)
}

/// A single entry in a git tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: BString,
    pub oid: ObjectId,
}

impl TreeEntry {
    /// Compare entries using git's tree sorting rule.
    ///
    /// After the common prefix, a directory name is compared as if it had a
    /// trailing `/`. This makes "foo" (dir) sort after "foo.c" but before
    /// "foo0".
    pub fn cmp_entries(a: &TreeEntry, b: &TreeEntry) -> Ordering {
        entry_name_compare(
            a.name.as_ref(),
            a.mode.is_tree(),
            b.name.as_ref(),
            b.mode.is_tree(),
        )
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::cmp_entries(self, other)
    }
}

/// Git's tree entry name comparison (C git's `base_name_compare`).
fn entry_name_compare(name1: &[u8], is_dir1: bool, name2: &[u8], is_dir2: bool) -> Ordering {
    let min_len = name1.len().min(name2.len());
    let cmp = name1[..min_len].cmp(&name2[..min_len]);
    if cmp != Ordering::Equal {
        return cmp;
    }
    // One name is a prefix of the other. The "next byte" of the shorter one
    // is NUL for files, '/' for directories.
    let c1 = if name1.len() > min_len {
        name1[min_len]
    } else if is_dir1 {
        b'/'
    } else {
        0
    };
    let c2 = if name2.len() > min_len {
        name2[min_len]
    } else if is_dir2 {
        b'/'
    } else {
        0
    };
    c1.cmp(&c2)
}

/// A git tree object — an ordered directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse tree payload from the binary format.
    ///
    /// Each entry is `<mode-octal> SP <name> NUL <raw-hash>`. Entry order is
    /// preserved exactly as decoded.
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < payload.len() {
            let space_pos = payload[pos..]
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "missing space after mode".into(),
                })?
                + pos;

            let mode =
                FileMode::from_bytes(&payload[pos..space_pos]).map_err(|_| {
                    ObjectError::InvalidTreeEntry {
                        offset: pos,
                        reason: "invalid mode".into(),
                    }
                })?;

            let name_start = space_pos + 1;
            let null_pos = payload[name_start..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| ObjectError::InvalidTreeEntry {
                    offset: name_start,
                    reason: "missing null after name".into(),
                })?
                + name_start;

            let name = BString::from(&payload[name_start..null_pos]);

            let oid_start = null_pos + 1;
            if oid_start + HASH_LEN > payload.len() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: oid_start,
                    reason: "truncated hash".into(),
                });
            }
            let oid = ObjectId::from_bytes(&payload[oid_start..oid_start + HASH_LEN])?;

            entries.push(TreeEntry { mode, name, oid });
            pos = oid_start + HASH_LEN;
        }

        Ok(Self { entries })
    }

    /// Serialize tree payload to the binary format, in canonical sort order.
    pub fn serialize_payload(&self) -> Vec<u8> {
        let mut sorted = self.entries.clone();
        sorted.sort();

        let mut out = Vec::new();
        for entry in &sorted {
            out.extend_from_slice(&entry.mode.as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.oid.as_bytes());
        }
        out
    }

    /// Sort entries in git canonical order.
    pub fn sort(&mut self) {
        self.entries.sort();
    }

    /// Look up an entry by name.
    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bstr() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
