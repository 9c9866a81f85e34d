//! Capability lists.
//!
//! Capabilities are an ordered set of `key` or `key=value` tokens carried
//! on the first line of the v1 advertisement (after a NUL) and on the
//! first `want` line of a request. Decoding preserves insertion order so
//! re-encoding reproduces the token sequence.

use std::fmt;

/// Capabilities the client side understands. Anything else a server
/// advertises is dropped before the advertisement reaches the caller.
pub const KNOWN_CAPABILITIES: &[&str] = &[
    "multi_ack",
    "multi_ack_detailed",
    "no-done",
    "thin-pack",
    "side-band",
    "side-band-64k",
    "ofs-delta",
    "agent",
    "symref",
    "shallow",
    "deepen-since",
    "deepen-not",
    "deepen-relative",
    "no-progress",
    "include-tag",
    "report-status",
    "delete-refs",
    "allow-tip-sha1-in-want",
    "allow-reachable-sha1-in-want",
];

/// One capability token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityEntry {
    pub name: String,
    pub value: Option<String>,
}

/// An ordered set of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    entries: Vec<CapabilityEntry>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a space-separated capability line.
    pub fn decode(line: &str) -> Self {
        let mut caps = Self::new();
        for token in line.split_whitespace() {
            match token.split_once('=') {
                Some((name, value)) => caps.set(name, Some(value)),
                None => caps.set(token, None),
            }
        }
        caps
    }

    /// Add a capability, keeping first-insertion order. A repeated name
    /// appends a second entry (some capabilities, like `symref`, may
    /// legally appear more than once).
    pub fn set(&mut self, name: &str, value: Option<&str>) {
        self.entries.push(CapabilityEntry {
            name: name.to_string(),
            value: value.map(str::to_string),
        });
    }

    /// Is the capability present?
    pub fn supports(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// The first value for a capability.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value.as_deref())
    }

    /// Every value for a capability that appears multiple times.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |e| e.name == name)
            .filter_map(|e| e.value.as_deref())
    }

    /// Delete every entry with this name.
    pub fn delete(&mut self, name: &str) {
        self.entries.retain(|e| e.name != name);
    }

    /// Keep only capabilities in `known`, preserving order.
    pub fn filter_known(&self, known: &[&str]) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|e| known.contains(&e.name.as_str()))
                .cloned()
                .collect(),
        }
    }

    pub fn entries(&self) -> &[CapabilityEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match &e.value {
                Some(v) => write!(f, "{}={}", e.name, v)?,
                None => f.write_str(&e.name)?,
            }
        }
        Ok(())
    }
}
