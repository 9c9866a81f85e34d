//! Reference names.

use std::fmt;

use crate::RefError;

/// A validated reference name: a slash-separated path such as
/// `refs/heads/master`, or a top-level name such as `HEAD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefName(String);

impl RefName {
    /// Validate and wrap a reference name.
    ///
    /// The rules are the subset of C git's check-ref-format the engine
    /// relies on: non-empty components, no `..`, no control characters or
    /// `space ~ ^ : ? * [ \`, no leading/trailing slash, no `.lock` or
    /// trailing dot.
    pub fn new(name: impl Into<String>) -> Result<Self, RefError> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Is this name acceptable as a symbolic ref target?
    pub fn is_valid_symref_target(&self) -> bool {
        self.0 == "HEAD" || self.0.starts_with("refs/")
    }

    /// The short human form: `refs/heads/master` → `master`.
    pub fn shorten(&self) -> &str {
        for prefix in ["refs/heads/", "refs/tags/", "refs/remotes/", "refs/"] {
            if let Some(short) = self.0.strip_prefix(prefix) {
                return short;
            }
        }
        &self.0
    }
}

fn validate(name: &str) -> Result<(), RefError> {
    let invalid = |reason: &str| Err(RefError::InvalidName(format!("'{name}': {reason}")));

    if name.is_empty() {
        return invalid("empty name");
    }
    if name.starts_with('/') || name.ends_with('/') {
        return invalid("leading or trailing slash");
    }
    if name.ends_with('.') || name.ends_with(".lock") {
        return invalid("forbidden suffix");
    }
    if name.contains("..") || name.contains("//") || name.contains("@{") {
        return invalid("forbidden sequence");
    }
    for component in name.split('/') {
        if component.is_empty() {
            return invalid("empty component");
        }
        if component.starts_with('.') {
            return invalid("component starts with dot");
        }
    }
    for b in name.bytes() {
        if b < 0x20 || b == 0x7f || b" ~^:?*[\\".contains(&b) {
            return invalid("forbidden character");
        }
    }
    Ok(())
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RefName {
    type Err = RefError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
