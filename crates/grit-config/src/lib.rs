//! The git-config INI variant, reduced to what the engine consumes:
//! `[core]` settings and `[remote "name"]` url/fetch pairs.
//!
//! Parsing preserves section and key order so a loaded file can be
//! serialized back without shuffling unrelated entries.

mod parse;

pub use parse::{parse, serialize};

use bstr::BString;

/// Errors produced by config operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One `[section]` or `[section "subsection"]` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Lowercased section name.
    pub name: String,
    /// Case-preserved subsection (the quoted part).
    pub subsection: Option<String>,
    /// Key/value pairs in file order. A key with no `=` has value "true".
    pub entries: Vec<(String, BString)>,
}

impl Section {
    /// The last value for a key (git semantics: later wins). Multi-valued
    /// keys go through `values`.
    pub fn value(&self, key: &str) -> Option<&BString> {
        let key = key.to_ascii_lowercase();
        self.entries.iter().rev().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// All values for a key, in file order.
    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a BString> {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(move |(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

/// A parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub sections: Vec<Section>,
}

impl Config {
    /// Parse from raw bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ConfigError> {
        parse(data)
    }

    /// Serialize back to the INI form.
    pub fn to_bytes(&self) -> Vec<u8> {
        serialize(self)
    }

    /// Find a section by name (and optional subsection).
    pub fn section(&self, name: &str, subsection: Option<&str>) -> Option<&Section> {
        let name = name.to_ascii_lowercase();
        self.sections
            .iter()
            .find(|s| s.name == name && s.subsection.as_deref() == subsection)
    }

    /// Mutable access, creating the section if absent.
    pub fn section_mut(&mut self, name: &str, subsection: Option<&str>) -> &mut Section {
        let name = name.to_ascii_lowercase();
        let pos = self
            .sections
            .iter()
            .position(|s| s.name == name && s.subsection.as_deref() == subsection);
        match pos {
            Some(i) => &mut self.sections[i],
            None => {
                self.sections.push(Section {
                    name,
                    subsection: subsection.map(str::to_owned),
                    entries: Vec::new(),
                });
                self.sections.last_mut().expect("just pushed")
            }
        }
    }

    /// A `[core]` value.
    pub fn core(&self, key: &str) -> Option<&BString> {
        self.section("core", None).and_then(|s| s.value(key))
    }

    /// The remote with the given name, if configured with a url.
    pub fn remote(&self, name: &str) -> Result<RemoteConfig, ConfigError> {
        let section = self
            .section("remote", Some(name))
            .ok_or_else(|| ConfigError::RemoteNotFound(name.into()))?;
        let url = section
            .value("url")
            .ok_or_else(|| ConfigError::RemoteNotFound(name.into()))?;
        Ok(RemoteConfig {
            name: name.to_owned(),
            url: url.clone(),
            fetch: section.values("fetch").cloned().collect(),
        })
    }

    /// All configured remotes that carry a url.
    pub fn remotes(&self) -> Vec<RemoteConfig> {
        self.sections
            .iter()
            .filter(|s| s.name == "remote")
            .filter_map(|s| {
                let name = s.subsection.clone()?;
                let url = s.value("url")?.clone();
                Some(RemoteConfig {
                    name,
                    url,
                    fetch: s.values("fetch").cloned().collect(),
                })
            })
            .collect()
    }

    /// Insert or replace a remote's url and fetch refspecs.
    pub fn set_remote(&mut self, remote: &RemoteConfig) {
        let section = self.section_mut("remote", Some(&remote.name));
        section.entries.retain(|(k, _)| k != "url" && k != "fetch");
        section.entries.push(("url".into(), remote.url.clone()));
        for fetch in &remote.fetch {
            section.entries.push(("fetch".into(), fetch.clone()));
        }
    }
}

/// A `[remote "name"]` block as the engine's consumers see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub name: String,
    pub url: BString,
    /// Fetch refspecs, in file order.
    pub fetch: Vec<BString>,
}
