//! The upload-pack request: wants, haves, shallow state, and depth.

use std::collections::HashSet;
use std::io::Write;

use grit_hash::ObjectId;

use crate::capability::Capabilities;
use crate::pktline::Encoder;
use crate::ProtocolError;

/// How deep a shallow fetch should reach.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Depth {
    /// Full history.
    #[default]
    Full,
    /// At most this many commits from each want (`deepen <n>`).
    Commits(u32),
    /// Commits newer than a Unix timestamp (`deepen-since <secs>`).
    Since(i64),
    /// Exclude commits reachable from a ref (`deepen-not <ref>`).
    Not(String),
}

/// A fetch request to git-upload-pack.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// Hashes the client wants. At least one; duplicates are invalid.
    pub wants: Vec<ObjectId>,
    /// Hashes the client already has.
    pub haves: Vec<ObjectId>,
    /// Commits the client already has as shallow boundaries.
    pub shallows: Vec<ObjectId>,
    pub depth: Depth,
}

impl UploadRequest {
    pub fn new(wants: impl IntoIterator<Item = ObjectId>) -> Self {
        Self {
            wants: wants.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Check the request before any bytes go out.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.wants.is_empty() {
            return Err(ProtocolError::InvalidRequest("no wants".into()));
        }
        let mut seen = HashSet::new();
        for want in &self.wants {
            if want.is_null() {
                return Err(ProtocolError::InvalidRequest("null hash in wants".into()));
            }
            if !seen.insert(*want) {
                return Err(ProtocolError::InvalidRequest(format!(
                    "duplicate want {want}"
                )));
            }
        }
        Ok(())
    }

    /// Encode the request lines.
    ///
    /// Layout: `want` lines (the first carrying `capabilities`), `shallow`
    /// lines, at most one deepen line, flush; then `have` lines and a
    /// flush if any; then `done`.
    pub fn encode(
        &self,
        writer: impl Write,
        capabilities: &Capabilities,
    ) -> Result<(), ProtocolError> {
        self.validate()?;
        let mut enc = Encoder::new(writer);

        for (i, want) in self.wants.iter().enumerate() {
            if i == 0 && !capabilities.is_empty() {
                enc.write_text(&format!("want {want} {capabilities}"))?;
            } else {
                enc.write_text(&format!("want {want}"))?;
            }
        }

        for shallow in &self.shallows {
            enc.write_text(&format!("shallow {shallow}"))?;
        }

        match &self.depth {
            Depth::Full => {}
            Depth::Commits(n) => enc.write_text(&format!("deepen {n}"))?,
            Depth::Since(secs) => enc.write_text(&format!("deepen-since {secs}"))?,
            Depth::Not(reference) => enc.write_text(&format!("deepen-not {reference}"))?,
        }

        enc.write_flush()?;

        if !self.haves.is_empty() {
            for have in &self.haves {
                enc.write_text(&format!("have {have}"))?;
            }
            enc.write_flush()?;
        }

        enc.write_text("done")?;
        enc.flush()?;
        Ok(())
    }
}
