//! The initial reference advertisement (protocol v1).
//!
//! Shape on the wire, one pkt-line each:
//!
//! ```text
//! # service=git-upload-pack      (smart-HTTP preamble, optional)
//! 0000                           (flush after the preamble)
//! <hash> HEAD\0<capabilities>
//! <hash> refs/heads/master
//! <hash> refs/tags/v1.0
//! <hash> refs/tags/v1.0^{}      (peeled annotated tag)
//! shallow <hash>
//! 0000
//! ```
//!
//! An empty repository advertises a single line with the zero hash and the
//! pseudo-ref `capabilities^{}` — a sentinel, not an error; capabilities
//! are still captured.

use std::io::{Read, Write};

use bstr::{BString, ByteSlice};
use grit_hash::ObjectId;

use crate::capability::Capabilities;
use crate::pktline::{Encoder, PktLine, Scanner};
use crate::ProtocolError;

/// A decoded reference advertisement.
#[derive(Debug, Clone, Default)]
pub struct AdvRefs {
    pub capabilities: Capabilities,
    /// Advertised refs in wire order (`HEAD` first when present).
    pub references: Vec<(BString, ObjectId)>,
    /// Peeled targets of annotated tags (`<name>^{}` lines).
    pub peeled: Vec<(BString, ObjectId)>,
    /// Shallow boundary hashes.
    pub shallows: Vec<ObjectId>,
    /// True when the remote advertised the empty-repository sentinel.
    pub empty_repo: bool,
}

impl AdvRefs {
    /// Decode an advertisement from pkt-lines up to the terminating flush.
    pub fn decode(reader: impl Read) -> Result<Self, ProtocolError> {
        let mut scanner = Scanner::new(reader);
        let mut adv = AdvRefs::default();
        let mut first_ref_line = true;

        loop {
            let line = match scanner.read_pkt()? {
                PktLine::Flush => {
                    if first_ref_line {
                        // A flush before any ref line: smart-HTTP preamble
                        // terminator, or a bare empty advertisement.
                        continue;
                    }
                    break;
                }
                PktLine::Delim => {
                    return Err(ProtocolError::Protocol(
                        "unexpected delimiter in advertisement".into(),
                    ))
                }
                PktLine::Data(data) => data,
            };

            let line = trim_newline(&line);
            if line.is_empty() {
                continue;
            }

            // Smart-HTTP service preamble.
            if line.starts_with(b"#") {
                continue;
            }

            if let Some(rest) = line.strip_prefix(b"shallow ") {
                adv.shallows.push(parse_hash(rest)?);
                continue;
            }

            if first_ref_line {
                first_ref_line = false;
                let (ref_part, caps_part) = match line.find_byte(0) {
                    Some(nul) => (&line[..nul], &line[nul + 1..]),
                    None => (line, &[][..]),
                };
                adv.capabilities =
                    Capabilities::decode(&String::from_utf8_lossy(caps_part));

                let (hash, name) = parse_ref_line(ref_part)?;
                if hash.is_null() && name == "capabilities^{}" {
                    adv.empty_repo = true;
                } else {
                    adv.push_ref(name, hash);
                }
                continue;
            }

            let (hash, name) = parse_ref_line(line)?;
            adv.push_ref(name, hash);
        }

        // EOF-before-flush lands as a Protocol error from the scanner, so
        // reaching here means the advertisement was well terminated.
        Ok(adv)
    }

    /// Encode the advertisement; the inverse of [`AdvRefs::decode`].
    pub fn encode(&self, writer: impl Write) -> Result<(), ProtocolError> {
        let mut enc = Encoder::new(writer);

        if self.references.is_empty() {
            let line = format!("{} capabilities^{{}}\0{}", ObjectId::NULL, self.capabilities);
            enc.write_text(&line)?;
        } else {
            for (i, (name, hash)) in self.references.iter().enumerate() {
                if i == 0 {
                    enc.write_text(&format!("{hash} {name}\0{}", self.capabilities))?;
                } else {
                    enc.write_text(&format!("{hash} {name}"))?;
                }
                if let Some((_, peeled)) = self.peeled.iter().find(|(n, _)| n == name) {
                    enc.write_text(&format!("{peeled} {name}^{{}}"))?;
                }
            }
        }

        for shallow in &self.shallows {
            enc.write_text(&format!("shallow {shallow}"))?;
        }
        enc.write_flush()?;
        Ok(())
    }

    /// Look up an advertised ref by name.
    pub fn reference(&self, name: &str) -> Option<ObjectId> {
        self.references
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, hash)| *hash)
    }

    /// Is there nothing to fetch here?
    pub fn is_empty(&self) -> bool {
        self.empty_repo || self.references.is_empty()
    }

    fn push_ref(&mut self, name: BString, hash: ObjectId) {
        if let Some(base) = name.strip_suffix(b"^{}") {
            self.peeled.push((BString::from(base), hash));
        } else {
            self.references.push((name, hash));
        }
    }
}

fn trim_newline(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\n') => &line[..line.len() - 1],
        _ => line,
    }
}

fn parse_hash(bytes: &[u8]) -> Result<ObjectId, ProtocolError> {
    let hex = std::str::from_utf8(bytes)
        .map_err(|_| ProtocolError::Protocol("non-UTF-8 hash".into()))?;
    Ok(ObjectId::from_hex(hex.trim())?)
}

fn parse_ref_line(line: &[u8]) -> Result<(ObjectId, BString), ProtocolError> {
    let space = line.find_byte(b' ').ok_or_else(|| {
        ProtocolError::Protocol(format!(
            "malformed ref line: {}",
            String::from_utf8_lossy(line)
        ))
    })?;
    let hash = parse_hash(&line[..space])?;
    let name = BString::from(&line[space + 1..]);
    if name.is_empty() {
        return Err(ProtocolError::Protocol("empty ref name".into()));
    }
    Ok((hash, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HASH1: &str = "95d09f2b10159347eece71399a7e2e907ea3df4f";
    const HASH2: &str = "6ecf0ef2c2dffb796033e5a02219af86ec6584e5";

    fn encode_lines(lines: &[&str], with_flush: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        for line in lines {
            enc.write_text(line).unwrap();
        }
        if with_flush {
            enc.write_flush().unwrap();
        }
        buf
    }

    #[test]
    fn decode_simple_advertisement() {
        let buf = encode_lines(
            &[
                &format!("{HASH1} HEAD\0multi_ack ofs-delta symref=HEAD:refs/heads/main agent=git/2.39.0"),
                &format!("{HASH1} refs/heads/main"),
                &format!("{HASH2} refs/tags/v1.0"),
            ],
            true,
        );

        let adv = AdvRefs::decode(Cursor::new(buf)).unwrap();
        assert!(!adv.is_empty());
        assert_eq!(adv.references.len(), 3);
        assert_eq!(adv.references[0].0, "HEAD");
        assert_eq!(adv.reference("refs/tags/v1.0").unwrap().to_hex(), HASH2);
        assert!(adv.capabilities.supports("ofs-delta"));
        assert_eq!(
            adv.capabilities.get("symref"),
            Some("HEAD:refs/heads/main")
        );
    }

    #[test]
    fn decode_empty_repository_sentinel() {
        let buf = encode_lines(
            &[&format!(
                "{} capabilities^{{}}\0multi_ack thin-pack agent=git/2.39.0",
                ObjectId::NULL
            )],
            true,
        );

        let adv = AdvRefs::decode(Cursor::new(buf)).unwrap();
        assert!(adv.empty_repo);
        assert!(adv.is_empty());
        assert!(adv.references.is_empty());
        // Capabilities are still captured.
        assert!(adv.capabilities.supports("thin-pack"));
        assert_eq!(adv.capabilities.get("agent"), Some("git/2.39.0"));
    }

    #[test]
    fn decode_with_service_preamble() {
        let mut buf = Vec::new();
        {
            let mut enc = Encoder::new(&mut buf);
            enc.write_text("# service=git-upload-pack").unwrap();
            enc.write_flush().unwrap();
        }
        buf.extend(encode_lines(
            &[&format!("{HASH1} HEAD\0agent=git/2.39.0")],
            true,
        ));

        let adv = AdvRefs::decode(Cursor::new(buf)).unwrap();
        assert_eq!(adv.references.len(), 1);
        assert_eq!(adv.capabilities.get("agent"), Some("git/2.39.0"));
    }

    #[test]
    fn decode_peeled_and_shallow_lines() {
        let buf = encode_lines(
            &[
                &format!("{HASH1} HEAD\0agent=git/2.39.0"),
                &format!("{HASH1} refs/tags/v1.0"),
                &format!("{HASH2} refs/tags/v1.0^{{}}"),
                &format!("shallow {HASH2}"),
            ],
            true,
        );

        let adv = AdvRefs::decode(Cursor::new(buf)).unwrap();
        assert_eq!(adv.references.len(), 2);
        assert_eq!(adv.peeled.len(), 1);
        assert_eq!(adv.peeled[0].0, "refs/tags/v1.0");
        assert_eq!(adv.peeled[0].1.to_hex(), HASH2);
        assert_eq!(adv.shallows, vec![ObjectId::from_hex(HASH2).unwrap()]);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let buf = encode_lines(
            &[
                &format!("{HASH1} HEAD\0multi_ack ofs-delta agent=git/2.39.0"),
                &format!("{HASH1} refs/heads/main"),
                &format!("{HASH2} refs/tags/v1.0"),
                &format!("{HASH2} refs/tags/v1.0^{{}}"),
                &format!("shallow {HASH1}"),
            ],
            true,
        );
        let adv = AdvRefs::decode(Cursor::new(buf)).unwrap();

        let mut encoded = Vec::new();
        adv.encode(&mut encoded).unwrap();
        let again = AdvRefs::decode(Cursor::new(encoded)).unwrap();

        assert_eq!(again.references, adv.references);
        assert_eq!(again.peeled, adv.peeled);
        assert_eq!(again.shallows, adv.shallows);
        assert_eq!(again.capabilities.to_string(), adv.capabilities.to_string());
    }

    #[test]
    fn empty_repo_encode_roundtrip() {
        let mut adv = AdvRefs {
            empty_repo: true,
            ..Default::default()
        };
        adv.capabilities.set("agent", Some("grit/0.1"));

        let mut buf = Vec::new();
        adv.encode(&mut buf).unwrap();
        let again = AdvRefs::decode(Cursor::new(buf)).unwrap();
        assert!(again.empty_repo);
        assert_eq!(again.capabilities.get("agent"), Some("grit/0.1"));
    }

    #[test]
    fn malformed_ref_line_rejected() {
        let buf = encode_lines(&["nonsense-without-space"], true);
        assert!(AdvRefs::decode(Cursor::new(buf)).is_err());
    }

    #[test]
    fn truncated_advertisement_rejected() {
        // No terminating flush.
        let buf = encode_lines(&[&format!("{HASH1} HEAD\0agent=git/2.39.0")], false);
        assert!(AdvRefs::decode(Cursor::new(buf)).is_err());
    }
}
