//! Streaming scan of the pack wire format.
//!
//! The scanner reads a pack stream in one pass: the 12-byte header, then
//! one entry after another (variable header, optional base reference, zlib
//! member), then the 20-byte trailer. Objects are yielded in file order.
//!
//! Every consumed byte up to the trailer feeds a running SHA-1 so
//! [`Scanner::finish`] can validate the trailer without a second pass, and
//! each entry's raw bytes feed a CRC32 for index construction. The scanner
//! tracks where each zlib member ends, so callers working over seekable
//! inputs know the exact extent of the compressed payload.

use std::io::{BufRead, Read};

use flate2::bufread::ZlibDecoder;
use grit_hash::ObjectId;

use crate::entry::read_entry_header;
use crate::{PackEntryType, PackError, PACK_SIGNATURE};

/// One object scanned out of a pack stream.
///
/// `data` is the inflated payload — for delta entries this is the delta
/// instruction stream, not the final object bytes.
#[derive(Debug, Clone)]
pub struct ScannedObject {
    /// Absolute offset of the entry header in the pack.
    pub offset: u64,
    pub entry_type: PackEntryType,
    /// Declared (and verified) inflated size.
    pub size: u64,
    /// Inflated payload, materialized.
    pub data: Vec<u8>,
    /// CRC32 of the raw entry bytes (header + compressed payload).
    pub crc32: u32,
    /// Absolute offset just past this entry's compressed payload.
    pub compressed_end: u64,
}

/// Streaming pack scanner over any byte source.
pub struct Scanner<R: Read> {
    input: PackInput<R>,
    version: u32,
    total: u32,
    remaining: u32,
}

impl<R: Read> std::fmt::Debug for Scanner<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("version", &self.version)
            .field("total", &self.total)
            .field("remaining", &self.remaining)
            .finish()
    }
}

impl<R: Read> Scanner<R> {
    /// Read and validate the pack header, leaving the scanner positioned at
    /// the first entry.
    pub fn new(source: R) -> Result<Self, PackError> {
        let mut input = PackInput::new(source);

        let mut header = [0u8; 12];
        input
            .read_exact(&mut header)
            .map_err(|_| PackError::Truncated("pack header".into()))?;

        if &header[0..4] != PACK_SIGNATURE {
            return Err(PackError::Malformed("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != 2 && version != 3 {
            return Err(PackError::UnsupportedVersion(version));
        }
        let total = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);

        Ok(Self {
            input,
            version,
            total,
            remaining: total,
        })
    }

    /// Pack format version (2 or 3).
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Declared object count.
    pub fn object_count(&self) -> u32 {
        self.total
    }

    /// Objects not yet scanned.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Scan the next object, or `None` after the last one.
    ///
    /// The payload is inflated and checked against the declared size before
    /// the entry is returned, so the stream is always positioned at the
    /// next entry header (or the trailer) afterwards.
    pub fn next_object(&mut self) -> Result<Option<ScannedObject>, PackError> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let offset = self.input.position();
        self.input.begin_crc();

        let (entry_type, size) = read_entry_header(&mut self.input, offset)?;

        let mut data = Vec::with_capacity(size.min(1 << 20) as usize);
        {
            let mut decoder = ZlibDecoder::new(&mut self.input);
            decoder
                .read_to_end(&mut data)
                .map_err(|_| PackError::CorruptEntry(offset))?;
        }
        if data.len() as u64 != size {
            return Err(PackError::CorruptEntry(offset));
        }

        let crc32 = self.input.take_crc();
        let compressed_end = self.input.position();
        self.remaining -= 1;

        Ok(Some(ScannedObject {
            offset,
            entry_type,
            size,
            data,
            crc32,
            compressed_end,
        }))
    }

    /// Consume the trailer and validate the running checksum against it.
    ///
    /// Must be called after the last object; returns the pack's SHA-1.
    pub fn finish(mut self) -> Result<ObjectId, PackError> {
        if self.remaining != 0 {
            return Err(PackError::Malformed(format!(
                "{} objects not yet scanned",
                self.remaining
            )));
        }

        let computed = self.input.digest()?;
        let mut trailer = [0u8; 20];
        self.input
            .read_exact(&mut trailer)
            .map_err(|_| PackError::Truncated("pack trailer".into()))?;
        let expected = ObjectId::from(trailer);

        if computed != expected {
            return Err(PackError::ChecksumMismatch {
                expected: expected.to_hex(),
                actual: computed.to_hex(),
            });
        }
        Ok(expected)
    }
}

/// Buffered pack input that hashes every consumed byte and can CRC one
/// entry at a time.
///
/// Hashing happens at the consume step, never on read-ahead, so buffered
/// bytes that have not been handed out are not yet part of the digest —
/// which is what lets [`Scanner::finish`] snapshot the digest before
/// pulling the trailer bytes.
struct PackInput<R> {
    inner: R,
    buf: Box<[u8; 64 * 1024]>,
    start: usize,
    end: usize,
    position: u64,
    sha: grit_hash::Hasher,
    crc: Option<crc32fast::Hasher>,
}

impl<R: Read> PackInput<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Box::new([0u8; 64 * 1024]),
            start: 0,
            end: 0,
            position: 0,
            sha: grit_hash::Hasher::new(),
            crc: None,
        }
    }

    /// Absolute offset of the next byte to be consumed.
    fn position(&self) -> u64 {
        self.position
    }

    fn begin_crc(&mut self) {
        self.crc = Some(crc32fast::Hasher::new());
    }

    fn take_crc(&mut self) -> u32 {
        self.crc.take().map(|h| h.finalize()).unwrap_or(0)
    }

    /// SHA-1 of everything consumed so far.
    fn digest(&self) -> Result<ObjectId, PackError> {
        Ok(self.sha.digest_so_far()?)
    }
}

impl<R: Read> Read for PackInput<R> {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for PackInput<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        if self.start == self.end {
            self.start = 0;
            self.end = self.inner.read(&mut self.buf[..])?;
        }
        Ok(&self.buf[self.start..self.end])
    }

    fn consume(&mut self, amt: usize) {
        let consumed = &self.buf[self.start..self.start + amt];
        self.sha.update(consumed);
        if let Some(crc) = self.crc.as_mut() {
            crc.update(consumed);
        }
        self.position += amt as u64;
        self.start += amt;
    }
}
