//! Sideband demultiplexing.
//!
//! When `side-band`/`side-band-64k` is negotiated, each data pkt-line
//! carries a band byte: 1 = pack data, 2 = progress text, 3 = fatal error.
//! The engine's own session is NAK-only and never negotiates sideband;
//! this reader exists for callers that do.

use std::io::Read;

use crate::pktline::{PktLine, Scanner};
use crate::ProtocolError;

/// Demuxes a sideband stream, yielding band-1 bytes through `Read`.
///
/// Progress lines go to the optional callback; a band-3 message fails the
/// read with the server's text.
pub struct SidebandReader<R> {
    scanner: Scanner<R>,
    pending: Vec<u8>,
    pending_pos: usize,
    finished: bool,
    progress: Option<Box<dyn FnMut(&[u8]) + Send>>,
}

impl<R: Read> SidebandReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            scanner: Scanner::new(reader),
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
            progress: None,
        }
    }

    /// Install a progress callback for band-2 messages.
    pub fn with_progress(mut self, callback: impl FnMut(&[u8]) + Send + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Pull frames until the next band-1 payload or end of stream.
    fn refill(&mut self) -> Result<(), ProtocolError> {
        loop {
            match self.scanner.read_pkt()? {
                PktLine::Flush => {
                    self.finished = true;
                    return Ok(());
                }
                PktLine::Delim => {
                    return Err(ProtocolError::Protocol(
                        "unexpected delimiter in sideband stream".into(),
                    ))
                }
                PktLine::Data(frame) => {
                    let Some((&band, payload)) = frame.split_first() else {
                        continue;
                    };
                    match band {
                        1 => {
                            self.pending = payload.to_vec();
                            self.pending_pos = 0;
                            return Ok(());
                        }
                        2 => {
                            if let Some(cb) = self.progress.as_mut() {
                                cb(payload);
                            }
                        }
                        3 => {
                            self.finished = true;
                            return Err(ProtocolError::Protocol(format!(
                                "remote error: {}",
                                String::from_utf8_lossy(payload).trim_end()
                            )));
                        }
                        other => {
                            return Err(ProtocolError::Protocol(format!(
                                "unknown sideband channel {other}"
                            )))
                        }
                    }
                }
            }
        }
    }
}

impl<R: Read> Read for SidebandReader<R> {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        if self.pending_pos >= self.pending.len() {
            if self.finished {
                return Ok(0);
            }
            self.refill().map_err(std::io::Error::other)?;
            if self.pending_pos >= self.pending.len() {
                return Ok(0);
            }
        }
        let n = out.len().min(self.pending.len() - self.pending_pos);
        out[..n].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
        self.pending_pos += n;
        Ok(n)
    }
}
