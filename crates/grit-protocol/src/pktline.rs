//! Pkt-line framing.
//!
//! Every frame is a 4-digit lowercase-hex length (counting the length
//! field itself) followed by the payload. Two lengths are special:
//! `0000` is a flush (section end) and `0001` a delimiter. The largest
//! data frame is 65520 bytes on the wire, so payloads cap at 65516.

use std::io::{Read, Write};

use crate::ProtocolError;

/// Maximum payload per data frame.
pub const MAX_PAYLOAD_LEN: usize = 65516;

/// Maximum frame length including the 4 length digits.
pub const MAX_FRAME_LEN: usize = 65520;

/// One scanned frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data frame with its payload.
    Data(Vec<u8>),
    /// Flush (`0000`).
    Flush,
    /// Delimiter (`0001`).
    Delim,
}

/// Pkt-line scanner over any byte source.
pub struct Scanner<R> {
    reader: R,
}

impl<R: Read> Scanner<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read one frame.
    ///
    /// Fails `MalformedLength` unless the length field is exactly four
    /// lowercase hex digits naming a representable frame, and
    /// `PayloadTooLong` past the 65520-byte frame cap.
    pub fn read_pkt(&mut self) -> Result<PktLine, ProtocolError> {
        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ProtocolError::Protocol("unexpected EOF reading pkt-line length".into())
            } else {
                ProtocolError::Io(e)
            }
        })?;

        if !len_buf.iter().all(|&b| grit_hash::hex::is_lower_hex_digit(b)) {
            return Err(ProtocolError::MalformedLength(
                String::from_utf8_lossy(&len_buf).into_owned(),
            ));
        }
        let len_str = std::str::from_utf8(&len_buf).expect("hex digits are ASCII");
        let len = usize::from_str_radix(len_str, 16).expect("4 hex digits fit usize");

        match len {
            0 => Ok(PktLine::Flush),
            1 => Ok(PktLine::Delim),
            2 | 3 => Err(ProtocolError::MalformedLength(len_str.into())),
            _ if len > MAX_FRAME_LEN => Err(ProtocolError::PayloadTooLong(len)),
            _ => {
                let mut data = vec![0u8; len - 4];
                self.reader.read_exact(&mut data)?;
                Ok(PktLine::Data(data))
            }
        }
    }

    /// Read one data frame; `None` on flush. A delimiter here is a
    /// protocol error (v1 has no delimited sections).
    pub fn read_line(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        match self.read_pkt()? {
            PktLine::Data(data) => Ok(Some(data)),
            PktLine::Flush => Ok(None),
            PktLine::Delim => Err(ProtocolError::Protocol(
                "unexpected delimiter frame".into(),
            )),
        }
    }

    /// Collect data frames until the next flush.
    pub fn read_until_flush(&mut self) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let mut lines = Vec::new();
        while let Some(data) = self.read_line()? {
            lines.push(data);
        }
        Ok(lines)
    }
}

/// Pkt-line encoder over any byte sink.
pub struct Encoder<W> {
    writer: W,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Write a data frame. Empty payloads are rejected — an empty data
    /// frame (`0004`) is never meaningful in the protocol.
    pub fn write_pkt(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        if payload.is_empty() {
            return Err(ProtocolError::EmptyPayload);
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLong(payload.len()));
        }
        write!(self.writer, "{:04x}", payload.len() + 4)?;
        self.writer.write_all(payload)?;
        Ok(())
    }

    /// Write a text line, appending the conventional trailing newline if
    /// absent.
    pub fn write_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        if text.ends_with('\n') {
            self.write_pkt(text.as_bytes())
        } else {
            let mut data = Vec::with_capacity(text.len() + 1);
            data.extend_from_slice(text.as_bytes());
            data.push(b'\n');
            self.write_pkt(&data)
        }
    }

    /// Write a flush frame (`0000`).
    pub fn write_flush(&mut self) -> Result<(), ProtocolError> {
        self.writer.write_all(b"0000")?;
        Ok(())
    }

    /// Write a delimiter frame (`0001`).
    pub fn write_delim(&mut self) -> Result<(), ProtocolError> {
        self.writer.write_all(b"0001")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        self.writer.flush()?;
        Ok(())
    }
}
