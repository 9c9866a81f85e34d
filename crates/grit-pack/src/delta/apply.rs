//! Replay a delta instruction stream against base bytes.

use super::read_varint;
use crate::PackError;

/// Apply a delta to its base, producing the target bytes.
///
/// Both declared sizes are validated: the base size against the provided
/// base, the result size against the produced output. Every copy is bounds
/// checked against the base.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut pos = 0;

    let (base_size, consumed) =
        read_varint(&delta[pos..]).ok_or_else(|| invalid(0, "truncated base size"))?;
    pos += consumed;

    let (result_size, consumed) =
        read_varint(&delta[pos..]).ok_or_else(|| invalid(pos, "truncated result size"))?;
    pos += consumed;

    if base_size != base.len() as u64 {
        return Err(invalid(
            0,
            format!("base size mismatch: delta says {base_size}, base is {}", base.len()),
        ));
    }

    let mut output = Vec::with_capacity(result_size as usize);

    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;

        if cmd & 0x80 != 0 {
            // Copy: low 7 bits select which offset/size bytes follow.
            let mut operand = |present: bool| -> Result<usize, PackError> {
                if !present {
                    return Ok(0);
                }
                let byte = *delta
                    .get(pos)
                    .ok_or_else(|| invalid(pos, "truncated copy operand"))?;
                pos += 1;
                Ok(byte as usize)
            };

            let offset = operand(cmd & 0x01 != 0)?
                | operand(cmd & 0x02 != 0)? << 8
                | operand(cmd & 0x04 != 0)? << 16
                | operand(cmd & 0x08 != 0)? << 24;
            let mut size = operand(cmd & 0x10 != 0)?
                | operand(cmd & 0x20 != 0)? << 8
                | operand(cmd & 0x40 != 0)? << 16;

            if size == 0 {
                size = 0x10000;
            }

            let end = offset
                .checked_add(size)
                .ok_or_else(|| invalid(pos, "copy range overflow"))?;
            if end > base.len() {
                return Err(invalid(
                    pos,
                    format!(
                        "copy out of bounds: offset={offset}, size={size}, base_len={}",
                        base.len()
                    ),
                ));
            }
            output.extend_from_slice(&base[offset..end]);
        } else if cmd != 0 {
            // Insert `cmd` literal bytes.
            let n = cmd as usize;
            if pos + n > delta.len() {
                return Err(invalid(pos, "truncated insert data"));
            }
            output.extend_from_slice(&delta[pos..pos + n]);
            pos += n;
        } else {
            // Opcode 0 is reserved.
            return Err(invalid(pos - 1, "reserved delta opcode 0"));
        }
    }

    if output.len() as u64 != result_size {
        return Err(invalid(
            0,
            format!(
                "result size mismatch: delta says {result_size}, got {}",
                output.len()
            ),
        ));
    }

    Ok(output)
}

fn invalid(offset: usize, reason: impl Into<String>) -> PackError {
    PackError::InvalidDelta {
        offset: offset as u64,
        reason: reason.into(),
    }
}
