//! Protocol codec
//!
//! Encoding and decoding functions for RESP2.
//!
//! `decode_frame` works on a byte slice and reports how much it consumed,
//! returning `Ok(None)` while the frame is still incomplete. `read_frame`
//! pulls exactly one frame off a buffered stream.

use std::io::{BufRead, Read, Write};

use bytes::Bytes;

use super::{Command, Frame};
use crate::error::{OmError, Result};

/// Maximum bulk payload size (512 MB, the store's own limit)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array length accepted from the store
const MAX_ARRAY_LEN: i64 = 1 << 32;

/// Maximum nesting of arrays inside a reply
pub const MAX_NESTING_DEPTH: usize = 32;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a command as an array of bulk strings
pub fn encode_command(command: &Command) -> Vec<u8> {
    let args = command.args();
    let payload: usize = args.iter().map(|a| a.len() + 16).sum();

    let mut message = Vec::with_capacity(16 + payload);
    message.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in &args {
        put_bulk(&mut message, arg);
    }
    message
}

/// Encode any frame (used for replies in tests and tooling)
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut out = Vec::new();
    put_frame(&mut out, frame);
    out
}

fn put_frame(out: &mut Vec<u8>, frame: &Frame) {
    match frame {
        Frame::Simple(s) => out.extend_from_slice(format!("+{}\r\n", s).as_bytes()),
        Frame::Error(s) => out.extend_from_slice(format!("-{}\r\n", s).as_bytes()),
        Frame::Integer(n) => out.extend_from_slice(format!(":{}\r\n", n).as_bytes()),
        Frame::Bulk(None) => out.extend_from_slice(b"$-1\r\n"),
        Frame::Bulk(Some(payload)) => put_bulk(out, payload),
        Frame::Array(None) => out.extend_from_slice(b"*-1\r\n"),
        Frame::Array(Some(items)) => {
            out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                put_frame(out, item);
            }
        }
    }
}

fn put_bulk(out: &mut Vec<u8>, payload: &[u8]) {
    out.extend_from_slice(format!("${}\r\n", payload.len()).as_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\r\n");
}

// =============================================================================
// Slice Decoding
// =============================================================================

/// Decode one frame from the front of `bytes`
///
/// Returns the frame and the number of bytes consumed, or `None` if
/// `bytes` does not yet hold a complete frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Option<(Frame, usize)>> {
    decode_nested(bytes, 0)
}

fn decode_nested(bytes: &[u8], depth: usize) -> Result<Option<(Frame, usize)>> {
    let Some(line_end) = find_crlf(bytes) else {
        return Ok(None);
    };
    if line_end == 0 {
        return Err(OmError::Protocol("empty frame header".to_string()));
    }

    let marker = bytes[0];
    let line = std::str::from_utf8(&bytes[1..line_end])
        .map_err(|e| OmError::Protocol(format!("non UTF-8 frame header: {}", e)))?;
    let header_len = line_end + 2;

    match marker {
        b'+' => Ok(Some((Frame::Simple(line.to_string()), header_len))),
        b'-' => Ok(Some((Frame::Error(line.to_string()), header_len))),
        b':' => Ok(Some((Frame::Integer(parse_int(line)?), header_len))),
        b'$' => {
            let len = parse_int(line)?;
            if len < 0 {
                return Ok(Some((Frame::Bulk(None), header_len)));
            }
            let len = checked_bulk_len(len)?;
            let total = header_len + len + 2;
            if bytes.len() < total {
                return Ok(None);
            }
            if &bytes[header_len + len..total] != b"\r\n" {
                return Err(OmError::Protocol("bulk string not terminated by CRLF".to_string()));
            }
            let payload = Bytes::copy_from_slice(&bytes[header_len..header_len + len]);
            Ok(Some((Frame::Bulk(Some(payload)), total)))
        }
        b'*' => {
            let count = parse_int(line)?;
            if count < 0 {
                return Ok(Some((Frame::Array(None), header_len)));
            }
            check_array_len(count)?;
            check_depth(depth)?;

            let mut consumed = header_len;
            let mut items = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                match decode_nested(&bytes[consumed..], depth + 1)? {
                    Some((item, used)) => {
                        items.push(item);
                        consumed += used;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Frame::Array(Some(items)), consumed)))
        }
        other => Err(OmError::Protocol(format!(
            "Unknown frame type: 0x{:02x}",
            other
        ))),
    }
}

fn find_crlf(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|w| w == b"\r\n")
}

fn parse_int(line: &str) -> Result<i64> {
    line.parse::<i64>()
        .map_err(|_| OmError::Protocol(format!("invalid integer in frame: {:?}", line)))
}

fn checked_bulk_len(len: i64) -> Result<usize> {
    let len = len as usize;
    if len > MAX_BULK_SIZE {
        return Err(OmError::Protocol(format!(
            "Bulk payload too large: {} bytes (max {})",
            len, MAX_BULK_SIZE
        )));
    }
    Ok(len)
}

fn check_array_len(count: i64) -> Result<()> {
    if count > MAX_ARRAY_LEN {
        return Err(OmError::Protocol(format!("Array too large: {} elements", count)));
    }
    Ok(())
}

fn check_depth(depth: usize) -> Result<()> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(OmError::Protocol(format!(
            "Arrays nested deeper than {} levels",
            MAX_NESTING_DEPTH
        )));
    }
    Ok(())
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete frame from a buffered stream
///
/// Blocks until a complete frame is received or an error occurs
pub fn read_frame<R: BufRead>(reader: &mut R) -> Result<Frame> {
    read_nested(reader, 0)
}

fn read_nested<R: BufRead>(reader: &mut R, depth: usize) -> Result<Frame> {
    let line = read_line(reader)?;
    let (marker, rest) = line
        .split_first()
        .ok_or_else(|| OmError::Protocol("empty frame header".to_string()))?;
    let rest = std::str::from_utf8(rest)
        .map_err(|e| OmError::Protocol(format!("non UTF-8 frame header: {}", e)))?;

    match *marker {
        b'+' => Ok(Frame::Simple(rest.to_string())),
        b'-' => Ok(Frame::Error(rest.to_string())),
        b':' => Ok(Frame::Integer(parse_int(rest)?)),
        b'$' => {
            let len = parse_int(rest)?;
            if len < 0 {
                return Ok(Frame::Bulk(None));
            }
            let len = checked_bulk_len(len)?;
            let mut payload = vec![0u8; len + 2];
            reader.read_exact(&mut payload)?;
            if &payload[len..] != b"\r\n" {
                return Err(OmError::Protocol("bulk string not terminated by CRLF".to_string()));
            }
            payload.truncate(len);
            Ok(Frame::Bulk(Some(Bytes::from(payload))))
        }
        b'*' => {
            let count = parse_int(rest)?;
            if count < 0 {
                return Ok(Frame::Array(None));
            }
            check_array_len(count)?;
            check_depth(depth)?;
            let mut items = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                items.push(read_nested(reader, depth + 1)?);
            }
            Ok(Frame::Array(Some(items)))
        }
        other => Err(OmError::Protocol(format!(
            "Unknown frame type: 0x{:02x}",
            other
        ))),
    }
}

/// Read one CRLF-terminated header line, without the terminator
fn read_line<R: BufRead>(reader: &mut R) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    let read = reader.read_until(b'\n', &mut line)?;
    if read == 0 {
        return Err(OmError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed",
        )));
    }
    if !line.ends_with(b"\r\n") {
        return Err(OmError::Protocol("frame header not terminated by CRLF".to_string()));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    let bytes = encode_command(command);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
