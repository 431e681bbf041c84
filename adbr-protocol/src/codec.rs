//! Smart-socket framing and SYNC headers.
//!
//! A smart-socket request is an ASCII payload prefixed by its byte length as
//! a 4-digit uppercase hex string. A reply starts with the 4-byte ASCII
//! status `OKAY` or `FAIL`. SYNC frames use an 8-byte header: 4 ASCII
//! command bytes followed by a little-endian `u32` length.

use crate::error::ProtocolError;
use bytes::{BufMut, BytesMut};

/// Positive smart-socket reply status.
pub const OKAY: &[u8; 4] = b"OKAY";
/// Negative smart-socket reply status, followed by a length-prefixed message.
pub const FAIL: &[u8; 4] = b"FAIL";

/// SYNC sub-protocol command mnemonics.
pub const STAT: &[u8; 4] = b"STAT";
pub const LIST: &[u8; 4] = b"LIST";
pub const DENT: &[u8; 4] = b"DENT";
pub const RECV: &[u8; 4] = b"RECV";
pub const DATA: &[u8; 4] = b"DATA";
pub const DONE: &[u8; 4] = b"DONE";
pub const SEND: &[u8; 4] = b"SEND";
pub const QUIT: &[u8; 4] = b"QUIT";

/// Encodes a length as 4 uppercase hex digits.
///
/// Smart-socket payloads never exceed `0xFFFF` bytes.
pub fn encode_length(n: u32) -> [u8; 4] {
    debug_assert!(n <= 0xFFFF);
    let mut out = [0u8; 4];
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = DIGITS[((n >> (12 - i * 4)) & 0xF) as usize];
    }
    out
}

/// Decodes a 4-digit hex length prefix. Case-insensitive.
pub fn decode_length(s: &[u8]) -> Result<u32, ProtocolError> {
    if s.len() != 4 {
        return Err(ProtocolError::MalformedLength(
            String::from_utf8_lossy(s).into_owned(),
        ));
    }
    let mut value: u32 = 0;
    for &b in s {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => {
                return Err(ProtocolError::MalformedLength(
                    String::from_utf8_lossy(s).into_owned(),
                ))
            }
        };
        value = (value << 4) | u32::from(digit);
    }
    Ok(value)
}

/// Prefixes a payload with its encoded length.
pub fn encode_frame(payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_slice(&encode_length(payload.len() as u32));
    buf.put_slice(payload);
    buf
}

/// Splits a length-prefixed frame into `(payload, rest)`.
pub fn decode_frame(bytes: &[u8]) -> Result<(&[u8], &[u8]), ProtocolError> {
    if bytes.len() < 4 {
        return Err(ProtocolError::ShortFrame {
            declared: 0,
            available: bytes.len(),
        });
    }
    let length = decode_length(&bytes[..4])? as usize;
    if bytes.len() < 4 + length {
        return Err(ProtocolError::ShortFrame {
            declared: length,
            available: bytes.len() - 4,
        });
    }
    Ok((&bytes[4..4 + length], &bytes[4 + length..]))
}

/// Formats an 8-byte SYNC header: 4 ASCII command bytes + `u32` LE length.
///
/// The length slot is overloaded: `DONE` carries the mtime there and the
/// directory variants carry struct fields, so it is just "the second word".
pub fn format_sync_header(cmd: &[u8; 4], length: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(cmd);
    out[4..].copy_from_slice(&length.to_le_bytes());
    out
}

/// Formats a SYNC request carrying a path argument.
pub fn format_sync_request(cmd: &[u8; 4], path: &str) -> BytesMut {
    let mut buf = BytesMut::with_capacity(8 + path.len());
    buf.put_slice(&format_sync_header(cmd, path.len() as u32));
    buf.put_slice(path.as_bytes());
    buf
}
