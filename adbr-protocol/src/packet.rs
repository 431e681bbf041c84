//! Binary packet layer shared by the TCP and USB device transports.
//!
//! Packet layout (24-byte header, little-endian, + payload):
//!
//! ```text
//! +---------+------+------+--------+----------+-------+
//! | command | arg0 | arg1 | length | checksum | magic |
//! | 4 bytes |  4   |  4   |   4    |    4     |   4   |
//! +---------+------+------+--------+----------+-------+
//! | payload: length bytes                             |
//! +---------------------------------------------------+
//! ```
//!
//! For every packet `magic == !command` and `checksum` is the byte sum of
//! the payload.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Size of the fixed packet header in bytes.
pub const PACKET_HEADER_SIZE: usize = 24;

/// `A_AUTH` arg0: server asks the client to sign a token.
pub const AUTH_TOKEN: u32 = 1;
/// `A_AUTH` arg0: client returns the token signature.
pub const AUTH_SIGNATURE: u32 = 2;
/// `A_AUTH` arg0: client sends its RSA public key blob.
pub const AUTH_RSAPUBLICKEY: u32 = 3;

/// Length of the random authentication token.
pub const TOKEN_LENGTH: usize = 20;

/// The seven ADB wire commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    Sync = 0x434e5953,
    Cnxn = 0x4e584e43,
    Open = 0x4e45504f,
    Okay = 0x59414b4f,
    Clse = 0x45534c43,
    Wrte = 0x45545257,
    Auth = 0x48545541,
}

impl Command {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x434e5953 => Some(Command::Sync),
            0x4e584e43 => Some(Command::Cnxn),
            0x4e45504f => Some(Command::Open),
            0x59414b4f => Some(Command::Okay),
            0x45534c43 => Some(Command::Clse),
            0x45545257 => Some(Command::Wrte),
            0x48545541 => Some(Command::Auth),
            _ => None,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Command::Sync => "SYNC",
            Command::Cnxn => "CNXN",
            Command::Open => "OPEN",
            Command::Okay => "OKAY",
            Command::Clse => "CLSE",
            Command::Wrte => "WRTE",
            Command::Auth => "AUTH",
        }
    }
}

/// Swaps the byte order of a `u32`, used for CNXN version negotiation.
pub fn swap32(n: u32) -> u32 {
    n.swap_bytes()
}

/// A parsed wire packet.
#[derive(Debug, Clone)]
pub struct Packet {
    pub command: u32,
    pub arg0: u32,
    pub arg1: u32,
    pub data: Bytes,
}

impl Packet {
    /// Byte sum of a payload.
    pub fn checksum(data: &[u8]) -> u32 {
        data.iter().fold(0u32, |sum, &b| sum.wrapping_add(b as u32))
    }

    /// Assembles a packet into its wire representation.
    pub fn assemble(command: Command, arg0: u32, arg1: u32, data: &[u8]) -> BytesMut {
        let cmd = command as u32;
        let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE + data.len());
        buf.put_u32_le(cmd);
        buf.put_u32_le(arg0);
        buf.put_u32_le(arg1);
        buf.put_u32_le(data.len() as u32);
        buf.put_u32_le(Self::checksum(data));
        buf.put_u32_le(!cmd);
        buf.put_slice(data);
        buf
    }

    /// Returns the decoded command, if it is one of the seven known values.
    pub fn command_kind(&self) -> Option<Command> {
        Command::from_u32(self.command)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .command_kind()
            .map(|c| c.mnemonic())
            .unwrap_or("UNKNOWN");
        write!(
            f,
            "{} arg0={} arg1={} length={}",
            name,
            self.arg0,
            self.arg1,
            self.data.len()
        )
    }
}

/// Header fields kept while waiting for the packet body.
struct PendingHeader {
    command: u32,
    arg0: u32,
    arg1: u32,
    length: usize,
    check: u32,
}

/// Incremental packet decoder.
///
/// Alternates between two states: awaiting a 24-byte header and awaiting
/// `length` body bytes. Magic is validated when the header completes,
/// the checksum when the body completes.
pub struct PacketDecoder {
    buffer: BytesMut,
    pending: Option<PendingHeader>,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            pending: None,
        }
    }

    /// Appends raw bytes to the internal buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next packet.
    ///
    /// Returns `Ok(None)` when more data is needed.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
        loop {
            match self.pending.take() {
                None => {
                    if self.buffer.len() < PACKET_HEADER_SIZE {
                        return Ok(None);
                    }
                    let mut header = self.buffer.split_to(PACKET_HEADER_SIZE);
                    let command = header.get_u32_le();
                    let arg0 = header.get_u32_le();
                    let arg1 = header.get_u32_le();
                    let length = header.get_u32_le() as usize;
                    let check = header.get_u32_le();
                    let magic = header.get_u32_le();

                    if magic != !command {
                        return Err(ProtocolError::MagicMismatch { command, magic });
                    }

                    if length == 0 {
                        return Ok(Some(Packet {
                            command,
                            arg0,
                            arg1,
                            data: Bytes::new(),
                        }));
                    }
                    self.pending = Some(PendingHeader {
                        command,
                        arg0,
                        arg1,
                        length,
                        check,
                    });
                }
                Some(header) => {
                    if self.buffer.len() < header.length {
                        self.pending = Some(header);
                        return Ok(None);
                    }
                    let data = self.buffer.split_to(header.length).freeze();
                    let actual = Packet::checksum(&data);
                    if actual != header.check {
                        return Err(ProtocolError::ChecksumMismatch {
                            expected: header.check,
                            actual,
                        });
                    }
                    return Ok(Some(Packet {
                        command: header.command,
                        arg0: header.arg0,
                        arg1: header.arg1,
                        data,
                    }));
                }
            }
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(bytes: &[u8]) -> Result<Option<Packet>, ProtocolError> {
        let mut decoder = PacketDecoder::new();
        decoder.feed(bytes);
        decoder.next_packet()
    }

    #[test]
    fn test_assemble_parse_roundtrip() {
        let wire = Packet::assemble(Command::Wrte, 3, 7, b"hello");
        let packet = decode_one(&wire).unwrap().unwrap();

        assert_eq!(packet.command_kind(), Some(Command::Wrte));
        assert_eq!(packet.arg0, 3);
        assert_eq!(packet.arg1, 7);
        assert_eq!(&packet.data[..], b"hello");
        assert_eq!(
            Packet::checksum(&packet.data),
            b"hello".iter().map(|&b| b as u32).sum::<u32>()
        );
    }

    #[test]
    fn test_assemble_header_invariants() {
        let wire = Packet::assemble(Command::Open, 1, 0, b"shell:ls\0");
        let command = u32::from_le_bytes(wire[0..4].try_into().unwrap());
        let length = u32::from_le_bytes(wire[12..16].try_into().unwrap());
        let check = u32::from_le_bytes(wire[16..20].try_into().unwrap());
        let magic = u32::from_le_bytes(wire[20..24].try_into().unwrap());

        assert_eq!(command, Command::Open as u32);
        assert_eq!(length as usize, b"shell:ls\0".len());
        assert_eq!(check, Packet::checksum(b"shell:ls\0"));
        assert_eq!(magic, !command);
    }

    #[test]
    fn test_zero_payload_packet() {
        let wire = Packet::assemble(Command::Okay, 1, 2, b"");
        assert_eq!(wire.len(), PACKET_HEADER_SIZE);
        let packet = decode_one(&wire).unwrap().unwrap();
        assert_eq!(packet.command_kind(), Some(Command::Okay));
        assert!(packet.data.is_empty());
    }

    #[test]
    fn test_magic_corruption_rejected() {
        let mut wire = Packet::assemble(Command::Cnxn, 0, 0, b"").to_vec();
        wire[20] ^= 0x01;
        assert!(matches!(
            decode_one(&wire),
            Err(ProtocolError::MagicMismatch { .. })
        ));
    }

    #[test]
    fn test_payload_corruption_rejected() {
        // Flip a payload bit without adjusting the checksum.
        let mut wire = Packet::assemble(Command::Wrte, 1, 1, b"data").to_vec();
        wire[PACKET_HEADER_SIZE] ^= 0x40;
        assert!(matches!(
            decode_one(&wire),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_partial_feed() {
        let wire = Packet::assemble(Command::Wrte, 9, 9, b"chunked payload");
        let mut decoder = PacketDecoder::new();

        decoder.feed(&wire[..10]);
        assert!(decoder.next_packet().unwrap().is_none());

        decoder.feed(&wire[10..PACKET_HEADER_SIZE + 3]);
        assert!(decoder.next_packet().unwrap().is_none());

        decoder.feed(&wire[PACKET_HEADER_SIZE + 3..]);
        let packet = decoder.next_packet().unwrap().unwrap();
        assert_eq!(&packet.data[..], b"chunked payload");
    }

    #[test]
    fn test_multiple_packets_in_buffer() {
        let mut decoder = PacketDecoder::new();
        decoder.feed(&Packet::assemble(Command::Okay, 1, 2, b""));
        decoder.feed(&Packet::assemble(Command::Wrte, 1, 2, b"x"));

        let first = decoder.next_packet().unwrap().unwrap();
        assert_eq!(first.command_kind(), Some(Command::Okay));
        let second = decoder.next_packet().unwrap().unwrap();
        assert_eq!(second.command_kind(), Some(Command::Wrte));
        assert!(decoder.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_swap32() {
        assert_eq!(swap32(0x01000000), 0x00000001);
        assert_eq!(swap32(0x12345678), 0x78563412);
    }

    #[test]
    fn test_display_names() {
        let packet = decode_one(&Packet::assemble(Command::Clse, 4, 5, b""))
            .unwrap()
            .unwrap();
        assert_eq!(packet.to_string(), "CLSE arg0=4 arg1=5 length=0");
    }
}
