//! # adbr-protocol
//!
//! Wire protocol implementation for the Android Debug Bridge.
//!
//! This crate provides:
//! - Smart-socket framing: 4-digit hex length prefixes over ASCII payloads
//! - SYNC sub-protocol headers (4 ASCII bytes + little-endian length)
//! - The binary `A_*` packet layer used between an ADB client and a device,
//!   with checksum and magic validation

pub mod codec;
pub mod error;
pub mod packet;

pub use error::ProtocolError;
pub use packet::{swap32, Command, Packet, PacketDecoder, PACKET_HEADER_SIZE};

/// Default port of the local ADB server.
pub const DEFAULT_PORT: u16 = 5037;

/// Maximum payload of a single SYNC `DATA` frame (64 KiB).
pub const SYNC_DATA_MAX: usize = 64 * 1024;
