//! # hsmcomm-protocol
//!
//! Wire protocol for the hsmcomm request/response layer.
//!
//! This crate provides:
//! - The fixed 8-byte packet header and its codec
//! - Endian self-description through the `magic` field and translation helpers
//! - A fixed-capacity packet buffer sized to the MTU
//! - The transport capability trait consumed by clients and servers
//! - Error taxonomy and response status codes

pub mod error;
pub mod header;
pub mod message;
pub mod packet;
pub mod transport;

pub use error::{CommError, ErrorCode, TransportError};
pub use header::{
    check_magic, is_native_order, magic_version, native_magic, swapped_magic, translate16,
    translate32, translate64, translate8, Header, MAGIC_NATIVE, MAGIC_SWAP,
};
pub use message::{CommAction, MessageGroup, MessageKind};
pub use packet::{Incoming, Packet};
pub use transport::Transport;

/// Size of the packet header in bytes.
pub const HEADER_LEN: usize = 8;

/// Maximum payload carried by one packet.
pub const DATA_LEN: usize = 1280;

/// Maximum transmission unit: one header plus a full payload.
pub const MTU: usize = HEADER_LEN + DATA_LEN;

/// Protocol version, BCD encoded so it never collides with the endian marker.
pub const COMM_VERSION: u8 = 0x01;

/// Marker byte used to detect a byte order mismatch between peers.
pub const ENDIAN_MARKER: u8 = 0xA5;

/// Sequence number carried by server-originated notifications. Clients never
/// assign it to a request, so a notification can never complete one.
pub const NOTIFY_SEQ: u16 = 0;
