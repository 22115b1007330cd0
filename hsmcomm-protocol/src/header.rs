//! Packet header format and endian translation.
//!
//! Header layout (8 bytes, each field in the sender's native byte order):
//!
//! ```text
//! +--------+--------+--------+--------+
//! | magic  |  type  |  seq   |  aux   |
//! | 2 bytes| 2 bytes| 2 bytes| 2 bytes|
//! +--------+--------+--------+--------+
//! | payload (0..=1280 bytes)          |
//! +-----------------------------------+
//! ```
//!
//! `magic` combines the endian marker and the protocol version. A receiver
//! whose byte order differs from the sender reads the marker in the low byte
//! instead of the high byte, which is the only signal used to decide whether
//! multi-byte payload fields need swapping. Header fields themselves are
//! never translated; peers compare raw values.

use crate::error::CommError;
use crate::{COMM_VERSION, ENDIAN_MARKER, HEADER_LEN};
use bytes::{Buf, BufMut};

/// Mask selecting the endian marker byte of a native magic.
pub const MAGIC_ENDIAN_MASK: u16 = 0xFF00;

/// Mask selecting the version byte of a native magic.
pub const MAGIC_VERSION_MASK: u16 = 0x00FF;

/// Magic value as written by a peer with the same byte order.
pub const MAGIC_NATIVE: u16 = native_magic(COMM_VERSION);

/// Magic value as read from a peer with the opposite byte order.
pub const MAGIC_SWAP: u16 = swapped_magic(COMM_VERSION);

/// Combines the endian marker and a version into the native magic.
pub const fn native_magic(version: u8) -> u16 {
    ((ENDIAN_MARKER as u16) << 8) | version as u16
}

/// The native magic as it appears after a byte order flip.
pub const fn swapped_magic(version: u8) -> u16 {
    (ENDIAN_MARKER as u16) | ((version as u16) << 8)
}

/// Returns true if the sender of `magic` shares our byte order.
#[inline]
pub const fn is_native_order(magic: u16) -> bool {
    (magic & MAGIC_ENDIAN_MASK) == (MAGIC_NATIVE & MAGIC_ENDIAN_MASK)
}

/// Extracts the version byte from a native or swapped magic.
#[inline]
pub const fn magic_version(magic: u16) -> u8 {
    if is_native_order(magic) {
        (magic & MAGIC_VERSION_MASK) as u8
    } else {
        (magic >> 8) as u8
    }
}

/// Verifies that `magic` carries a legal endian marker and our version.
pub fn check_magic(magic: u16) -> Result<(), CommError> {
    let marker_ok = if is_native_order(magic) {
        true
    } else {
        (magic & MAGIC_VERSION_MASK) as u8 == ENDIAN_MARKER
    };
    if !marker_ok || magic_version(magic) != COMM_VERSION {
        return Err(CommError::ProtocolMismatch { magic });
    }
    Ok(())
}

/// Single bytes have no byte order; returned unchanged.
#[inline]
pub const fn translate8(_magic: u16, value: u8) -> u8 {
    value
}

/// Converts a 16-bit payload integer written by the peer that sent `magic`.
#[inline]
pub const fn translate16(magic: u16, value: u16) -> u16 {
    if is_native_order(magic) {
        value
    } else {
        value.swap_bytes()
    }
}

/// Converts a 32-bit payload integer written by the peer that sent `magic`.
#[inline]
pub const fn translate32(magic: u16, value: u32) -> u32 {
    if is_native_order(magic) {
        value
    } else {
        value.swap_bytes()
    }
}

/// Converts a 64-bit payload integer written by the peer that sent `magic`.
#[inline]
pub const fn translate64(magic: u16, value: u64) -> u64 {
    if is_native_order(magic) {
        value
    } else {
        value.swap_bytes()
    }
}

/// A decoded packet header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    /// Endian marker with version.
    pub magic: u16,
    /// Message type, owned by the layer above.
    pub kind: u16,
    /// Sequence number. Assigned on request, echoed on response.
    pub seq: u16,
    /// Client identifier on requests, status code on responses.
    pub aux: u16,
}

impl Header {
    pub fn new(magic: u16, kind: u16, seq: u16, aux: u16) -> Self {
        Self {
            magic,
            kind,
            seq,
            aux,
        }
    }

    /// Writes the header into `buf` in native byte order.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_ne(self.magic);
        buf.put_u16_ne(self.kind);
        buf.put_u16_ne(self.seq);
        buf.put_u16_ne(self.aux);
    }

    /// Reads a header from the front of `buf`.
    ///
    /// Returns `None` if fewer than `HEADER_LEN` bytes remain.
    pub fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        if buf.remaining() < HEADER_LEN {
            return None;
        }
        Some(Self {
            magic: buf.get_u16_ne(),
            kind: buf.get_u16_ne(),
            seq: buf.get_u16_ne(),
            aux: buf.get_u16_ne(),
        })
    }

    /// Returns true if the sender shares our byte order.
    pub fn is_native(&self) -> bool {
        is_native_order(self.magic)
    }
}
