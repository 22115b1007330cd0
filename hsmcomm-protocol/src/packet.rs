//! Fixed-capacity packet buffer.
//!
//! Each comm context owns exactly one `Packet`, reused in place for every
//! request and response. The buffer never allocates and never grows.

use crate::error::CommError;
use crate::header::Header;
use crate::{DATA_LEN, HEADER_LEN, MTU};

/// One MTU-sized packet with explicit length tracking.
pub struct Packet {
    buf: [u8; MTU],
    len: usize,
}

impl Packet {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; MTU],
            len: 0,
        }
    }

    /// Builds a packet from a header and payload.
    ///
    /// The payload size is validated before any byte is written, so a failed
    /// call leaves the previous contents intact.
    pub fn write(&mut self, header: &Header, data: &[u8]) -> Result<(), CommError> {
        if data.len() > DATA_LEN {
            return Err(CommError::InvalidArgument(format!(
                "payload of {} bytes exceeds {} byte limit",
                data.len(),
                DATA_LEN
            )));
        }

        let mut dst = &mut self.buf[..HEADER_LEN];
        header.encode(&mut dst);
        self.buf[HEADER_LEN..HEADER_LEN + data.len()].copy_from_slice(data);
        self.len = HEADER_LEN + data.len();
        Ok(())
    }

    /// The whole backing buffer, for a transport to receive into.
    pub fn recv_buf(&mut self) -> &mut [u8] {
        &mut self.buf[..]
    }

    /// Records that a transport delivered `len` bytes into `recv_buf`.
    pub fn commit_recv(&mut self, len: usize) -> Result<Header, CommError> {
        if len > MTU {
            return Err(CommError::InvalidArgument(format!(
                "transport reported {} bytes, buffer holds {}",
                len, MTU
            )));
        }
        if len < HEADER_LEN {
            self.len = 0;
            return Err(CommError::TruncatedPacket { len });
        }
        self.len = len;
        self.header().ok_or(CommError::TruncatedPacket { len })
    }

    /// Bytes of the current packet, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn header(&self) -> Option<Header> {
        Header::decode(&mut self.as_bytes())
    }

    pub fn payload(&self) -> &[u8] {
        if self.len < HEADER_LEN {
            return &[];
        }
        &self.buf[HEADER_LEN..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("len", &self.len)
            .field("header", &self.header())
            .finish()
    }
}

/// A received packet, borrowed from the owning context's buffer.
#[derive(Debug, Clone, Copy)]
pub struct Incoming<'a> {
    pub header: Header,
    pub payload: &'a [u8],
}

impl<'a> Incoming<'a> {
    pub fn magic(&self) -> u16 {
        self.header.magic
    }

    pub fn kind(&self) -> u16 {
        self.header.kind
    }

    pub fn seq(&self) -> u16 {
        self.header.seq
    }

    pub fn aux(&self) -> u16 {
        self.header.aux
    }

    /// Payload size in bytes; never exceeds `DATA_LEN`.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
