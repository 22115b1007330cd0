//! In-memory transport.
//!
//! Models a shared memory region holding one request slot and one response
//! slot. A sender may only fill its outbound slot once the peer has drained
//! it, which gives the same backpressure a real mailbox would.

use hsmcomm_protocol::{Transport, TransportError, MTU};
use parking_lot::Mutex;
use std::sync::Arc;

/// Memory transport configuration.
#[derive(Debug, Clone, Copy)]
pub struct MemConfig {
    /// Largest packet this end will send. Clamped to `MTU`.
    pub max_packet_len: usize,
}

impl Default for MemConfig {
    fn default() -> Self {
        Self {
            max_packet_len: MTU,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndState {
    /// Never initialized.
    Idle,
    Open,
    /// Cleaned up; the peer sees `Closed` once its inbound slot is empty.
    Closed,
}

struct Slot {
    data: [u8; MTU],
    len: usize,
    full: bool,
}

impl Slot {
    const fn new() -> Self {
        Self {
            data: [0u8; MTU],
            len: 0,
            full: false,
        }
    }
}

struct Shared {
    request: Slot,
    response: Slot,
    client: EndState,
    server: EndState,
}

impl Shared {
    fn end(&mut self, side: Side) -> &mut EndState {
        match side {
            Side::Client => &mut self.client,
            Side::Server => &mut self.server,
        }
    }

    fn peer(&self, side: Side) -> EndState {
        match side {
            Side::Client => self.server,
            Side::Server => self.client,
        }
    }

    fn outbound(&mut self, side: Side) -> &mut Slot {
        match side {
            Side::Client => &mut self.request,
            Side::Server => &mut self.response,
        }
    }

    fn inbound(&mut self, side: Side) -> &mut Slot {
        match side {
            Side::Client => &mut self.response,
            Side::Server => &mut self.request,
        }
    }
}

/// One end of an in-memory channel.
pub struct MemTransport {
    shared: Arc<Mutex<Shared>>,
    side: Side,
    max_packet_len: usize,
}

/// Creates a connected pair of transports: `(client, server)`.
pub fn channel() -> (MemTransport, MemTransport) {
    let shared = Arc::new(Mutex::new(Shared {
        request: Slot::new(),
        response: Slot::new(),
        client: EndState::Idle,
        server: EndState::Idle,
    }));
    let client = MemTransport {
        shared: shared.clone(),
        side: Side::Client,
        max_packet_len: MTU,
    };
    let server = MemTransport {
        shared,
        side: Side::Server,
        max_packet_len: MTU,
    };
    (client, server)
}

impl MemTransport {
    /// Returns whether a packet is waiting in this end's inbound slot.
    pub fn has_pending(&self) -> bool {
        let mut shared = self.shared.lock();
        shared.inbound(self.side).full
    }
}

impl Transport for MemTransport {
    type Config = MemConfig;

    fn init(&mut self, config: &MemConfig) -> Result<(), TransportError> {
        self.max_packet_len = config.max_packet_len.min(MTU);
        let mut shared = self.shared.lock();
        if *shared.end(self.side) == EndState::Closed {
            // Drop anything left over from the previous session.
            shared.inbound(self.side).full = false;
        }
        *shared.end(self.side) = EndState::Open;
        tracing::debug!(side = ?self.side, "memory transport open");
        Ok(())
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        if packet.len() > self.max_packet_len {
            return Err(TransportError::PacketTooLarge {
                size: packet.len(),
                max: self.max_packet_len,
            });
        }

        let mut shared = self.shared.lock();
        if *shared.end(self.side) != EndState::Open {
            return Err(TransportError::NotReady);
        }
        if shared.peer(self.side) == EndState::Closed {
            return Err(TransportError::Closed);
        }

        let slot = shared.outbound(self.side);
        if slot.full {
            return Err(TransportError::WouldBlock);
        }
        slot.data[..packet.len()].copy_from_slice(packet);
        slot.len = packet.len();
        slot.full = true;
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut shared = self.shared.lock();
        if *shared.end(self.side) != EndState::Open {
            return Err(TransportError::NotReady);
        }
        let peer = shared.peer(self.side);

        let slot = shared.inbound(self.side);
        if !slot.full {
            if peer == EndState::Closed {
                return Err(TransportError::Closed);
            }
            return Err(TransportError::WouldBlock);
        }
        if slot.len > buf.len() {
            return Err(TransportError::PacketTooLarge {
                size: slot.len,
                max: buf.len(),
            });
        }
        buf[..slot.len].copy_from_slice(&slot.data[..slot.len]);
        slot.full = false;
        Ok(slot.len)
    }

    fn cleanup(&mut self) -> Result<(), TransportError> {
        let mut shared = self.shared.lock();
        *shared.end(self.side) = EndState::Closed;
        tracing::debug!(side = ?self.side, "memory transport closed");
        Ok(())
    }
}
