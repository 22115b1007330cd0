//! Transport capability consumed by the comm contexts.
//!
//! A transport delivers whole packets of at most `MTU` bytes, in order and
//! reliably. Every operation is non-blocking: when a packet cannot be
//! accepted or none has arrived, the transport reports
//! [`TransportError::WouldBlock`] and the caller polls again later.

use crate::error::TransportError;

/// The send/receive contract shared by client and server transports.
pub trait Transport {
    /// Transport-specific configuration handed over at init time.
    type Config;

    /// Establishes or prepares the channel.
    fn init(&mut self, config: &Self::Config) -> Result<(), TransportError>;

    /// Attempts to transmit exactly one packet.
    ///
    /// Either the whole packet is accepted or none of it is.
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError>;

    /// Attempts to receive exactly one complete packet into `buf`.
    ///
    /// Returns the packet length. A return of 0 is treated the same as
    /// `WouldBlock`.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Signals the peer where supported and releases transport resources.
    fn cleanup(&mut self) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    type Config = T::Config;

    fn init(&mut self, config: &Self::Config) -> Result<(), TransportError> {
        (**self).init(config)
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        (**self).send(packet)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).recv(buf)
    }

    fn cleanup(&mut self) -> Result<(), TransportError> {
        (**self).cleanup()
    }
}
