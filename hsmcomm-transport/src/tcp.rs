//! Non-blocking TCP transport.
//!
//! Each packet is sent as a 2-byte big-endian length followed by the packet
//! bytes. Sockets run in non-blocking mode; partial reads are buffered until
//! a whole packet is available and partial writes are flushed on later calls.

use bytes::{Buf, BufMut, BytesMut};
use hsmcomm_protocol::{Transport, TransportError, MTU};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

/// Size of the per-packet length prefix.
const LEN_PREFIX: usize = 2;

/// Read chunk size for draining the socket.
const READ_CHUNK: usize = 2048;

/// A TCP stream carrying length-prefixed packets.
struct FramedStream {
    stream: TcpStream,
    rx: BytesMut,
    tx: BytesMut,
    eof: bool,
}

impl FramedStream {
    fn new(stream: TcpStream) -> Result<Self, TransportError> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            rx: BytesMut::with_capacity(2 * (MTU + LEN_PREFIX)),
            tx: BytesMut::with_capacity(MTU + LEN_PREFIX),
            eof: false,
        })
    }

    /// Writes as much of the pending output as the socket accepts.
    fn flush(&mut self) -> Result<(), TransportError> {
        while !self.tx.is_empty() {
            match self.stream.write(&self.tx) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => self.tx.advance(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        if packet.len() > MTU {
            return Err(TransportError::PacketTooLarge {
                size: packet.len(),
                max: MTU,
            });
        }

        self.flush()?;
        if !self.tx.is_empty() {
            return Err(TransportError::WouldBlock);
        }

        self.tx.put_u16(packet.len() as u16);
        self.tx.put_slice(packet);
        self.flush()
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.flush()?;
        if let Some(n) = self.take_packet(buf)? {
            return Ok(n);
        }

        if !self.eof {
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                match self.stream.read(&mut chunk) {
                    Ok(0) => {
                        self.eof = true;
                        break;
                    }
                    Ok(n) => self.rx.extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }

        match self.take_packet(buf)? {
            Some(n) => Ok(n),
            None if self.eof => Err(TransportError::Closed),
            None => Err(TransportError::WouldBlock),
        }
    }

    /// Moves one complete packet from the receive buffer into `buf`.
    fn take_packet(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        if self.rx.len() < LEN_PREFIX {
            return Ok(None);
        }
        let len = u16::from_be_bytes([self.rx[0], self.rx[1]]) as usize;
        if len > MTU || len > buf.len() {
            return Err(TransportError::PacketTooLarge {
                size: len,
                max: buf.len().min(MTU),
            });
        }
        if self.rx.len() < LEN_PREFIX + len {
            return Ok(None);
        }

        self.rx.advance(LEN_PREFIX);
        buf[..len].copy_from_slice(&self.rx[..len]);
        self.rx.advance(len);
        Ok(Some(len))
    }

    fn shutdown(&mut self) {
        // Best effort: hand any queued packet to the kernel before closing.
        let _ = self.flush();
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// TCP client transport configuration.
#[derive(Debug, Clone)]
pub struct TcpClientConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl TcpClientConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Client end of the TCP transport.
#[derive(Default)]
pub struct TcpClientTransport {
    conn: Option<FramedStream>,
}

impl TcpClientTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}

impl Transport for TcpClientTransport {
    type Config = TcpClientConfig;

    fn init(&mut self, config: &TcpClientConfig) -> Result<(), TransportError> {
        tracing::debug!("Connecting to {}...", config.addr);
        let stream = TcpStream::connect_timeout(&config.addr, config.connect_timeout)
            .map_err(|e| {
                tracing::debug!("Connection failed: {}", e);
                TransportError::Io(e)
            })?;
        self.conn = Some(FramedStream::new(stream)?);
        tracing::debug!("Connected to {}", config.addr);
        Ok(())
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        self.conn
            .as_mut()
            .ok_or(TransportError::NotReady)?
            .send(packet)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.conn
            .as_mut()
            .ok_or(TransportError::NotReady)?
            .recv(buf)
    }

    fn cleanup(&mut self) -> Result<(), TransportError> {
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown();
        }
        Ok(())
    }
}

/// TCP server transport configuration.
#[derive(Debug, Clone)]
pub struct TcpServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
}

impl TcpServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self { bind_addr }
    }
}

/// Server end of the TCP transport.
///
/// Serves one client connection at a time, accepted lazily on `recv`.
#[derive(Default)]
pub struct TcpServerTransport {
    listener: Option<TcpListener>,
    conn: Option<FramedStream>,
    peer: Option<SocketAddr>,
}

impl TcpServerTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bound address (useful when binding to port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Returns the address of the connected client, if any.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn accept(&mut self) -> Result<(), TransportError> {
        let listener = self.listener.as_ref().ok_or(TransportError::NotReady)?;
        match listener.accept() {
            Ok((stream, addr)) => {
                tracing::info!("Client connected from {}", addr);
                self.conn = Some(FramedStream::new(stream)?);
                self.peer = Some(addr);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(TransportError::WouldBlock),
            Err(e) => Err(e.into()),
        }
    }
}

impl Transport for TcpServerTransport {
    type Config = TcpServerConfig;

    fn init(&mut self, config: &TcpServerConfig) -> Result<(), TransportError> {
        let listener = TcpListener::bind(config.bind_addr)?;
        listener.set_nonblocking(true)?;
        tracing::info!("Listening on {}", listener.local_addr()?);
        self.listener = Some(listener);
        self.conn = None;
        self.peer = None;
        Ok(())
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        self.conn
            .as_mut()
            .ok_or(TransportError::NotReady)?
            .send(packet)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.conn.is_none() {
            self.accept()?;
        }
        let conn = self.conn.as_mut().ok_or(TransportError::NotReady)?;
        match conn.recv(buf) {
            Err(TransportError::Closed) => {
                if let Some(addr) = self.peer.take() {
                    tracing::info!("Client {} disconnected", addr);
                }
                self.conn = None;
                Err(TransportError::Closed)
            }
            other => other,
        }
    }

    fn cleanup(&mut self) -> Result<(), TransportError> {
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown();
        }
        self.listener = None;
        self.peer = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn poll_recv<T: Transport>(transport: &mut T, buf: &mut [u8]) -> usize {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match transport.recv(buf) {
                Ok(n) => return n,
                Err(e) if e.is_would_block() => {
                    assert!(Instant::now() < deadline, "timed out waiting for packet");
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => panic!("recv failed: {e}"),
            }
        }
    }

    fn connected_pair() -> (TcpClientTransport, TcpServerTransport) {
        let mut server = TcpServerTransport::new();
        server
            .init(&TcpServerConfig::new("127.0.0.1:0".parse().unwrap()))
            .unwrap();
        let addr = server.local_addr().unwrap();

        let mut client = TcpClientTransport::new();
        client.init(&TcpClientConfig::new(addr)).unwrap();
        (client, server)
    }

    #[test]
    fn test_loopback_roundtrip() {
        let (mut client, mut server) = connected_pair();
        let mut buf = [0u8; MTU];

        client.send(b"hello").unwrap();
        let n = poll_recv(&mut server, &mut buf);
        assert_eq!(&buf[..n], b"hello");
        assert!(server.peer_addr().is_some());

        server.send(b"world").unwrap();
        let n = poll_recv(&mut client, &mut buf);
        assert_eq!(&buf[..n], b"world");
    }

    #[test]
    fn test_full_mtu_packet() {
        let (mut client, mut server) = connected_pair();
        let mut buf = [0u8; MTU];
        let packet: Vec<u8> = (0..MTU).map(|i| i as u8).collect();

        client.send(&packet).unwrap();
        let n = poll_recv(&mut server, &mut buf);
        assert_eq!(n, MTU);
        assert_eq!(&buf[..n], &packet[..]);
    }

    #[test]
    fn test_packets_stay_separate() {
        let (mut client, mut server) = connected_pair();
        let mut buf = [0u8; MTU];

        // Accept the connection first so both packets land on one stream.
        assert!(server.recv(&mut buf).is_err());
        client.send(b"first").unwrap();
        client.send(b"second").unwrap();

        let n = poll_recv(&mut server, &mut buf);
        assert_eq!(&buf[..n], b"first");
        let n = poll_recv(&mut server, &mut buf);
        assert_eq!(&buf[..n], b"second");
    }

    #[test]
    fn test_oversize_rejected() {
        let (mut client, _server) = connected_pair();
        let result = client.send(&vec![0u8; MTU + 1]);
        assert!(matches!(result, Err(TransportError::PacketTooLarge { .. })));
    }

    #[test]
    fn test_not_ready_before_init() {
        let mut client = TcpClientTransport::new();
        let mut buf = [0u8; MTU];
        assert!(matches!(client.send(b"x"), Err(TransportError::NotReady)));
        assert!(matches!(client.recv(&mut buf), Err(TransportError::NotReady)));

        let mut server = TcpServerTransport::new();
        assert!(matches!(server.recv(&mut buf), Err(TransportError::NotReady)));
    }

    #[test]
    fn test_client_disconnect_reported() {
        let (mut client, mut server) = connected_pair();
        let mut buf = [0u8; MTU];

        client.send(b"bye").unwrap();
        let n = poll_recv(&mut server, &mut buf);
        assert_eq!(&buf[..n], b"bye");

        client.cleanup().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match server.recv(&mut buf) {
                Err(TransportError::Closed) => break,
                Err(e) if e.is_would_block() => {
                    assert!(Instant::now() < deadline, "disconnect not observed");
                    std::thread::sleep(Duration::from_millis(1));
                }
                other => panic!("unexpected result: {other:?}"),
            }
        }
        assert!(server.peer_addr().is_none());
    }
}
