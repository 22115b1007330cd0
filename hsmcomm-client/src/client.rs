//! High-level client API.

use crate::comm::{ClientConfig, ClientState, CommClient};
use crate::error::ClientError;
use bytes::Bytes;
use hsmcomm_protocol::{
    translate16, CommAction, CommError, ErrorCode, Incoming, Transport, MAGIC_NATIVE,
};
use std::time::{Duration, Instant};

/// Default time to wait for a response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default delay between polls of the transport.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(200);

/// An owned response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub magic: u16,
    pub kind: u16,
    pub seq: u16,
    /// Status from the `aux` field.
    pub status: ErrorCode,
    pub payload: Bytes,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

impl From<&Incoming<'_>> for Response {
    fn from(incoming: &Incoming<'_>) -> Self {
        Self {
            magic: incoming.magic(),
            kind: incoming.kind(),
            seq: incoming.seq(),
            status: ErrorCode::from_u16(incoming.aux()),
            payload: Bytes::copy_from_slice(incoming.payload),
        }
    }
}

/// Client that waits for responses by polling until a deadline.
///
/// The underlying `CommClient` never blocks; this wrapper sleeps between
/// polls and gives up with `ClientError::Timeout`.
pub struct Client<T: Transport> {
    comm: CommClient<T>,
    timeout: Duration,
    poll_interval: Duration,
}

impl<T: Transport> Client<T> {
    /// Creates a client around an uninitialized transport.
    pub fn new(transport: T) -> Self {
        Self {
            comm: CommClient::new(transport),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Initializes the comm context and performs the init handshake.
    ///
    /// Returns the server identifier.
    pub fn connect(&mut self, config: &ClientConfig<T::Config>) -> Result<u16, ClientError> {
        self.comm.init(config)?;

        let client_id = self.comm.client_id();
        let response = self.request(CommAction::Init.kind(), &client_id.to_ne_bytes())?;
        if response.payload.len() < 4 {
            return Err(ClientError::UnexpectedResponse(format!(
                "init response of {} bytes",
                response.payload.len()
            )));
        }

        let p = &response.payload;
        let echoed_id = translate16(response.magic, u16::from_ne_bytes([p[0], p[1]]));
        let server_id = translate16(response.magic, u16::from_ne_bytes([p[2], p[3]]));
        if echoed_id != client_id {
            return Err(ClientError::UnexpectedResponse(format!(
                "server acknowledged client {} instead of {}",
                echoed_id, client_id
            )));
        }

        self.comm.set_server_id(server_id);
        tracing::debug!(client_id, server_id, "connected to server");
        Ok(server_id)
    }

    /// Returns whether the comm context is connected.
    pub fn is_connected(&self) -> bool {
        self.comm.is_connected()
    }

    pub fn server_id(&self) -> u16 {
        self.comm.server_id()
    }

    pub fn comm(&self) -> &CommClient<T> {
        &self.comm
    }

    pub fn comm_mut(&mut self) -> &mut CommClient<T> {
        &mut self.comm
    }

    /// Sends a request and waits for its response, whatever its status.
    ///
    /// Unsolicited and malformed packets received meanwhile are logged and
    /// skipped.
    pub fn call(&mut self, kind: u16, data: &[u8]) -> Result<Response, ClientError> {
        let deadline = Instant::now() + self.timeout;

        let seq = loop {
            match self.comm.send_request(MAGIC_NATIVE, kind, data) {
                Ok(seq) => break seq,
                Err(CommError::Busy) => self.wait(deadline)?,
                Err(e) => return Err(e.into()),
            }
        };

        loop {
            let err = match self.comm.recv_response() {
                Ok(incoming) if incoming.seq() == seq => return Ok(Response::from(&incoming)),
                Ok(incoming) => {
                    tracing::debug!(
                        seq = incoming.seq(),
                        kind = incoming.kind(),
                        "skipping unsolicited packet"
                    );
                    continue;
                }
                Err(e) => e,
            };
            match err {
                CommError::NoData => {}
                // A bad packet that did not answer our request; keep waiting.
                e if !e.is_fatal() && self.is_awaiting(seq) => {
                    tracing::debug!(seq, "skipping bad packet: {}", e);
                    continue;
                }
                e => return Err(e.into()),
            }
            if let Err(e) = self.wait(deadline) {
                self.comm.cancel_request();
                return Err(e);
            }
        }
    }

    /// Like `call`, but turns a non-OK status into `ClientError::ServerError`.
    pub fn request(&mut self, kind: u16, data: &[u8]) -> Result<Response, ClientError> {
        let response = self.call(kind, data)?;
        if !response.is_ok() {
            return Err(ClientError::ServerError {
                code: response.status,
            });
        }
        Ok(response)
    }

    /// Sends `data` to the server and returns what it echoed.
    pub fn echo(&mut self, data: &[u8]) -> Result<Bytes, ClientError> {
        let response = self.request(CommAction::Echo.kind(), data)?;
        Ok(response.payload)
    }

    /// Checks that the server is still answering.
    pub fn keep_alive(&mut self) -> Result<(), ClientError> {
        self.request(CommAction::KeepAlive.kind(), &[])?;
        Ok(())
    }

    /// Tells the server we are done and releases the transport.
    pub fn close(&mut self) -> Result<(), ClientError> {
        if self.comm.is_connected() {
            if let Err(e) = self.request(CommAction::Close.kind(), &[]) {
                tracing::debug!("Close request failed: {}", e);
            }
        }
        self.comm.cleanup()?;
        Ok(())
    }

    fn is_awaiting(&self, seq: u16) -> bool {
        self.comm.state() == ClientState::AwaitingResponse { seq }
    }

    fn wait(&self, deadline: Instant) -> Result<(), ClientError> {
        if Instant::now() >= deadline {
            return Err(ClientError::Timeout);
        }
        std::thread::sleep(self.poll_interval);
        Ok(())
    }
}
