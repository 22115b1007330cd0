//! Dispatch loop.
//!
//! `Server` answers comm-group messages itself and forwards every other
//! message group to a `RequestHandler`. Each call to
//! `handle_request_message` makes at most one unit of progress and never
//! blocks; the caller decides how to wait between calls.

use crate::comm::{CommServer, ServerConfig};
use crate::error::ServerError;
use crate::handler::{Request, RequestHandler};
use hsmcomm_protocol::{
    translate16, CommAction, CommError, ErrorCode, Transport, DATA_LEN, MAGIC_NATIVE, NOTIFY_SEQ,
};

/// Dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Requests received and routed.
    pub requests: u64,
    /// Responses delivered to the transport.
    pub responses: u64,
    /// Server-originated notifications sent.
    pub notifications: u64,
    /// Requests dropped or responses lost to errors.
    pub errors: u64,
}

/// A routed response waiting for the transport to accept it.
#[derive(Debug, Clone, Copy)]
struct PendingResponse {
    kind: u16,
    seq: u16,
    status: ErrorCode,
    len: usize,
}

/// Request dispatcher.
pub struct Server<T: Transport, H: RequestHandler> {
    comm: CommServer<T>,
    handler: H,
    response: [u8; DATA_LEN],
    pending: Option<PendingResponse>,
    close_requested: bool,
    stats: ServerStats,
}

impl<T: Transport, H: RequestHandler> Server<T, H> {
    pub fn new(transport: T, handler: H) -> Self {
        Self {
            comm: CommServer::new(transport),
            handler,
            response: [0u8; DATA_LEN],
            pending: None,
            close_requested: false,
            stats: ServerStats::default(),
        }
    }

    /// Initializes the comm context. Counters survive re-initialization.
    pub fn init(&mut self, config: &ServerConfig<T::Config>) -> Result<(), ServerError> {
        self.pending = None;
        self.close_requested = false;
        self.comm.init(config)?;
        tracing::info!(server_id = config.server_id, "Dispatcher ready");
        Ok(())
    }

    /// Handles one request, or flushes a response a previous call could not
    /// send.
    ///
    /// Returns `Ok(())` when progress was made. A would-block error
    /// (`NoData` or `Busy`) means there is nothing to do right now.
    pub fn handle_request_message(&mut self) -> Result<(), ServerError> {
        if self.pending.is_some() {
            return self.flush();
        }

        let server_id = self.comm.server_id();
        let incoming = match self.comm.recv_request() {
            Ok(incoming) => incoming,
            Err(CommError::ProtocolMismatch { magic }) => {
                self.stats.errors += 1;
                return self.refuse_version(magic);
            }
            Err(e) => {
                if !e.is_would_block() {
                    self.stats.errors += 1;
                }
                return Err(e.into());
            }
        };
        self.stats.requests += 1;

        let request = Request {
            magic: incoming.magic(),
            kind: incoming.kind().into(),
            seq: incoming.seq(),
            client_id: incoming.aux(),
            payload: incoming.payload,
        };

        let result = match request.kind.comm_action() {
            Some(action) => {
                if action == CommAction::Close {
                    self.close_requested = true;
                }
                handle_comm(action, &request, &mut self.response, server_id)
            }
            None => self.handler.handle(&request, &mut self.response),
        };
        let (status, len) = match result {
            Ok(len) if len <= DATA_LEN => (ErrorCode::Ok, len),
            Ok(len) => {
                tracing::warn!(kind = %request.kind, len, "Handler overran response buffer");
                (ErrorCode::Internal, 0)
            }
            Err(code) => {
                tracing::debug!(kind = %request.kind, seq = request.seq, "request failed: {}", code);
                (code, 0)
            }
        };

        self.pending = Some(PendingResponse {
            kind: request.kind.as_u16(),
            seq: request.seq,
            status,
            len,
        });
        self.flush()
    }

    /// Sends a server-originated message.
    ///
    /// Notifications always carry `NOTIFY_SEQ`, which clients never use for
    /// a request.
    pub fn notify(&mut self, kind: u16, data: &[u8]) -> Result<(), ServerError> {
        if self.pending.is_some() {
            return Err(CommError::Busy.into());
        }
        self.comm
            .send_response(MAGIC_NATIVE, kind, NOTIFY_SEQ, ErrorCode::Ok.as_u16(), data)?;
        self.stats.notifications += 1;
        Ok(())
    }

    /// Returns whether the client asked to close the session.
    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    /// Ends the session once a Close request has been answered, leaving the
    /// server ready for the next client. Returns whether it did.
    pub fn finish_closed_session(
        &mut self,
        config: &ServerConfig<T::Config>,
    ) -> Result<bool, ServerError> {
        if !self.close_requested || self.pending.is_some() {
            return Ok(false);
        }
        tracing::info!(client_id = self.comm.client_id(), "Session closed");
        self.cleanup()?;
        self.init(config)?;
        Ok(true)
    }

    /// Returns whether a response is waiting for the transport.
    pub fn has_pending_response(&self) -> bool {
        self.pending.is_some()
    }

    /// Releases the transport, dropping any unsent response.
    pub fn cleanup(&mut self) -> Result<(), ServerError> {
        if self.pending.take().is_some() {
            self.stats.errors += 1;
        }
        self.close_requested = false;
        self.comm.cleanup()?;
        Ok(())
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    pub fn comm(&self) -> &CommServer<T> {
        &self.comm
    }

    pub fn comm_mut(&mut self) -> &mut CommServer<T> {
        &mut self.comm
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Answers a request refused for its protocol version with `BadRequest`,
    /// so the peer does not wait out its timeout.
    fn refuse_version(&mut self, magic: u16) -> Result<(), ServerError> {
        let Some(header) = self.comm.take_rejected() else {
            return Err(CommError::ProtocolMismatch { magic }.into());
        };
        self.pending = Some(PendingResponse {
            kind: header.kind,
            seq: header.seq,
            status: ErrorCode::BadRequest,
            len: 0,
        });
        self.flush()
    }

    fn flush(&mut self) -> Result<(), ServerError> {
        let Some(pending) = self.pending else {
            return Ok(());
        };
        let result = self.comm.send_response(
            MAGIC_NATIVE,
            pending.kind,
            pending.seq,
            pending.status.as_u16(),
            &self.response[..pending.len],
        );
        match result {
            Ok(()) => {
                self.pending = None;
                self.stats.responses += 1;
                Ok(())
            }
            Err(CommError::Busy) => Err(CommError::Busy.into()),
            Err(e) => {
                self.pending = None;
                self.stats.errors += 1;
                Err(e.into())
            }
        }
    }
}

impl<T: Transport, H: RequestHandler> std::fmt::Debug for Server<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("comm", &self.comm)
            .field("pending", &self.pending)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Answers a comm-group request into `out`.
fn handle_comm(
    action: CommAction,
    request: &Request<'_>,
    out: &mut [u8],
    server_id: u16,
) -> Result<usize, ErrorCode> {
    match action {
        CommAction::Init => {
            let Some(raw) = request.payload.get(..2) else {
                return Err(ErrorCode::BadRequest);
            };
            let client_id = translate16(request.magic, u16::from_ne_bytes([raw[0], raw[1]]));
            out[..2].copy_from_slice(&client_id.to_ne_bytes());
            out[2..4].copy_from_slice(&server_id.to_ne_bytes());
            tracing::info!(client_id, "Client connected");
            Ok(4)
        }
        CommAction::KeepAlive => Ok(0),
        CommAction::Close => {
            tracing::info!(client_id = request.client_id, "Client closing session");
            Ok(0)
        }
        CommAction::Echo => {
            let len = request.payload.len();
            out[..len].copy_from_slice(request.payload);
            Ok(len)
        }
    }
}
