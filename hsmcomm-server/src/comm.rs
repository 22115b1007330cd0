//! Server session state machine.
//!
//! A `CommServer` owns one transport and one packet buffer. After
//! `recv_request` hands out a request the context is `Handling` it and will
//! not accept another until `send_response` answers with the same sequence
//! number or `skip_request` abandons it. Responses with any other sequence
//! number are server-originated notifications and leave the state alone.

use hsmcomm_protocol::{check_magic, CommError, Header, Incoming, Packet, Transport, DATA_LEN};

/// Server configuration handed to `CommServer::init`.
#[derive(Debug, Clone)]
pub struct ServerConfig<C> {
    /// Transport-specific configuration.
    pub transport_config: C,
    /// Identifier reported to clients during the init handshake.
    pub server_id: u16,
}

impl<C> ServerConfig<C> {
    pub fn new(transport_config: C, server_id: u16) -> Self {
        Self {
            transport_config,
            server_id,
        }
    }
}

/// Server session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not initialized, or cleaned up.
    Uninitialized,
    /// Waiting for a request.
    Idle,
    /// The request with this sequence number has not been answered yet.
    Handling { seq: u16 },
    /// The transport failed; the context must be cleaned up.
    Disconnected,
}

/// Server comm context.
pub struct CommServer<T: Transport> {
    transport: T,
    packet: Packet,
    /// Sequence number of the last request received.
    reqid: u16,
    /// Client identifier from the `aux` field of the last request.
    client_id: u16,
    server_id: u16,
    state: ServerState,
    /// Header of the last request refused for a foreign protocol version.
    rejected: Option<Header>,
}

impl<T: Transport> CommServer<T> {
    /// Creates an uninitialized context around `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            packet: Packet::new(),
            reqid: 0,
            client_id: 0,
            server_id: 0,
            state: ServerState::Uninitialized,
            rejected: None,
        }
    }

    /// Resets the context and initializes the transport.
    pub fn init(&mut self, config: &ServerConfig<T::Config>) -> Result<(), CommError> {
        self.reset();
        self.server_id = config.server_id;

        self.transport
            .init(&config.transport_config)
            .map_err(|e| {
                tracing::warn!("Server transport init failed: {}", e);
                CommError::Transport(e)
            })?;

        self.state = ServerState::Idle;
        tracing::debug!(server_id = self.server_id, "comm server initialized");
        Ok(())
    }

    /// Receives a buffered request, if one has arrived.
    ///
    /// Returns `NoData` when nothing is available. A request with a foreign
    /// protocol version is consumed and reported as `ProtocolMismatch`.
    pub fn recv_request(&mut self) -> Result<Incoming<'_>, CommError> {
        match self.state {
            ServerState::Idle => {}
            ServerState::Handling { .. } => {
                return Err(CommError::ProtocolViolation(
                    "request received before previous one was answered",
                ))
            }
            ServerState::Uninitialized | ServerState::Disconnected => {
                return Err(CommError::NotInitialized)
            }
        }

        let len = match self.transport.recv(self.packet.recv_buf()) {
            Ok(0) => return Err(CommError::NoData),
            Ok(n) => n,
            Err(e) => return Err(self.fail(CommError::from_recv(e))),
        };
        let header = self.packet.commit_recv(len).map_err(|e| {
            tracing::warn!("Dropping malformed request: {}", e);
            e
        })?;
        if let Err(e) = check_magic(header.magic) {
            tracing::warn!(seq = header.seq, "Request rejected: {}", e);
            self.rejected = Some(header);
            return Err(e);
        }

        self.reqid = header.seq;
        self.client_id = header.aux;
        self.state = ServerState::Handling { seq: header.seq };
        tracing::trace!(
            seq = header.seq,
            kind = header.kind,
            client_id = header.aux,
            size = len - hsmcomm_protocol::HEADER_LEN,
            "request received"
        );

        Ok(Incoming {
            header,
            payload: self.packet.payload(),
        })
    }

    /// Sends a response, or a notification when `seq` is not the one being
    /// handled. `status` goes into the `aux` field.
    pub fn send_response(
        &mut self,
        magic: u16,
        kind: u16,
        seq: u16,
        status: u16,
        data: &[u8],
    ) -> Result<(), CommError> {
        if matches!(
            self.state,
            ServerState::Uninitialized | ServerState::Disconnected
        ) {
            return Err(CommError::NotInitialized);
        }
        if data.len() > DATA_LEN {
            return Err(CommError::InvalidArgument(format!(
                "payload of {} bytes exceeds {} byte limit",
                data.len(),
                DATA_LEN
            )));
        }
        check_magic(magic)?;

        self.packet
            .write(&Header::new(magic, kind, seq, status), data)?;
        if let Err(e) = self.transport.send(self.packet.as_bytes()) {
            return Err(self.fail(CommError::from_send(e)));
        }

        match self.state {
            ServerState::Handling { seq: pending } if pending == seq => {
                self.state = ServerState::Idle;
                tracing::trace!(seq, kind, status, size = data.len(), "response sent");
            }
            _ => tracing::debug!(seq, kind, "notification sent"),
        }
        Ok(())
    }

    /// Returns the header of the last request refused with
    /// `ProtocolMismatch`, so the caller can tell the peer why.
    pub fn take_rejected(&mut self) -> Option<Header> {
        self.rejected.take()
    }

    /// Abandons the request being handled, returning its sequence number.
    pub fn skip_request(&mut self) -> Option<u16> {
        match self.state {
            ServerState::Handling { seq } => {
                self.state = ServerState::Idle;
                tracing::debug!(seq, "request skipped");
                Some(seq)
            }
            _ => None,
        }
    }

    /// Releases the transport. Calling this on an uninitialized context is a
    /// no-op.
    pub fn cleanup(&mut self) -> Result<(), CommError> {
        if self.state == ServerState::Uninitialized {
            return Ok(());
        }
        let result = self.transport.cleanup();
        self.reset();
        tracing::debug!("comm server cleaned up");
        result.map_err(CommError::Transport)
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ServerState::Idle | ServerState::Handling { .. })
    }

    /// Client identifier learned from the last request.
    pub fn client_id(&self) -> u16 {
        self.client_id
    }

    pub fn server_id(&self) -> u16 {
        self.server_id
    }

    /// Sequence number of the last request received.
    pub fn last_request_id(&self) -> u16 {
        self.reqid
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn fail(&mut self, err: CommError) -> CommError {
        if err.is_fatal() {
            tracing::warn!("Server transport failed: {}", err);
            self.state = ServerState::Disconnected;
        }
        err
    }

    fn reset(&mut self) {
        self.packet.clear();
        self.reqid = 0;
        self.client_id = 0;
        self.server_id = 0;
        self.state = ServerState::Uninitialized;
        self.rejected = None;
    }
}

impl<T: Transport> std::fmt::Debug for CommServer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommServer")
            .field("state", &self.state)
            .field("reqid", &self.reqid)
            .field("client_id", &self.client_id)
            .field("server_id", &self.server_id)
            .finish()
    }
}
