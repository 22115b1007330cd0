//! Client session state machine.
//!
//! A `CommClient` owns one transport and one packet buffer. At most one
//! request is outstanding at a time: `send_request` moves the context to
//! `AwaitingResponse` and only a response carrying the same sequence number
//! returns it to `Idle`. Nothing here blocks; callers poll `recv_response`.

use hsmcomm_protocol::{
    check_magic, CommError, Header, Incoming, Packet, Transport, DATA_LEN, NOTIFY_SEQ,
};

/// Client configuration handed to `CommClient::init`.
#[derive(Debug, Clone)]
pub struct ClientConfig<C> {
    /// Transport-specific configuration.
    pub transport_config: C,
    /// Identifier sent in the `aux` field of every request.
    pub client_id: u16,
}

impl<C> ClientConfig<C> {
    pub fn new(transport_config: C, client_id: u16) -> Self {
        Self {
            transport_config,
            client_id,
        }
    }
}

/// Client session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not initialized, or cleaned up.
    Uninitialized,
    /// Connected, no request outstanding.
    Idle,
    /// A request with this sequence number has not been answered yet.
    AwaitingResponse { seq: u16 },
    /// The transport failed; the context must be cleaned up.
    Disconnected,
}

/// Client comm context.
pub struct CommClient<T: Transport> {
    transport: T,
    packet: Packet,
    /// Sequence number of the last request sent.
    reqid: u16,
    /// Sequence number of the last packet received.
    seq: u16,
    /// Payload size of the last packet received.
    size: usize,
    client_id: u16,
    server_id: u16,
    state: ClientState,
}

impl<T: Transport> CommClient<T> {
    /// Creates an uninitialized context around `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            packet: Packet::new(),
            reqid: 0,
            seq: 0,
            size: 0,
            client_id: 0,
            server_id: 0,
            state: ClientState::Uninitialized,
        }
    }

    /// Resets the context and initializes the transport.
    pub fn init(&mut self, config: &ClientConfig<T::Config>) -> Result<(), CommError> {
        self.reset();
        self.client_id = config.client_id;

        self.transport
            .init(&config.transport_config)
            .map_err(|e| {
                tracing::warn!("Client transport init failed: {}", e);
                CommError::Transport(e)
            })?;

        self.state = ClientState::Idle;
        tracing::debug!(client_id = self.client_id, "comm client initialized");
        Ok(())
    }

    /// Sends a new request and returns its sequence number.
    ///
    /// Sequence numbers wrap at `u16` and skip `NOTIFY_SEQ`.
    /// Fails with `Busy` if the transport cannot take the packet right now;
    /// the sequence counter only advances once the transport accepts it.
    pub fn send_request(&mut self, magic: u16, kind: u16, data: &[u8]) -> Result<u16, CommError> {
        match self.state {
            ClientState::Idle => {}
            ClientState::AwaitingResponse { .. } => {
                return Err(CommError::ProtocolViolation(
                    "request sent before previous response was received",
                ))
            }
            ClientState::Uninitialized | ClientState::Disconnected => {
                return Err(CommError::NotInitialized)
            }
        }
        if data.len() > DATA_LEN {
            return Err(CommError::InvalidArgument(format!(
                "payload of {} bytes exceeds {} byte limit",
                data.len(),
                DATA_LEN
            )));
        }
        check_magic(magic)?;

        let mut seq = self.reqid.wrapping_add(1);
        if seq == NOTIFY_SEQ {
            seq = seq.wrapping_add(1);
        }
        let header = Header::new(magic, kind, seq, self.client_id);
        self.packet.write(&header, data)?;

        if let Err(e) = self.transport.send(self.packet.as_bytes()) {
            return Err(self.fail(CommError::from_send(e)));
        }

        self.reqid = seq;
        self.state = ClientState::AwaitingResponse { seq };
        tracing::trace!(seq, kind, size = data.len(), "request sent");
        Ok(seq)
    }

    /// Receives a buffered response, if one has arrived.
    ///
    /// Returns `NoData` when nothing is available. A packet whose sequence
    /// number does not match the outstanding request is handed back as an
    /// unsolicited notification and leaves the request outstanding.
    pub fn recv_response(&mut self) -> Result<Incoming<'_>, CommError> {
        if matches!(
            self.state,
            ClientState::Uninitialized | ClientState::Disconnected
        ) {
            return Err(CommError::NotInitialized);
        }

        let len = match self.transport.recv(self.packet.recv_buf()) {
            Ok(0) => return Err(CommError::NoData),
            Ok(n) => n,
            Err(e) => return Err(self.fail(CommError::from_recv(e))),
        };
        let header = self.packet.commit_recv(len).map_err(|e| {
            tracing::warn!("Dropping malformed response: {}", e);
            e
        })?;

        self.seq = header.seq;
        self.size = self.packet.payload().len();

        let answers_request = matches!(
            self.state,
            ClientState::AwaitingResponse { seq } if seq == header.seq
        );
        if answers_request {
            self.state = ClientState::Idle;
        }

        if let Err(e) = check_magic(header.magic) {
            tracing::warn!(seq = header.seq, "Response rejected: {}", e);
            return Err(e);
        }

        if answers_request {
            tracing::trace!(
                seq = header.seq,
                kind = header.kind,
                size = self.size,
                "response received"
            );
        } else {
            tracing::debug!(
                seq = header.seq,
                kind = header.kind,
                state = ?self.state,
                "unsolicited packet received"
            );
        }

        Ok(Incoming {
            header,
            payload: self.packet.payload(),
        })
    }

    /// Abandons the outstanding request, returning its sequence number.
    ///
    /// A response that arrives later is reported as unsolicited.
    pub fn cancel_request(&mut self) -> Option<u16> {
        match self.state {
            ClientState::AwaitingResponse { seq } => {
                self.state = ClientState::Idle;
                tracing::debug!(seq, "request abandoned");
                Some(seq)
            }
            _ => None,
        }
    }

    /// Signals the server where the transport supports it and releases the
    /// transport. Calling this on an uninitialized context is a no-op.
    pub fn cleanup(&mut self) -> Result<(), CommError> {
        if self.state == ClientState::Uninitialized {
            return Ok(());
        }
        let result = self.transport.cleanup();
        self.reset();
        tracing::debug!("comm client cleaned up");
        result.map_err(CommError::Transport)
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Returns whether the context can send or receive.
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state,
            ClientState::Idle | ClientState::AwaitingResponse { .. }
        )
    }

    pub fn client_id(&self) -> u16 {
        self.client_id
    }

    /// Server identifier learned from the init handshake, 0 if unknown.
    pub fn server_id(&self) -> u16 {
        self.server_id
    }

    pub fn set_server_id(&mut self, server_id: u16) {
        self.server_id = server_id;
    }

    /// Sequence number of the last request sent.
    pub fn last_request_id(&self) -> u16 {
        self.reqid
    }

    /// Sequence number of the last packet received.
    pub fn last_seq(&self) -> u16 {
        self.seq
    }

    /// Payload size of the last packet received.
    pub fn last_size(&self) -> usize {
        self.size
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn fail(&mut self, err: CommError) -> CommError {
        if err.is_fatal() {
            tracing::warn!("Client transport failed: {}", err);
            self.state = ClientState::Disconnected;
        }
        err
    }

    fn reset(&mut self) {
        self.packet.clear();
        self.reqid = 0;
        self.seq = 0;
        self.size = 0;
        self.client_id = 0;
        self.server_id = 0;
        self.state = ClientState::Uninitialized;
    }
}

impl<T: Transport> std::fmt::Debug for CommClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommClient")
            .field("state", &self.state)
            .field("reqid", &self.reqid)
            .field("seq", &self.seq)
            .field("client_id", &self.client_id)
            .field("server_id", &self.server_id)
            .finish()
    }
}
