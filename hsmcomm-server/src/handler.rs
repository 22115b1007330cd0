//! Handler boundary for message groups the dispatch loop does not answer
//! itself.

use hsmcomm_protocol::{ErrorCode, MessageKind};

/// A request as seen by a handler.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    /// Magic of the request; use it to translate integers in `payload`.
    pub magic: u16,
    pub kind: MessageKind,
    pub seq: u16,
    /// Client identifier from the request's `aux` field.
    pub client_id: u16,
    pub payload: &'a [u8],
}

/// Handles requests outside the comm group.
///
/// The handler writes its response payload into `response` and returns the
/// number of bytes written. An error is sent back as the response status with
/// an empty payload.
pub trait RequestHandler {
    fn handle(&mut self, request: &Request<'_>, response: &mut [u8]) -> Result<usize, ErrorCode>;
}

impl<F> RequestHandler for F
where
    F: FnMut(&Request<'_>, &mut [u8]) -> Result<usize, ErrorCode>,
{
    fn handle(&mut self, request: &Request<'_>, response: &mut [u8]) -> Result<usize, ErrorCode> {
        self(request, response)
    }
}

/// Handler that rejects every request with `UnsupportedType`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

impl RequestHandler for Unsupported {
    fn handle(&mut self, request: &Request<'_>, _response: &mut [u8]) -> Result<usize, ErrorCode> {
        tracing::debug!(kind = %request.kind, "no handler for message type");
        Err(ErrorCode::UnsupportedType)
    }
}
