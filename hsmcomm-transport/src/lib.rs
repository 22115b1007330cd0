//! # hsmcomm-transport
//!
//! Concrete transports for hsmcomm.
//!
//! This crate provides:
//! - An in-memory channel with one packet slot per direction, standing in
//!   for a shared memory region between two endpoints
//! - A non-blocking TCP transport with length-prefixed packets

pub mod mem;
pub mod tcp;

pub use mem::{channel, MemConfig, MemTransport};
pub use tcp::{TcpClientConfig, TcpClientTransport, TcpServerConfig, TcpServerTransport};
