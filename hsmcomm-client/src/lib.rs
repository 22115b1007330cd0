//! # hsmcomm-client
//!
//! Client side of the hsmcomm request/response layer.
//!
//! This crate provides:
//! - `CommClient`, the non-blocking client session state machine
//! - `Client`, a convenience wrapper that polls until a deadline and speaks
//!   the comm message group (init handshake, echo, close)

pub mod client;
pub mod comm;
pub mod error;

pub use client::{Client, Response};
pub use comm::{ClientConfig, ClientState, CommClient};
pub use error::ClientError;
