//! # hsmcomm-server
//!
//! Server side of the hsmcomm request/response layer.
//!
//! This crate provides:
//! - `CommServer`, the non-blocking server session state machine
//! - `Server`, the dispatch loop answering comm-group messages and handing
//!   everything else to a `RequestHandler`
//! - Daemon configuration loaded from YAML and environment variables

pub mod comm;
pub mod config;
pub mod error;
pub mod handler;
pub mod server;

pub use comm::{CommServer, ServerConfig, ServerState};
pub use config::{CommConfig, Config, ConfigError, DispatchConfig, NetworkConfig};
pub use error::ServerError;
pub use handler::{Request, RequestHandler, Unsupported};
pub use server::{Server, ServerStats};
