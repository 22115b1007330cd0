//! hsmcomm-cli - Command-line client for hsmcomm servers
//!
//! Connects over TCP, performs the init handshake and runs one command.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use hsmcomm_client::{Client, ClientConfig};
use hsmcomm_transport::{TcpClientConfig, TcpClientTransport};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hsmcomm-cli")]
#[command(about = "Command-line client for hsmcomm servers")]
#[command(version)]
pub struct Cli {
    /// Server address
    #[arg(short, long, env = "HSMCOMM_SERVER", default_value = "127.0.0.1:7410")]
    server: SocketAddr,

    /// Client identifier sent in every request
    #[arg(short, long, env = "HSMCOMM_CLIENT_ID", default_value_t = 1)]
    client_id: u16,

    /// Response timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the identifiers exchanged in the init handshake
    Info,

    /// Send keep-alive messages and report round-trip times
    Ping {
        /// Number of keep-alives to send
        #[arg(short = 'n', long, default_value_t = 4)]
        count: u32,
    },

    /// Send data and print what the server echoes back
    Echo {
        /// Data to send
        data: String,
    },

    /// Send a raw request and print the response
    Call {
        /// Message type, e.g. 0x0A01
        #[arg(value_parser = commands::parse_kind)]
        kind: u16,

        /// Payload as hex
        #[arg(default_value = "")]
        payload: String,
    },
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut client =
        Client::new(TcpClientTransport::new()).with_timeout(Duration::from_millis(cli.timeout_ms));
    let config = ClientConfig::new(TcpClientConfig::new(cli.server), cli.client_id);
    if let Err(e) = client.connect(&config) {
        eprintln!("{}: {}", "Connection failed".red(), e);
        std::process::exit(1);
    }

    let result = commands::execute(&mut client, cli.command);
    if let Err(e) = client.close() {
        tracing::debug!("close failed: {}", e);
    }

    match result {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
