//! hsmcomm - comm layer server daemon
//!
//! Binds the TCP transport and runs the dispatch loop until Ctrl-C. A
//! session ends when the client sends Close or the connection drops; the
//! server then re-initializes and waits for the next client.

use hsmcomm_protocol::CommAction;
use hsmcomm_server::{Config, RequestHandler, Server, ServerConfig, ServerError, Unsupported};
use hsmcomm_transport::{TcpServerConfig, TcpServerTransport};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

type Dispatcher = Server<TcpServerTransport, Unsupported>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if HSMCOMM_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("HSMCOMM_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("HSMCOMM_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    tracing::info!("Starting hsmcomm server");
    tracing::info!("  Bind address: {}", config.transport.bind_addr);
    tracing::info!("  Server id: {}", config.comm.server_id);
    tracing::info!("  Poll interval: {}ms", config.dispatch.poll_interval_ms);

    let comm_config = ServerConfig::new(
        TcpServerConfig::new(config.transport.bind_addr),
        config.comm.server_id,
    );
    let mut server: Dispatcher = Server::new(TcpServerTransport::new(), Unsupported);
    server.init(&comm_config)?;

    let mut ticker = tokio::time::interval(config.dispatch.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Received shutdown signal, stopping server...");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = drain(&mut server) {
                    tracing::info!("Session ended: {}", e);
                    if let Err(e) = server.cleanup() {
                        tracing::warn!("Cleanup failed: {}", e);
                    }
                    server.init(&comm_config)?;
                }
                if server.finish_closed_session(&comm_config)? {
                    tracing::info!("Waiting for next client");
                }
            }
        }
    }

    if config.dispatch.notify_on_shutdown && server.comm().is_connected() {
        if let Err(e) = server.notify(CommAction::Close.kind(), &[]) {
            tracing::debug!("Shutdown notification not sent: {}", e);
        }
    }
    server.cleanup()?;

    let stats = server.stats();
    tracing::info!(
        requests = stats.requests,
        responses = stats.responses,
        notifications = stats.notifications,
        errors = stats.errors,
        "Server stopped"
    );
    Ok(())
}

/// Handles requests until the transport has nothing more. Returns only fatal
/// errors.
fn drain<H: RequestHandler>(
    server: &mut Server<TcpServerTransport, H>,
) -> Result<(), ServerError> {
    loop {
        match server.handle_request_message() {
            Ok(()) => {}
            Err(e) if e.is_would_block() => return Ok(()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => tracing::warn!("Dropped request: {}", e),
        }
    }
}
