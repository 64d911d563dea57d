//! vsock-relay: relay stdin/stdout over a single vsock connection
//!
//! Listens on a vsock port (or a TCP port), accepts exactly one connection,
//! then moves bytes until either side closes:
//! - stdin is written to the connection
//! - data from the connection goes to stdout, or back to the connection
//!   with `--echo`
//!
//! Used to check connectivity between a host and a guest microVM.
//! Diagnostics go to stderr; stdout only ever carries relayed bytes.

mod config;
mod listener;
mod relay;

use config::Config;
use listener::Listener;
use std::os::fd::AsFd;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        listen = %config.listen,
        echo = config.echo,
        "Starting vsock-relay"
    );

    let accepted = Listener::bind(&config.listen)
        .and_then(Listener::accept_one)
        .inspect_err(|e| {
            error!(listen = %config.listen, error = %e, "Failed to accept connection");
        })?;

    match relay::run(accepted.socket.as_fd(), config.echo) {
        Ok(reason) => {
            info!(peer = %accepted.peer, %reason, "Relay finished");
            Ok(())
        }
        Err(e) => {
            error!(peer = %accepted.peer, error = %e, "Relay failed");
            Err(e.into())
        }
    }
}
