//! The relay session: two fixed routes driven by a readiness loop.
//!
//! ```text
//!   stdin ───────────────► connection
//!   connection ──────────► stdout      (echo off)
//!   connection ──┐
//!        ▲───────┘                     (echo on)
//! ```
//!
//! Each iteration waits until stdin or the connection is readable, then moves
//! at most one chunk per ready route. The session ends as soon as either
//! source reaches end of stream, or on the first fatal I/O error.

use super::endpoint::{Endpoint, Stream};
use super::error::RelayError;
use super::poller;
use super::transfer::{transfer, Transfer, CHUNK_SIZE};
use tracing::debug;

/// Why a session stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Standard input reached end of stream.
    InputClosed,
    /// The peer closed the connection.
    ConnectionClosed,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::InputClosed => write!(f, "stdin closed"),
            Termination::ConnectionClosed => write!(f, "connection closed"),
        }
    }
}

/// Session state after one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Terminated(Termination),
}

/// A fixed direction of byte flow.
#[derive(Debug)]
struct Route<'fd> {
    source: Endpoint<'fd>,
    destination: Endpoint<'fd>,
    /// Bytes delivered to `destination` so far.
    forwarded: u64,
}

impl<'fd> Route<'fd> {
    fn new(source: Endpoint<'fd>, destination: Endpoint<'fd>) -> Self {
        Self {
            source,
            destination,
            forwarded: 0,
        }
    }

    fn forward(&mut self, chunk: &mut [u8]) -> Result<Transfer, RelayError> {
        let result = transfer(&self.source, &self.destination, chunk)?;
        if let Transfer::Forwarded(n) = result {
            self.forwarded += n as u64;
        }
        Ok(result)
    }
}

/// Relay between stdin/stdout and one connection.
pub struct Session<'fd> {
    input: Endpoint<'fd>,
    connection: Endpoint<'fd>,
    inbound: Route<'fd>,
    outbound: Route<'fd>,
    chunk: Box<[u8; CHUNK_SIZE]>,
}

impl<'fd> Session<'fd> {
    /// Build the routes and put every endpoint in non-blocking mode.
    pub fn new(
        input: Endpoint<'fd>,
        output: Endpoint<'fd>,
        connection: Endpoint<'fd>,
        echo: bool,
    ) -> Self {
        input.set_non_blocking();
        output.set_non_blocking();
        connection.set_non_blocking();

        let destination = if echo { connection } else { output };

        Self {
            input,
            connection,
            inbound: Route::new(input, connection),
            outbound: Route::new(connection, destination),
            chunk: Box::new([0u8; CHUNK_SIZE]),
        }
    }

    /// Run until a source closes or an I/O error occurs.
    pub fn run(&mut self) -> Result<Termination, RelayError> {
        debug!(
            input = self.input.name(),
            connection = self.connection.name(),
            to = self.outbound.destination.name(),
            "Relay session running"
        );

        loop {
            if let SessionState::Terminated(reason) = self.step()? {
                debug!(
                    %reason,
                    inbound_bytes = self.inbound.forwarded,
                    outbound_bytes = self.outbound.forwarded,
                    "Relay session terminated"
                );
                return Ok(reason);
            }
        }
    }

    /// One readiness wait followed by at most one transfer per route.
    pub fn step(&mut self) -> Result<SessionState, RelayError> {
        let [input_ready, connection_ready] =
            poller::wait_readable([self.input.fd(), self.connection.fd()]).map_err(|e| {
                RelayError::Wait {
                    endpoint: format!("{}, {}", self.input.name(), self.connection.name()),
                    source: e,
                }
            })?;

        if input_ready && self.inbound.forward(&mut self.chunk[..])? == Transfer::Closed {
            return Ok(SessionState::Terminated(Termination::InputClosed));
        }

        if connection_ready && self.outbound.forward(&mut self.chunk[..])? == Transfer::Closed {
            return Ok(SessionState::Terminated(Termination::ConnectionClosed));
        }

        Ok(SessionState::Running)
    }
}
