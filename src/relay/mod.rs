//! Byte relay between the standard streams and one connection.
//!
//! Layers, leaf first:
//! - `endpoint`: non-blocking reads and writes on a borrowed descriptor
//! - `transfer`: moves one chunk, absorbing short writes and back-pressure
//! - `poller`: level-triggered readiness waits, retried on `EINTR`
//! - `session`: the two routes and the loop that drives them
//!
//! Everything runs on the calling thread. The only blocking points are the
//! session's readiness wait and a transfer's wait for its destination to
//! become writable.

mod endpoint;
mod error;
mod poller;
mod session;
mod transfer;

pub use endpoint::Endpoint;
pub use error::RelayError;
pub use session::{Session, Termination};

use std::os::fd::BorrowedFd;

/// Relay stdin to `connection` and `connection` to stdout (or back to
/// itself when `echo` is set) until either side closes.
pub fn run(connection: BorrowedFd<'_>, echo: bool) -> Result<Termination, RelayError> {
    Session::new(
        Endpoint::stdin(),
        Endpoint::stdout(),
        Endpoint::new(connection, "connection"),
        echo,
    )
    .run()
}
