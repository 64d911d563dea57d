//! Fatal relay errors.

use std::io;

/// An unrecoverable I/O failure that ends the session.
#[derive(Debug)]
pub enum RelayError {
    /// Reading from an endpoint failed.
    Read { endpoint: String, source: io::Error },
    /// Writing to an endpoint failed.
    Write { endpoint: String, source: io::Error },
    /// A write accepted no bytes without reporting would-block.
    WriteZero { endpoint: String },
    /// The readiness wait itself failed.
    Wait { endpoint: String, source: io::Error },
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::Read { endpoint, source } => {
                write!(f, "Failed to read from {}: {}", endpoint, source)
            }
            RelayError::Write { endpoint, source } => {
                write!(f, "Failed to write to {}: {}", endpoint, source)
            }
            RelayError::WriteZero { endpoint } => {
                write!(f, "Write to {} made no progress", endpoint)
            }
            RelayError::Wait { endpoint, source } => {
                write!(f, "Failed waiting for readiness on {}: {}", endpoint, source)
            }
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Read { source, .. }
            | RelayError::Write { source, .. }
            | RelayError::Wait { source, .. } => Some(source),
            RelayError::WriteZero { .. } => None,
        }
    }
}
