//! Error of a single connection attempt, before it is classified for retry.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::error::DownloadError;
use crate::http::HttpError;
use crate::probe;

/// Why one request (connect + body stream) for a chunk failed.
#[derive(Debug)]
pub enum AttemptError {
    /// No response: DNS, connect, TLS, timeout.
    Transport(HttpError),
    /// Response arrived with a non-success status.
    Status {
        code: u32,
        /// Delay from a `Retry-After` header, when the server sent one.
        retry_after: Option<Duration>,
    },
    /// Body stream broke after some bytes arrived.
    Interrupted(io::Error),
    /// Server closed the body before the chunk was complete.
    PartialTransfer { expected: u64, received: u64 },
    /// Not worth retrying; reported to the task as-is.
    Rejected(DownloadError),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Transport(e) => write!(f, "{}", e),
            AttemptError::Status { code, .. } => write!(f, "HTTP {}", code),
            AttemptError::Interrupted(e) => write!(f, "stream interrupted: {}", e),
            AttemptError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            AttemptError::Rejected(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AttemptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AttemptError::Transport(e) => Some(e),
            AttemptError::Interrupted(e) => Some(e),
            AttemptError::Rejected(e) => Some(e),
            AttemptError::Status { .. } | AttemptError::PartialTransfer { .. } => None,
        }
    }
}

impl From<AttemptError> for DownloadError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::Transport(e) => probe::connect_error(e),
            AttemptError::Status { code, .. } => probe::status_error(code),
            AttemptError::Interrupted(e) => DownloadError::Network(e.to_string()),
            AttemptError::PartialTransfer { .. } => DownloadError::DownloadFailed(err.to_string()),
            AttemptError::Rejected(e) => e,
        }
    }
}
