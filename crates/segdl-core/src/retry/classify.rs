//! Maps attempt failures to [`ErrorKind`]s.

use std::time::Duration;

use crate::http::HttpError;
use crate::retry::error::AttemptError;
use crate::retry::policy::ErrorKind;

pub fn classify_http_status(code: u32, retry_after: Option<Duration>) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled { retry_after },
        408 | 500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Permanent,
    }
}

/// A transport failure before any response.
pub fn classify_http_error(e: &HttpError) -> ErrorKind {
    match e {
        HttpError::InvalidUrl(_) => ErrorKind::Permanent,
        HttpError::Connect(_) | HttpError::Timeout(_) | HttpError::Transport(_) => {
            ErrorKind::Transient
        }
    }
}

pub fn classify(e: &AttemptError) -> ErrorKind {
    match e {
        AttemptError::Transport(he) => classify_http_error(he),
        AttemptError::Status { code, retry_after } => classify_http_status(*code, *retry_after),
        AttemptError::Interrupted(_) | AttemptError::PartialTransfer { .. } => ErrorKind::Transient,
        AttemptError::Rejected(_) => ErrorKind::Permanent,
    }
}
