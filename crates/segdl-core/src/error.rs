//! Download failure classification.
//!
//! Every failure a task can end with maps to a numeric code. Codes below
//! [`FATAL_THRESHOLD`] are recoverable: the task lands in `Error`, keeps its
//! chunk records and can be resumed. Codes at or above it put the task in
//! `FatalError`; only an explicit restart brings it back.

use std::io;

/// First numeric code that counts as fatal.
pub const FATAL_THRESHOLD: u32 = 100;

/// Why a download task stopped with an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownloadError {
    #[error("destination already exists: {0}")]
    FileExists(String),
    #[error("downloads are not allowed on the current network")]
    NetworkDisallowed,
    #[error("download failed: {0}")]
    DownloadFailed(String),
    #[error("failed to write file: {0}")]
    WriteFile(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("not enough disk space: {0}")]
    SpaceFull(String),
    #[error("cannot create directory: {0}")]
    CreateDir(String),
    #[error("cannot create task: {0}")]
    CreateTask(String),
    #[error("invalid url: {0}")]
    IllegalUrl(String),
    #[error("server returned an empty response")]
    EmptyResponse,
    #[error("server refused the request: {0}")]
    ConnectFatal(String),
    #[error("remote content changed: {0}")]
    ContentExpired(String),
}

impl DownloadError {
    /// Stable numeric code, persisted alongside the error message.
    pub fn code(&self) -> u32 {
        match self {
            DownloadError::FileExists(_) => 0,
            DownloadError::NetworkDisallowed => 1,
            DownloadError::DownloadFailed(_) => 2,
            DownloadError::WriteFile(_) => 3,
            DownloadError::Network(_) => 4,
            DownloadError::Connect(_) => 5,
            DownloadError::SpaceFull(_) => 100,
            DownloadError::CreateDir(_) => 101,
            DownloadError::CreateTask(_) => 102,
            DownloadError::IllegalUrl(_) => 103,
            DownloadError::EmptyResponse => 104,
            DownloadError::ConnectFatal(_) => 105,
            DownloadError::ContentExpired(_) => 106,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.code() >= FATAL_THRESHOLD
    }

    /// Maps a failed file write: out-of-space is fatal, anything else is not.
    pub fn from_write(err: &io::Error) -> Self {
        if is_no_space(err) {
            DownloadError::SpaceFull(err.to_string())
        } else {
            DownloadError::WriteFile(err.to_string())
        }
    }

    /// Same as [`DownloadError::from_write`] for errors already wrapped by anyhow.
    pub fn from_storage(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<io::Error>() {
            Some(io_err) => DownloadError::from_write(io_err),
            None => DownloadError::WriteFile(format!("{err:#}")),
        }
    }
}

#[cfg(unix)]
fn is_no_space(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOSPC)
}

#[cfg(not(unix))]
fn is_no_space(_err: &io::Error) -> bool {
    false
}
