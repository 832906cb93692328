//! Retry and backoff for chunk connections.
//!
//! A worker that loses its connection mid-chunk reconnects from the last
//! byte it handed to the writer. Failures are counted per chunk and only
//! while the chunk stands still: any progress between two failures starts a
//! fresh budget. Throttling answers (429, 503) wait as long as the server's
//! `Retry-After` asks, up to the configured ceiling.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_http_error, classify_http_status};
pub use error::AttemptError;
pub use policy::{ChunkRetries, ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
