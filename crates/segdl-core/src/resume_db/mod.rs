//! Persistent task database (SQLite via sqlx).
//!
//! One `tasks` row per download and one `chunks` row per byte range. Chunk
//! progress is what makes a crash survivable: a resumed task re-fetches only
//! the bytes after each chunk's `start + downloaded`.

mod db;
mod tasks;
mod types;

pub use db::ResumeDb;
pub(crate) use db::unix_millis;
pub use types::*;

#[cfg(test)]
pub(crate) use db::open_memory;

#[cfg(test)]
mod tests;
