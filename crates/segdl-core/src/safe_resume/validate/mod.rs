//! Compares a stored task and its chunk plan with a fresh probe.

mod error;

use crate::chunker;
use crate::probe::ProbeResult;
use crate::resume_db::{ChunkRecord, TaskRecord};

pub use error::{ValidationError, ValidationErrorKind};

/// Returns Ok(()) if the task can be safely resumed against the current probe result.
///
/// A task that was never probed has nothing to compare and passes. Otherwise
/// ETag, Last-Modified and size must match, and the chunk plan must still
/// tile the stored total exactly.
pub fn validate_for_resume(
    record: &TaskRecord,
    chunks: &[ChunkRecord],
    probe: &ProbeResult,
) -> Result<(), ValidationError> {
    let has_stored =
        record.total_size.is_some() || record.etag.is_some() || record.last_modified.is_some();

    if has_stored {
        let etag_changed = match (&record.etag, &probe.etag) {
            (None, None) => false,
            (Some(a), Some(b)) => a != b,
            _ => true,
        };

        let last_modified_changed = match (&record.last_modified, &probe.last_modified) {
            (None, None) => false,
            (Some(a), Some(b)) => a != b,
            _ => true,
        };

        let size_changed = record.total_size != probe.total_size;

        if etag_changed || last_modified_changed || size_changed {
            return Err(ValidationError {
                kind: ValidationErrorKind::RemoteChanged {
                    etag_changed,
                    last_modified_changed,
                    size_changed,
                },
            });
        }
    }

    if !chunks.is_empty() && !chunker::is_valid_plan(chunks, record.total_size) {
        return Err(ValidationError {
            kind: ValidationErrorKind::InvalidPlan,
        });
    }

    Ok(())
}
