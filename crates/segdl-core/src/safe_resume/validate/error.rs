//! Error types for safe-resume validation.

use std::fmt;

use crate::error::DownloadError;

/// Result of validating that the remote resource is unchanged and safe to resume.
#[derive(Debug)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
}

#[derive(Debug)]
pub enum ValidationErrorKind {
    /// Remote ETag, Last-Modified, or size changed.
    RemoteChanged {
        etag_changed: bool,
        last_modified_changed: bool,
        size_changed: bool,
    },
    /// Stored chunks are not contiguous or do not add up to the total size.
    InvalidPlan,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValidationErrorKind::RemoteChanged {
                etag_changed,
                last_modified_changed,
                size_changed,
            } => {
                write!(f, "remote resource changed")?;
                let changed: Vec<&str> = [
                    (*etag_changed, "ETag"),
                    (*last_modified_changed, "Last-Modified"),
                    (*size_changed, "size"),
                ]
                .into_iter()
                .filter_map(|(hit, name)| hit.then_some(name))
                .collect();
                if !changed.is_empty() {
                    write!(f, " ({})", changed.join(", "))?;
                }
                Ok(())
            }
            ValidationErrorKind::InvalidPlan => write!(f, "stored chunk plan is inconsistent"),
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for DownloadError {
    fn from(err: ValidationError) -> Self {
        DownloadError::ContentExpired(err.to_string())
    }
}
