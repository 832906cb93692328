//! Safe resume: re-validate ETag/Last-Modified/size before resuming.
//!
//! On resume the task re-probes the URL and compares the result with the
//! stored record and chunk plan. Any difference means the bytes already on
//! disk may belong to another version of the resource; the task then fails
//! with `ContentExpired` and only a restart from zero can continue it.

mod validate;

pub use validate::{validate_for_resume, ValidationError, ValidationErrorKind};
