//! URL checks and filename derivation.
//!
//! A task submitted without a filename gets one from the server's
//! Content-Disposition header or, failing that, the URL path. The choice is
//! made by a [`FilenamePolicy`] so embedders can plug in their own rules.

mod content_disposition;
mod path;
mod sanitize;

use std::path::Path;

use crate::error::DownloadError;

pub use content_disposition::parse_content_disposition_filename;
pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename;

/// Default filename when URL path and Content-Disposition yield nothing usable.
pub const DEFAULT_FILENAME: &str = "download.bin";

/// Picks the local filename for a task that was submitted without one.
pub trait FilenamePolicy: Send + Sync {
    fn derive(&self, url: &str, content_disposition: Option<&str>) -> String;
}

/// Content-Disposition first, then the URL path, sanitized.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFilenamePolicy;

impl FilenamePolicy for DefaultFilenamePolicy {
    fn derive(&self, url: &str, content_disposition: Option<&str>) -> String {
        derive_filename(url, content_disposition)
    }
}

/// Derives a safe filename for saving a download.
///
/// - `derive_filename("https://example.com/archive.zip", None)` → `"archive.zip"`
/// - `derive_filename("https://example.com/", Some("attachment; filename=\"report.pdf\""))` → `"report.pdf"`
pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    let candidates = [
        content_disposition.and_then(parse_content_disposition_filename),
        filename_from_url_path(url),
    ];
    candidates
        .into_iter()
        .flatten()
        .map(|raw| sanitize_filename(&raw))
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

/// Accepts absolute http(s) URLs with a host; anything else is `IllegalUrl`.
pub fn validate_url(raw: &str) -> Result<url::Url, DownloadError> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| DownloadError::IllegalUrl(format!("{raw}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(DownloadError::IllegalUrl(format!(
                "{raw}: unsupported scheme {other}"
            )))
        }
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(DownloadError::IllegalUrl(format!("{raw}: missing host")));
    }
    Ok(parsed)
}

/// `name` if nothing occupies it in `dir` (neither the file nor its temp
/// file), else the first free `stem(n).ext`.
pub fn unique_filename(dir: &Path, name: &str) -> String {
    let taken = |candidate: &str| {
        let dest = dir.join(candidate);
        dest.exists() || crate::storage::temp_path(&dest).exists()
    };
    if !taken(name) {
        return name.to_string();
    }
    let (stem, ext) = sanitize::split_extension(name);
    (1u32..)
        .map(|n| format!("{stem}({n}){ext}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| name.to_string())
}
