//! Filename hint from the URL path.

use super::content_disposition::percent_decode;

/// Last non-empty path segment of `url`, percent-decoded.
///
/// Returns `None` for unparseable URLs, root paths and `.`/`..` segments.
pub fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = String::from_utf8_lossy(&percent_decode(segment)).into_owned();
    match decoded.as_str() {
        "" | "." | ".." => None,
        _ => Some(decoded),
    }
}
