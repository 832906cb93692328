//! Parse raw HTTP response header lines.

use std::time::Duration;

/// Parsed `Content-Range: bytes start-end/total` (total may be `*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

/// Status code from a status line like `HTTP/1.1 206 Partial Content`.
pub fn parse_status_line(line: &str) -> Option<u32> {
    let line = line.trim();
    if !line.starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Splits a `Name: value` header line. Status lines and blank lines yield None.
pub fn parse_header_line(line: &str) -> Option<(String, String)> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() || line.starts_with("HTTP/") {
        return None;
    }
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Parses a `Content-Range` value. Unsatisfied ranges (`bytes */1000`) yield None.
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let (start, end) = span.trim().split_once('-')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some(ContentRange {
        start: start.trim().parse().ok()?,
        end: end.trim().parse().ok()?,
        total,
    })
}

/// Total size from the `/total` part of a Content-Range, including `bytes */total`.
pub fn content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// `Retry-After` in delta-seconds. HTTP-date values are not honoured.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse().ok().map(Duration::from_secs)
}

/// ETag with surrounding quotes (and a weak `W/` prefix marker kept) normalized.
pub fn normalize_etag(value: &str) -> String {
    let v = value.trim();
    match v.strip_prefix("W/") {
        Some(weak) => format!("W/{}", weak.trim_matches('"')),
        None => v.trim_matches('"').to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_seconds_only() {
        assert_eq!(parse_retry_after(" 120 "), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn status_lines() {
        assert_eq!(parse_status_line("HTTP/1.1 206 Partial Content"), Some(206));
        assert_eq!(parse_status_line("HTTP/2 200"), Some(200));
        assert_eq!(parse_status_line("Content-Length: 5"), None);
    }

    #[test]
    fn header_lines() {
        assert_eq!(
            parse_header_line("Content-Length: 12345\r\n"),
            Some(("Content-Length".to_string(), "12345".to_string()))
        );
        assert_eq!(parse_header_line("HTTP/1.1 200 OK"), None);
        assert_eq!(parse_header_line("\r\n"), None);
        assert_eq!(
            parse_header_line("Last-Modified: Wed, 21 Oct 2015 07:28:00 GMT"),
            Some((
                "Last-Modified".to_string(),
                "Wed, 21 Oct 2015 07:28:00 GMT".to_string()
            ))
        );
    }

    #[test]
    fn content_range_full() {
        let r = parse_content_range("bytes 0-99/1000").unwrap();
        assert_eq!((r.start, r.end, r.total), (0, 99, Some(1000)));
        let r = parse_content_range("bytes 500-999/*").unwrap();
        assert_eq!(r.total, None);
        assert!(parse_content_range("bytes */1000").is_none());
        assert_eq!(content_range_total("bytes */1000"), Some(1000));
    }

    #[test]
    fn etag_quotes_trimmed() {
        assert_eq!(normalize_etag("\"abc-123\""), "abc-123");
        assert_eq!(normalize_etag("W/\"v1\""), "W/v1");
    }
}
