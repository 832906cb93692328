//! Capability probe: one ranged GET (`Range: bytes=0-`) whose body is dropped
//! as soon as the headers are in.
//!
//! A 206 answer means the server honours ranges; the total size then comes
//! from `Content-Range` (falling back to `Content-Length`). A plain 200 means
//! single-stream only, with the size from `Content-Length` when present.
//! Servers answer `bytes=0-` on an empty resource with 416 (`bytes */0`);
//! that is an empty response, not a changed one.

use std::collections::BTreeMap;

use crate::error::DownloadError;
use crate::http::{parse, ByteRange, HttpClient, HttpError, HttpRequest, ResponseHeaders};

/// What the server told us about the resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// True when the server answered the probe with 206 Partial Content.
    pub resumable: bool,
    /// Total size in bytes, if the server disclosed it.
    pub total_size: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_disposition: Option<String>,
}

impl ProbeResult {
    fn from_headers(status: u32, headers: &ResponseHeaders) -> Self {
        let resumable = status == 206;
        let total_size = match status {
            206 => headers
                .get("content-range")
                .and_then(parse::content_range_total)
                .or_else(|| headers.content_length()),
            // The length of a 416 body describes the error page.
            416 => headers.get("content-range").and_then(parse::content_range_total),
            _ => headers.content_length(),
        };
        Self {
            resumable,
            total_size,
            etag: headers.get("etag").map(parse::normalize_etag),
            last_modified: headers.get("last-modified").map(|v| v.trim().to_string()),
            content_disposition: headers.get("content-disposition").map(str::to_string),
        }
    }
}

/// Probes `url` and classifies failures the way a task reports them.
pub fn probe(
    client: &dyn HttpClient,
    url: &str,
    headers: &BTreeMap<String, String>,
) -> Result<ProbeResult, DownloadError> {
    let request = HttpRequest::get(url)
        .with_headers(headers)
        .with_range(ByteRange::starting_at(0));
    let response = client.execute(&request).map_err(connect_error)?;
    let status = response.status;
    // Dropping the body here abandons the transfer after the headers.
    let result = ProbeResult::from_headers(status, &response.headers);
    drop(response);

    match status {
        200 | 206 => {}
        416 if result.total_size.unwrap_or(0) == 0 => return Err(DownloadError::EmptyResponse),
        s => return Err(status_error(s)),
    }
    if result.total_size == Some(0) {
        return Err(DownloadError::EmptyResponse);
    }
    tracing::debug!(
        url,
        status,
        resumable = result.resumable,
        total = ?result.total_size,
        "probe finished"
    );
    Ok(result)
}

/// Classifies a transport failure that happened before any response arrived.
pub(crate) fn connect_error(err: HttpError) -> DownloadError {
    match err {
        HttpError::InvalidUrl(m) => DownloadError::IllegalUrl(m),
        HttpError::Connect(m) | HttpError::Timeout(m) => DownloadError::Connect(m),
        HttpError::Transport(m) => DownloadError::Network(m),
    }
}

/// Classifies a non-success status. Client errors are permanent, server errors are not.
pub(crate) fn status_error(status: u32) -> DownloadError {
    match status {
        416 => DownloadError::ContentExpired(format!("HTTP {status}: range not satisfiable")),
        408 | 429 => DownloadError::Network(format!("HTTP {status}")),
        400..=499 => DownloadError::ConnectFatal(format!("HTTP {status}")),
        _ => DownloadError::Network(format!("HTTP {status}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;

    /// Answers every request with one status and header set, empty body.
    struct Fixed(u32, Vec<(&'static str, &'static str)>);

    impl HttpClient for Fixed {
        fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse, HttpError> {
            Ok(HttpResponse {
                status: self.0,
                headers: headers(&self.1),
                body: Box::new(std::io::empty()),
            })
        }
    }

    fn headers(pairs: &[(&str, &str)]) -> ResponseHeaders {
        ResponseHeaders::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn partial_content_is_resumable_with_total_from_content_range() {
        let h = headers(&[
            ("Content-Range", "bytes 0-9999999/10000000"),
            ("Content-Length", "10000000"),
            ("ETag", "\"v1\""),
            ("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
        ]);
        let r = ProbeResult::from_headers(206, &h);
        assert!(r.resumable);
        assert_eq!(r.total_size, Some(10_000_000));
        assert_eq!(r.etag.as_deref(), Some("v1"));
        assert!(r.last_modified.is_some());
    }

    #[test]
    fn plain_ok_is_single_stream() {
        let h = headers(&[("Content-Length", "512")]);
        let r = ProbeResult::from_headers(200, &h);
        assert!(!r.resumable);
        assert_eq!(r.total_size, Some(512));

        let r = ProbeResult::from_headers(200, &ResponseHeaders::default());
        assert_eq!(r.total_size, None);
    }

    #[test]
    fn empty_resource_answers_416_as_empty_response() {
        let client = Fixed(416, vec![("Content-Range", "bytes */0")]);
        assert!(matches!(
            probe(&client, "http://files.test/empty", &BTreeMap::new()),
            Err(DownloadError::EmptyResponse)
        ));
        let client = Fixed(416, vec![]);
        assert!(matches!(
            probe(&client, "http://files.test/empty", &BTreeMap::new()),
            Err(DownloadError::EmptyResponse)
        ));
        assert_eq!(DownloadError::EmptyResponse.code(), 104);
    }

    #[test]
    fn sized_416_stays_content_expired() {
        let client = Fixed(416, vec![("Content-Range", "bytes */1000")]);
        assert!(matches!(
            probe(&client, "http://files.test/odd", &BTreeMap::new()),
            Err(DownloadError::ContentExpired(_))
        ));
    }

    #[test]
    fn status_classification() {
        assert!(status_error(404).is_fatal());
        assert!(status_error(403).is_fatal());
        assert!(!status_error(503).is_fatal());
        assert!(!status_error(429).is_fatal());
        assert!(matches!(status_error(416), DownloadError::ContentExpired(_)));
    }

    #[test]
    fn transport_classification() {
        assert!(matches!(
            connect_error(HttpError::InvalidUrl("x".into())),
            DownloadError::IllegalUrl(_)
        ));
        assert!(matches!(
            connect_error(HttpError::Timeout("x".into())),
            DownloadError::Connect(_)
        ));
    }
}
