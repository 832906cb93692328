//! Minimal HTTP/1.1 server that supports Range GET for integration tests.
//!
//! Serves a single static body at any path. With ranges enabled it answers
//! `Range: bytes=X-Y` (and `bytes=X-`) with 206 Partial Content; otherwise
//! it always returns 200 with the full body.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Sent as `Content-Disposition` when set.
    pub content_disposition: Option<&'static str>,
    pub etag: Option<&'static str>,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            content_disposition: None,
            etag: Some("\"range-server-v1\""),
        }
    }
}

/// Starts a server in a background thread serving `body`. Returns a URL whose
/// last path segment is `file.bin`. The server runs until the process exits.
pub fn start(body: Vec<u8>) -> String {
    start_with_options(body, RangeServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            thread::spawn(move || handle(stream, &body, opts));
        }
    });
    format!("http://127.0.0.1:{}/files/file.bin", port)
}

fn handle(mut stream: std::net::TcpStream, body: &[u8], opts: RangeServerOptions) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (method, range) = parse_request(request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    let total = body.len() as u64;
    let mut extra = String::new();
    if let Some(etag) = opts.etag {
        extra.push_str(&format!("ETag: {etag}\r\n"));
    }
    if let Some(cd) = opts.content_disposition {
        extra.push_str(&format!("Content-Disposition: {cd}\r\n"));
    }

    let (status, slice) = match range {
        Some((start, end_incl)) if opts.support_ranges => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start >= total || start > end_incl {
                extra.push_str(&format!("Content-Range: bytes */{total}\r\n"));
                ("416 Range Not Satisfiable", &body[0..0])
            } else {
                extra.push_str(&format!("Content-Range: bytes {start}-{end_incl}/{total}\r\n"));
                (
                    "206 Partial Content",
                    &body[start as usize..(end_incl + 1) as usize],
                )
            }
        }
        _ => ("200 OK", body),
    };
    if opts.support_ranges {
        extra.push_str("Accept-Ranges: bytes\r\n");
    }
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n",
        status,
        slice.len(),
        extra
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(slice);
}

/// Returns (method, optional (start, end_inclusive) for Range: bytes=X-Y).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut method = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("range") {
            continue;
        }
        let Some(part) = value.trim().strip_prefix("bytes=") else {
            continue;
        };
        if let Some((a, b)) = part.split_once('-') {
            let start = a.trim().parse::<u64>().unwrap_or(0);
            let end_incl = match b.trim() {
                "" => u64::MAX,
                end => end.parse::<u64>().unwrap_or(0),
            };
            range = Some((start, end_incl));
        }
    }
    (method, range)
}
