//! In-memory [`HttpClient`]: serves one body with optional range support,
//! records every requested range and can slow reads down so a test can
//! pause or cancel mid-transfer. It can also start failing: open bodies
//! break and new requests get an error status.

use std::io::{self, Read};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use segdl_core::http::{ByteRange, HttpClient, HttpError, HttpRequest, HttpResponse, ResponseHeaders};

struct Resource {
    body: Arc<Vec<u8>>,
    ranges: bool,
    etag: Option<String>,
    /// Bytes handed out per read call, and the sleep before each.
    piece: usize,
    delay: Duration,
}

#[derive(Clone)]
pub struct MemoryHttp {
    resource: Arc<Mutex<Resource>>,
    requests: Arc<Mutex<Vec<Option<ByteRange>>>>,
    /// Status answered while failing; 0 when healthy.
    failing: Arc<AtomicU32>,
}

impl MemoryHttp {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            resource: Arc::new(Mutex::new(Resource {
                body: Arc::new(body),
                ranges: true,
                etag: Some("\"v1\"".to_string()),
                piece: 64 * 1024,
                delay: Duration::ZERO,
            })),
            requests: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Replaces the served content, as if the remote file changed.
    pub fn set_body(&self, body: Vec<u8>, etag: Option<&str>) {
        let mut r = self.resource.lock().unwrap();
        r.body = Arc::new(body);
        r.etag = etag.map(str::to_string);
    }

    pub fn without_ranges(self) -> Self {
        self.resource.lock().unwrap().ranges = false;
        self
    }

    /// Every read returns at most `piece` bytes after sleeping `delay`.
    pub fn throttled(self, piece: usize, delay: Duration) -> Self {
        self.set_pace(piece, delay);
        self
    }

    pub fn set_pace(&self, piece: usize, delay: Duration) {
        let mut r = self.resource.lock().unwrap();
        r.piece = piece.max(1);
        r.delay = delay;
    }

    /// With `Some(status)`, bodies in flight fail with a connection reset and
    /// every new request is answered with `status`. `None` heals the server.
    pub fn fail_with(&self, status: Option<u32>) {
        self.failing.store(status.unwrap_or(0), Ordering::Release);
    }

    pub fn requests(&self) -> Vec<Option<ByteRange>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

impl HttpClient for MemoryHttp {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.lock().unwrap().push(request.range);
        let failing = self.failing.load(Ordering::Acquire);
        if failing != 0 {
            return Ok(HttpResponse {
                status: failing,
                headers: ResponseHeaders::default(),
                body: Box::new(io::empty()),
            });
        }
        let r = self.resource.lock().unwrap();
        let total = r.body.len() as u64;
        let mut headers = Vec::new();
        if let Some(etag) = &r.etag {
            headers.push(("ETag".to_string(), etag.clone()));
        }

        let (status, start, end) = match request.range {
            Some(range) if r.ranges => {
                let end = range.end.unwrap_or(u64::MAX).min(total.saturating_sub(1));
                if range.start >= total || range.start > end {
                    headers.push(("Content-Range".into(), format!("bytes */{total}")));
                    return Ok(HttpResponse {
                        status: 416,
                        headers: ResponseHeaders::new(headers),
                        body: Box::new(io::empty()),
                    });
                }
                headers.push((
                    "Content-Range".into(),
                    format!("bytes {}-{}/{}", range.start, end, total),
                ));
                (206, range.start, end + 1)
            }
            _ => (200, 0, total),
        };
        headers.push(("Content-Length".into(), (end - start).to_string()));

        Ok(HttpResponse {
            status,
            headers: ResponseHeaders::new(headers),
            body: Box::new(PacedBody {
                data: Arc::clone(&r.body),
                pos: start as usize,
                end: end as usize,
                piece: r.piece,
                delay: r.delay,
                failing: Arc::clone(&self.failing),
            }),
        })
    }
}

struct PacedBody {
    data: Arc<Vec<u8>>,
    pos: usize,
    end: usize,
    piece: usize,
    delay: Duration,
    failing: Arc<AtomicU32>,
}

impl Read for PacedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.end || buf.is_empty() {
            return Ok(0);
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.failing.load(Ordering::Acquire) != 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }
        let n = (self.end - self.pos).min(self.piece).min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
