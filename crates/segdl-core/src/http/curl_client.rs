//! libcurl-backed [`HttpClient`].
//!
//! Each request runs on its own thread with a dedicated `Easy` handle. Body
//! bytes are pushed through a bounded channel, so a slow consumer throttles
//! the transfer, and dropping the body makes the write callback return 0,
//! which aborts the transfer.

use std::cell::{Cell, RefCell};
use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;
use std::time::Duration;

use curl::easy::{Easy, List};

use super::parse;
use super::{HttpClient, HttpError, HttpRequest, HttpResponse, ResponseHeaders};

/// Connection tuning shared by every transfer.
#[derive(Debug, Clone)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Abort if throughput stays below `low_speed_limit` bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    pub max_redirects: u32,
    /// Body frames buffered between the transfer thread and the reader.
    pub channel_depth: usize,
    pub user_agent: String,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            max_redirects: 10,
            channel_depth: 16,
            user_agent: concat!("segdl/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurlClient {
    opts: CurlOptions,
}

impl CurlClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(opts: CurlOptions) -> Self {
        Self { opts }
    }

    fn configure(&self, request: &HttpRequest) -> Result<Easy, curl::Error> {
        let mut easy = Easy::new();
        easy.url(&request.url)?;
        easy.get(true)?;
        easy.follow_location(true)?;
        easy.max_redirections(self.opts.max_redirects)?;
        easy.connect_timeout(self.opts.connect_timeout)?;
        easy.low_speed_limit(self.opts.low_speed_limit)?;
        easy.low_speed_time(self.opts.low_speed_time)?;
        easy.useragent(&self.opts.user_agent)?;

        if let Some(range) = request.range {
            let spec = match range.end {
                Some(end) => format!("{}-{}", range.start, end),
                None => format!("{}-", range.start),
            };
            easy.range(&spec)?;
        }

        if !request.headers.is_empty() {
            let mut list = List::new();
            for (k, v) in &request.headers {
                list.append(&format!("{}: {}", k.trim(), v.trim()))?;
            }
            easy.http_headers(list)?;
        }
        Ok(easy)
    }
}

impl HttpClient for CurlClient {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        let easy = self.configure(request).map_err(|e| map_curl_error(&e))?;
        let (tx, rx) = mpsc::sync_channel(self.opts.channel_depth.max(1));
        thread::Builder::new()
            .name("segdl-http".into())
            .spawn(move || run_transfer(easy, tx))
            .map_err(|e| HttpError::Transport(format!("spawn transfer thread: {e}")))?;

        match rx.recv() {
            Ok(Frame::Head { status, headers }) => Ok(HttpResponse {
                status,
                headers: ResponseHeaders::new(headers),
                body: Box::new(ChannelBody::new(rx)),
            }),
            Ok(Frame::Failed(err)) => Err(err),
            Ok(_) => Err(HttpError::Transport("body arrived before headers".into())),
            Err(_) => Err(HttpError::Transport("transfer thread exited".into())),
        }
    }
}

enum Frame {
    Head {
        status: u32,
        headers: Vec<(String, String)>,
    },
    Data(Vec<u8>),
    End,
    /// Transfer broke after the headers were delivered.
    Broken(String),
    /// Transfer failed before any response was available.
    Failed(HttpError),
}

fn run_transfer(mut easy: Easy, tx: SyncSender<Frame>) {
    let status = Cell::new(0u32);
    let headers = RefCell::new(Vec::new());
    let head_sent = Cell::new(false);

    let send_head = || -> bool {
        head_sent.set(true);
        tx.send(Frame::Head {
            status: status.get(),
            headers: headers.borrow().clone(),
        })
        .is_ok()
    };

    let mut on_header = |data: &[u8]| {
        if let Ok(line) = std::str::from_utf8(data) {
            // A new status line starts a new response (redirect hop, 100-continue).
            if let Some(code) = parse::parse_status_line(line) {
                status.set(code);
                headers.borrow_mut().clear();
            } else if let Some(pair) = parse::parse_header_line(line) {
                headers.borrow_mut().push(pair);
            }
        }
        true
    };
    let mut on_data = |data: &[u8]| -> usize {
        if !head_sent.get() && !send_head() {
            return 0;
        }
        match tx.send(Frame::Data(data.to_vec())) {
            Ok(()) => data.len(),
            Err(_) => 0,
        }
    };
    let outcome = stream(&mut easy, &mut on_header, &mut on_data);

    match outcome {
        Ok(()) => {
            if !head_sent.get() && !send_head() {
                return;
            }
            let _ = tx.send(Frame::End);
        }
        Err(e) if head_sent.get() => {
            // Receiver may already be gone when the abort was ours.
            let _ = tx.send(Frame::Broken(e.to_string()));
        }
        Err(e) => {
            let _ = tx.send(Frame::Failed(map_curl_error(&e)));
        }
    }
}

fn stream(
    easy: &mut Easy,
    on_header: &mut dyn FnMut(&[u8]) -> bool,
    on_data: &mut dyn FnMut(&[u8]) -> usize,
) -> Result<(), curl::Error> {
    let mut transfer = easy.transfer();
    transfer.header_function(|data| on_header(data))?;
    transfer.write_function(|data| Ok(on_data(data)))?;
    transfer.perform()
}

fn map_curl_error(e: &curl::Error) -> HttpError {
    let msg = e.to_string();
    if e.is_url_malformed() || e.is_unsupported_protocol() {
        HttpError::InvalidUrl(msg)
    } else if e.is_operation_timedout() {
        HttpError::Timeout(msg)
    } else if e.is_couldnt_connect() || e.is_couldnt_resolve_host() || e.is_couldnt_resolve_proxy()
    {
        HttpError::Connect(msg)
    } else {
        HttpError::Transport(msg)
    }
}

/// Blocking reader over body frames coming from the transfer thread.
struct ChannelBody {
    rx: Receiver<Frame>,
    pending: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl ChannelBody {
    fn new(rx: Receiver<Frame>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            pos: 0,
            finished: false,
        }
    }
}

impl Read for ChannelBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.pending.len() {
                let n = (self.pending.len() - self.pos).min(buf.len());
                buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            match self.rx.recv() {
                Ok(Frame::Data(data)) => {
                    self.pending = data;
                    self.pos = 0;
                }
                Ok(Frame::End) => self.finished = true,
                Ok(Frame::Broken(msg)) => {
                    self.finished = true;
                    return Err(io::Error::new(io::ErrorKind::ConnectionAborted, msg));
                }
                Ok(Frame::Head { .. }) | Ok(Frame::Failed(_)) => {}
                Err(_) => {
                    self.finished = true;
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "transfer thread ended without completing the body",
                    ));
                }
            }
        }
    }
}
