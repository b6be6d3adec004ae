//! Minimal HTTP/1.1 server that supports HEAD and Range GET for integration tests.
//!
//! Serves a single static body at any path, one request per connection.
//! Every request's method and `Range` header is recorded so tests can assert
//! what the engine asked for.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RangeServerOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// If false, omit `Accept-Ranges: bytes` header even if ranges work.
    pub advertise_ranges: bool,
    /// Send bodies in pieces of this many bytes with a pause after each.
    pub throttle: Option<(usize, Duration)>,
    /// Value of a `Content-Disposition` header on every response.
    pub content_disposition: Option<String>,
    /// Answer every request with this status and no body.
    pub fail_status: Option<u16>,
    /// Answer GETs whose range starts at this offset with 404, until
    /// `RangeServer::stop_failing` is called.
    pub fail_range_at: Option<u64>,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            advertise_ranges: true,
            throttle: None,
            content_disposition: None,
            fail_status: None,
            fail_range_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedRequest {
    pub method: String,
    pub range: Option<String>,
}

pub struct RangeServer {
    /// URL of the served file, e.g. "http://127.0.0.1:12345/data.bin".
    pub url: String,
    log: Arc<Mutex<Vec<LoggedRequest>>>,
    failing: Arc<AtomicBool>,
}

impl RangeServer {
    pub fn requests(&self) -> Vec<LoggedRequest> {
        self.log.lock().unwrap().clone()
    }

    /// Turns off `fail_range_at` for later requests.
    pub fn stop_failing(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    /// `Range` header of every GET, in arrival order.
    pub fn get_ranges(&self) -> Vec<Option<String>> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "GET")
            .map(|r| r.range)
            .collect()
    }
}

/// Starts a server in a background thread serving `body`. The server runs
/// until the process exits.
pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

/// Like `start` but allows customizing server behavior.
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let opts = Arc::new(opts);
    let log = Arc::new(Mutex::new(Vec::new()));
    let failing = Arc::new(AtomicBool::new(true));
    let server_log = Arc::clone(&log);
    let server_failing = Arc::clone(&failing);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let opts = Arc::clone(&opts);
            let log = Arc::clone(&server_log);
            let failing = server_failing.load(Ordering::SeqCst);
            thread::spawn(move || handle(stream, &body, &opts, failing, &log));
        }
    });
    RangeServer {
        url: format!("http://127.0.0.1:{}/data.bin", port),
        log,
        failing,
    }
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    opts: &RangeServerOptions,
    failing: bool,
    log: &Mutex<Vec<LoggedRequest>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, range_header) = parse_request(request);
    log.lock().unwrap().push(LoggedRequest {
        method: method.to_ascii_uppercase(),
        range: range_header.clone(),
    });

    if let Some(status) = opts.fail_status {
        let response = format!("HTTP/1.1 {} Error\r\nContent-Length: 0\r\n\r\n", status);
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    let total = body.len() as u64;
    let mut extra = String::new();
    if opts.advertise_ranges && opts.support_ranges {
        extra.push_str("Accept-Ranges: bytes\r\n");
    }
    if let Some(cd) = &opts.content_disposition {
        extra.push_str(&format!("Content-Disposition: {}\r\n", cd));
    }

    if method.eq_ignore_ascii_case("HEAD") {
        let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}\r\n", total, extra);
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
        return;
    }

    let range = range_header.as_deref().and_then(parse_range);
    if failing && range.is_some() && range.map(|(start, _)| start) == opts.fail_range_at {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        return;
    }
    let (status, slice) = match range {
        Some((start, end_incl)) if opts.support_ranges => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start >= total || start > end_incl {
                extra.push_str(&format!("Content-Range: bytes */{}\r\n", total));
                ("416 Range Not Satisfiable", &body[0..0])
            } else {
                extra.push_str(&format!(
                    "Content-Range: bytes {}-{}/{}\r\n",
                    start, end_incl, total
                ));
                ("206 Partial Content", &body[start as usize..=end_incl as usize])
            }
        }
        _ => ("200 OK", body),
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}\r\n",
        status,
        slice.len(),
        extra
    );
    if stream.write_all(response.as_bytes()).is_err() {
        return;
    }
    match opts.throttle {
        Some((piece, delay)) => {
            for part in slice.chunks(piece.max(1)) {
                if stream.write_all(part).is_err() {
                    return;
                }
                thread::sleep(delay);
            }
        }
        None => {
            let _ = stream.write_all(slice);
        }
    }
}

/// Returns the method and the raw `Range` header value, if any.
fn parse_request(request: &str) -> (String, Option<String>) {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("")
        .to_string();
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                range = Some(value.trim().to_string());
            }
        }
    }
    (method, range)
}

/// `bytes=X-Y` or `bytes=X-` as (start, end_inclusive).
fn parse_range(value: &str) -> Option<(u64, u64)> {
    let spec = value.strip_prefix("bytes=")?;
    let (a, b) = spec.split_once('-')?;
    let start = a.trim().parse::<u64>().ok()?;
    let end = b.trim();
    let end_incl = if end.is_empty() {
        u64::MAX
    } else {
        end.parse::<u64>().ok()?
    };
    Some((start, end_incl))
}
