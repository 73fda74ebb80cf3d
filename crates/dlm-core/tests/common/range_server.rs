//! Minimal HTTP/1.1 server that supports HEAD and Range GET for integration tests.
//!
//! Serves a single body that tests may replace while the server runs. HEAD
//! answers with Content-Length (and ETag); GET with Range answers 206 Partial
//! Content. Options simulate throttled links, HEAD-blocking servers and
//! servers that refuse ranges at some offsets. Connections can also be cut
//! mid-body at run time, and every ranged GET is logged by its start offset.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct RangeServerOptions {
    /// If true, HEAD returns 405 (simulates servers that block HEAD).
    pub head_blocked: bool,
    /// If true, GET ignores Range and always returns 200 with the full body.
    pub ignore_ranges: bool,
    /// Stream bodies in chunks of this size, sleeping `throttle_delay` between them.
    pub throttle_chunk: Option<usize>,
    pub throttle_delay: Duration,
    /// Range requests starting at one of these offsets get a full 200 response.
    pub refuse_range_from: Vec<u64>,
}

/// Handle to a running server. The body can be swapped to simulate a remote
/// file that changed between runs.
#[derive(Clone)]
pub struct RangeServer {
    pub url: String,
    body: Arc<RwLock<Arc<Vec<u8>>>>,
    cuts: Arc<Mutex<HashMap<u64, usize>>>,
    range_gets: Arc<Mutex<Vec<u64>>>,
}

impl RangeServer {
    pub fn set_body(&self, body: Vec<u8>) {
        *self.body.write().unwrap() = Arc::new(body);
    }

    /// Ranged GETs starting at `start` announce the full length but close the
    /// connection after `after` body bytes.
    pub fn cut_range_at(&self, start: u64, after: usize) {
        self.cuts.lock().unwrap().insert(start, after);
    }

    pub fn clear_cuts(&self) {
        self.cuts.lock().unwrap().clear();
    }

    /// Number of ranged GETs received so far that started at `start`.
    pub fn gets_from(&self, start: u64) -> usize {
        self.range_gets
            .lock()
            .unwrap()
            .iter()
            .filter(|&&s| s == start)
            .count()
    }
}

struct Conn {
    opts: Arc<RangeServerOptions>,
    cuts: Arc<Mutex<HashMap<u64, usize>>>,
    range_gets: Arc<Mutex<Vec<u64>>>,
}

/// Starts a server in a background thread serving `body`. Returns the URL of
/// the served file. The server runs until the process exits.
pub fn start(body: Vec<u8>) -> String {
    start_with_options(body, RangeServerOptions::default()).url
}

/// Like `start` but allows customizing server behavior.
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let server = RangeServer {
        url: format!("http://127.0.0.1:{}/file.bin", port),
        body: Arc::new(RwLock::new(Arc::new(body))),
        cuts: Arc::new(Mutex::new(HashMap::new())),
        range_gets: Arc::new(Mutex::new(Vec::new())),
    };
    let shared = Arc::clone(&server.body);
    let opts = Arc::new(opts);
    let cuts = Arc::clone(&server.cuts);
    let range_gets = Arc::clone(&server.range_gets);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&shared.read().unwrap());
            let conn = Conn {
                opts: Arc::clone(&opts),
                cuts: Arc::clone(&cuts),
                range_gets: Arc::clone(&range_gets),
            };
            thread::spawn(move || handle(stream, &body, &conn));
        }
    });
    server
}

fn handle(mut stream: TcpStream, body: &[u8], conn: &Conn) {
    let opts = &*conn.opts;
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(10)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, range) = parse_request(request);
    let total = body.len() as u64;
    let etag = format!("\"len-{}\"", total);

    if method.eq_ignore_ascii_case("HEAD") {
        if opts.head_blocked {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
            return;
        }
        let accept_ranges = if opts.ignore_ranges {
            ""
        } else {
            "Accept-Ranges: bytes\r\n"
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nETag: {}\r\n{}\r\n",
            total, etag, accept_ranges
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    let cut = match range {
        Some((start, _)) => {
            conn.range_gets.lock().unwrap().push(start);
            conn.cuts.lock().unwrap().get(&start).copied()
        }
        None => None,
    };
    let range = range.filter(|(start, _)| {
        !opts.ignore_ranges && !opts.refuse_range_from.contains(start)
    });
    let (status, content_range, slice) = match range {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start > end_incl || start >= total {
                (
                    "416 Range Not Satisfiable",
                    Some(format!("bytes */{}", total)),
                    &body[0..0],
                )
            } else {
                let slice = &body[start as usize..=end_incl as usize];
                (
                    "206 Partial Content",
                    Some(format!("bytes {}-{}/{}", start, end_incl, total)),
                    slice,
                )
            }
        }
        None => ("200 OK", None, body),
    };
    let content_range = content_range
        .map(|v| format!("Content-Range: {}\r\n", v))
        .unwrap_or_default();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nETag: {}\r\n{}\r\n",
        status,
        slice.len(),
        etag,
        content_range
    );
    if stream.write_all(response.as_bytes()).is_err() {
        return;
    }
    if let Some(after) = cut {
        let _ = stream.write_all(&slice[..after.min(slice.len())]);
        let _ = stream.flush();
        let _ = stream.shutdown(Shutdown::Write);
        return;
    }
    match opts.throttle_chunk {
        Some(chunk) => {
            for part in slice.chunks(chunk.max(1)) {
                if stream.write_all(part).is_err() {
                    return;
                }
                thread::sleep(opts.throttle_delay);
            }
        }
        None => {
            let _ = stream.write_all(slice);
        }
    }
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
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if let Some(part) = value.strip_prefix("bytes=") {
                    if let Some((a, b)) = part.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, range)
}
