//! HTTP metadata probing.
//!
//! Uses the curl crate (libcurl) to learn the total size of a resource before
//! it is partitioned, plus `Accept-Ranges`, ETag/Last-Modified (used to detect
//! a changed remote on resume) and `Content-Disposition` (file-name hint).
//! A HEAD request is tried first; servers that refuse HEAD or omit the length
//! are asked for `bytes=0-0` and the total is read from `Content-Range`.

mod parse;

pub(crate) use parse::{parse_content_range, parse_http_status};

use crate::error::{DlmError, Result};
use std::str;
use std::time::Duration;

const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Key response headers needed to partition a download and to resume it safely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadResult {
    /// Total size in bytes, if the server reported one.
    pub content_length: Option<u64>,
    /// True if server sent `Accept-Ranges: bytes` (or answered a range probe with 206).
    pub accept_ranges: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// `Content-Disposition` value if present (filename hint).
    pub content_disposition: Option<String>,
}

/// Probes `url` for its metadata, falling back to a one-byte range request
/// when HEAD fails or carries no length.
///
/// Blocking; call from `spawn_blocking` when used from async code.
pub fn probe(url: &str) -> Result<HeadResult> {
    match probe_head(url) {
        Ok(head) if head.content_length.is_some() => Ok(head),
        Ok(head) => {
            tracing::debug!(url, "HEAD carried no length, trying range probe");
            probe_range(url).map(|r| merge(head, r))
        }
        Err(e) => {
            tracing::debug!(url, "HEAD failed ({}), trying range probe", e);
            probe_range(url)
        }
    }
}

/// Performs a HEAD request and returns the parsed headers of the final response.
pub fn probe_head(url: &str) -> Result<HeadResult> {
    let mut easy = new_probe_handle(url)?;
    easy.nobody(true)?;

    let mut headers: Vec<String> = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            collect_header(&mut headers, data);
            true
        })?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(DlmError::Network(format!("HEAD {} returned HTTP {}", url, code)));
    }

    Ok(parse::parse_headers(&headers))
}

/// Sends `Range: bytes=0-0` and reads the total size from `Content-Range`.
/// If the server ignores the range (200), its `Content-Length` is used and the
/// body is not read.
pub fn probe_range(url: &str) -> Result<HeadResult> {
    let mut easy = new_probe_handle(url)?;
    easy.range("0-0")?;

    let mut headers: Vec<String> = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            collect_header(&mut headers, data);
            true
        })?;
        // Headers are all we need; refusing the body ends the transfer early.
        transfer.write_function(|_| Ok(0))?;
        if let Err(e) = transfer.perform() {
            if !e.is_write_error() {
                return Err(e.into());
            }
        }
    }

    let status = parse_http_status(&headers);
    let mut head = parse::parse_headers(&headers);
    match status {
        Some(206) => {
            head.content_length = headers
                .iter()
                .filter_map(|l| l.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-range"))
                .and_then(|(_, v)| parse_content_range(v))
                .and_then(|(_, _, total)| total);
            head.accept_ranges = true;
        }
        Some(code) if (200..300).contains(&code) => {}
        Some(code) => {
            return Err(DlmError::Network(format!(
                "range probe {} returned HTTP {}",
                url, code
            )))
        }
        None => {
            return Err(DlmError::Network(format!(
                "range probe {} returned no status line",
                url
            )))
        }
    }
    Ok(head)
}

fn new_probe_handle(url: &str) -> Result<curl::easy::Easy> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(PROBE_CONNECT_TIMEOUT)?;
    easy.timeout(PROBE_TIMEOUT)?;
    Ok(easy)
}

/// Keeps only the headers of the latest response so redirects don't leak
/// values from intermediate hops.
fn collect_header(headers: &mut Vec<String>, data: &[u8]) {
    if let Ok(s) = str::from_utf8(data) {
        let line = s.trim_end();
        if line.starts_with("HTTP/") {
            headers.clear();
        }
        if !line.is_empty() {
            headers.push(line.to_string());
        }
    }
}

fn merge(head: HeadResult, range: HeadResult) -> HeadResult {
    HeadResult {
        content_length: range.content_length,
        accept_ranges: head.accept_ranges || range.accept_ranges,
        etag: head.etag.or(range.etag),
        last_modified: head.last_modified.or(range.last_modified),
        content_disposition: head.content_disposition.or(range.content_disposition),
    }
}
