//! Segment worker: one ranged GET streamed into the file at the segment's offset.
//!
//! The request always starts at the segment's current position, so a restarted
//! or restored segment never re-fetches bytes it already wrote. Stop requests
//! are observed between chunks and on curl's progress ticks.

use std::str;
use std::sync::Arc;
use std::time::{Duration, Instant};

use curl::easy::{Easy2, Handler, WriteError};

use super::segment::{SegmentSlot, SegmentState};
use crate::config::EngineConfig;
use crate::error::DlmError;
use crate::fetch_head::{parse_content_range, parse_http_status};
use crate::segmenter::curl_range;
use crate::storage::StorageWriter;

/// Everything a worker thread needs; owned so the thread can outlive the caller.
pub(super) struct SegmentJob {
    pub slot: Arc<SegmentSlot>,
    pub url: String,
    pub storage: StorageWriter,
    pub total_size: u64,
    pub engine: EngineConfig,
}

enum Outcome {
    Completed,
    Stopped,
    Failed(DlmError),
}

/// Thread entry point. Always leaves the slot out of `Running`.
pub(super) fn run(job: SegmentJob) {
    let slot = Arc::clone(&job.slot);
    let range = slot.range();
    tracing::debug!(
        segment = slot.index(),
        from = range.from,
        to = range.to,
        pos = slot.pos(),
        "segment worker started"
    );

    let (state, error) = match transfer(job) {
        Outcome::Completed => {
            tracing::debug!(segment = slot.index(), "segment completed");
            (SegmentState::Completed, None)
        }
        Outcome::Stopped => {
            tracing::debug!(segment = slot.index(), pos = slot.pos(), "segment stopped");
            (SegmentState::Stopped, None)
        }
        Outcome::Failed(e) => {
            tracing::warn!(segment = slot.index(), pos = slot.pos(), "segment failed: {}", e);
            (SegmentState::Failed, Some(e.to_string()))
        }
    };
    slot.finish(state, error);
}

fn transfer(job: SegmentJob) -> Outcome {
    let slot = Arc::clone(&job.slot);
    let start = slot.pos();
    let to = slot.range().to;

    if slot.stop_requested() {
        return Outcome::Stopped;
    }
    if start >= to {
        return Outcome::Completed;
    }

    let handler = SegmentTransfer::new(&job, start);
    let mut easy = Easy2::new(handler);
    if let Err(e) = configure(&mut easy, &job, start, to) {
        return Outcome::Failed(e.into());
    }

    let result = easy.perform();
    let handler = easy.get_mut();

    if let Some(abort) = handler.abort.take() {
        return match abort {
            Abort::Stop => Outcome::Stopped,
            Abort::Fail(e) => Outcome::Failed(e),
        };
    }
    if let Err(e) = result {
        if slot.stop_requested() {
            return Outcome::Stopped;
        }
        return Outcome::Failed(e.into());
    }
    // A response without a body never reached the write callback.
    if !handler.checked {
        if let Err(e) = handler.check_response() {
            return Outcome::Failed(e);
        }
    }

    let pos = slot.pos();
    if pos == to {
        Outcome::Completed
    } else {
        Outcome::Failed(DlmError::Network(format!(
            "partial transfer: stream ended at offset {} of {}",
            pos, to
        )))
    }
}

fn configure(
    easy: &mut Easy2<SegmentTransfer>,
    job: &SegmentJob,
    start: u64,
    to: u64,
) -> Result<(), curl::Error> {
    easy.url(&job.url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(job.engine.connect_timeout())?;
    easy.buffer_size(job.engine.chunk_size_bytes)?;
    easy.range(&curl_range(start, to))?;
    easy.progress(true)?;
    Ok(())
}

enum Abort {
    Stop,
    Fail(DlmError),
}

/// Measures bytes advanced per sampling window; a window with no progress
/// yields 0.
struct SpeedSampler {
    window: Duration,
    last_at: Instant,
    last_pos: u64,
}

impl SpeedSampler {
    fn new(window: Duration, pos: u64) -> Self {
        Self {
            window,
            last_at: Instant::now(),
            last_pos: pos,
        }
    }

    fn sample(&mut self, now: Instant, pos: u64) -> Option<u64> {
        let elapsed = now.duration_since(self.last_at);
        if elapsed < self.window {
            return None;
        }
        let advanced = pos.saturating_sub(self.last_pos);
        self.last_at = now;
        self.last_pos = pos;
        Some((advanced as f64 / elapsed.as_secs_f64()) as u64)
    }
}

/// curl handler for one segment: validates the response range, then writes
/// each chunk at the absolute offset it belongs to.
struct SegmentTransfer {
    slot: Arc<SegmentSlot>,
    storage: StorageWriter,
    start: u64,
    to: u64,
    total_size: u64,
    headers: Vec<String>,
    checked: bool,
    abort: Option<Abort>,
    sampler: SpeedSampler,
}

impl SegmentTransfer {
    fn new(job: &SegmentJob, start: u64) -> Self {
        Self {
            slot: Arc::clone(&job.slot),
            storage: job.storage.clone(),
            start,
            to: job.slot.range().to,
            total_size: job.total_size,
            headers: Vec::new(),
            checked: false,
            abort: None,
            sampler: SpeedSampler::new(job.engine.speed_sample(), start),
        }
    }

    fn check_response(&self) -> Result<(), DlmError> {
        check_range_response(&self.headers, self.start, self.to, self.total_size)
    }

    fn tick(&mut self) {
        if let Some(speed) = self.sampler.sample(Instant::now(), self.slot.pos()) {
            self.slot.set_speed(speed);
        }
    }

    fn fail(&mut self, e: DlmError) -> Result<usize, WriteError> {
        self.abort = Some(Abort::Fail(e));
        Ok(0)
    }
}

impl Handler for SegmentTransfer {
    fn header(&mut self, data: &[u8]) -> bool {
        if let Ok(s) = str::from_utf8(data) {
            let line = s.trim_end();
            if line.starts_with("HTTP/") {
                self.headers.clear();
            }
            if !line.is_empty() {
                self.headers.push(line.to_string());
            }
        }
        true
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        if self.slot.stop_requested() {
            self.abort = Some(Abort::Stop);
            return Ok(0);
        }
        if !self.checked {
            self.checked = true;
            if let Err(e) = self.check_response() {
                return self.fail(e);
            }
        }

        let pos = self.slot.pos();
        let len = data.len() as u64;
        if len > self.to - pos {
            return self.fail(DlmError::RangeUnsupported(format!(
                "server sent {} bytes past the end of the requested range",
                len - (self.to - pos)
            )));
        }
        if let Err(e) = self.storage.write_at(pos, data) {
            let path = self.storage.path().to_path_buf();
            return self.fail(DlmError::file_io(path, e));
        }
        self.slot.advance_to(pos + len);
        self.tick();
        Ok(data.len())
    }

    fn progress(&mut self, _dltotal: f64, _dlnow: f64, _ultotal: f64, _ulnow: f64) -> bool {
        self.tick();
        if self.slot.stop_requested() {
            self.abort = Some(Abort::Stop);
            return false;
        }
        true
    }
}

/// Accepts 206 with a `Content-Range` of exactly `[start, to)`, or a plain 200
/// when the request covered the whole file and the length matches.
fn check_range_response(
    headers: &[String],
    start: u64,
    to: u64,
    total_size: u64,
) -> Result<(), DlmError> {
    let header = |name: &str| {
        headers
            .iter()
            .filter_map(|l| l.split_once(':'))
            .find(|(n, _)| n.trim().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
    };

    match parse_http_status(headers) {
        Some(206) => {
            let Some((first, last, total)) = header("content-range").and_then(parse_content_range)
            else {
                return Err(DlmError::RangeUnsupported(
                    "206 response without a usable Content-Range".to_string(),
                ));
            };
            if first != start || last + 1 != to {
                return Err(DlmError::RangeUnsupported(format!(
                    "asked for bytes {}-{}, server sent {}-{}",
                    start,
                    to - 1,
                    first,
                    last
                )));
            }
            if let Some(total) = total.filter(|t| *t != total_size) {
                return Err(DlmError::RangeUnsupported(format!(
                    "remote size is now {} bytes, expected {}",
                    total, total_size
                )));
            }
            Ok(())
        }
        Some(200) => {
            let length = header("content-length").and_then(|v| v.parse::<u64>().ok());
            if start == 0 && to == total_size && length == Some(total_size) {
                Ok(())
            } else {
                Err(DlmError::RangeUnsupported(
                    "server ignored the range request (HTTP 200)".to_string(),
                ))
            }
        }
        Some(code) if (200..300).contains(&code) => Err(DlmError::RangeUnsupported(format!(
            "unexpected HTTP {} to a range request",
            code
        ))),
        Some(code) => Err(DlmError::Network(format!("HTTP {}", code))),
        None => Err(DlmError::Network("response without a status line".to_string())),
    }
}
