//! Per-segment shared state.
//!
//! `pos` and `speed` are plain atomics: only the segment's own worker writes
//! them and readers just need untorn values. State changes and the stop flag
//! go through a small per-segment lock so claiming, stopping and finishing
//! can never interleave into a lost or stale stop request.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::segmenter::ByteRange;

/// Lifecycle of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentState {
    Idle,
    Running,
    Stopped,
    Completed,
    Failed,
}

impl SegmentState {
    /// States a StartAll may (re)start from.
    pub fn is_startable(self) -> bool {
        matches!(
            self,
            SegmentState::Idle | SegmentState::Stopped | SegmentState::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SegmentState::Idle => "idle",
            SegmentState::Running => "running",
            SegmentState::Stopped => "stopped",
            SegmentState::Completed => "completed",
            SegmentState::Failed => "failed",
        }
    }
}

/// Value copy of one segment, as handed out by `Downloader::progress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentSnapshot {
    pub index: usize,
    pub from: u64,
    pub to: u64,
    pub pos: u64,
    pub speed: u64,
    pub state: SegmentState,
    /// Message of the error that failed the segment, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SegmentSnapshot {
    pub fn downloaded(&self) -> u64 {
        self.pos - self.from
    }
}

struct Control {
    state: SegmentState,
    last_error: Option<String>,
    /// Bumped on every successful claim; identifies one worker run.
    claim: u64,
}

pub(crate) struct SegmentSlot {
    index: usize,
    range: ByteRange,
    pos: AtomicU64,
    speed: AtomicU64,
    stop: AtomicBool,
    control: Mutex<Control>,
}

impl SegmentSlot {
    pub(crate) fn new(index: usize, range: ByteRange, pos: u64) -> Self {
        let state = if pos >= range.to {
            SegmentState::Completed
        } else {
            SegmentState::Idle
        };
        Self {
            index,
            range,
            pos: AtomicU64::new(pos),
            speed: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            control: Mutex::new(Control {
                state,
                last_error: None,
                claim: 0,
            }),
        }
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn range(&self) -> ByteRange {
        self.range
    }

    pub(crate) fn pos(&self) -> u64 {
        self.pos.load(Ordering::Acquire)
    }

    /// Records that every byte before `pos` is written. Never moves backwards.
    pub(crate) fn advance_to(&self, pos: u64) {
        debug_assert!(pos <= self.range.to);
        self.pos.fetch_max(pos, Ordering::AcqRel);
    }

    pub(crate) fn set_speed(&self, bytes_per_sec: u64) {
        self.speed.store(bytes_per_sec, Ordering::Relaxed);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> SegmentState {
        self.control().state
    }

    /// Moves a startable segment to `Running`. Returns the previous state on
    /// success, `None` if the segment is running or completed.
    pub(crate) fn try_claim(&self) -> Option<SegmentState> {
        let mut c = self.control();
        if !c.state.is_startable() {
            return None;
        }
        let previous = c.state;
        c.state = SegmentState::Running;
        c.last_error = None;
        c.claim += 1;
        self.stop.store(false, Ordering::Release);
        Some(previous)
    }

    /// Undoes a claim whose worker could not be spawned.
    pub(crate) fn release_claim(&self, previous: SegmentState, error: String) {
        let mut c = self.control();
        c.state = previous;
        c.last_error = Some(error);
    }

    /// Raises the stop flag if the segment is running and returns the claim
    /// that was signaled.
    pub(crate) fn request_stop(&self) -> Option<u64> {
        let c = self.control();
        if c.state != SegmentState::Running {
            return None;
        }
        self.stop.store(true, Ordering::Release);
        Some(c.claim)
    }

    /// True while the worker of `claim` has not finished. A segment re-claimed
    /// since then counts as finished for the old claim.
    pub(crate) fn is_running_claim(&self, claim: u64) -> bool {
        let c = self.control();
        c.state == SegmentState::Running && c.claim == claim
    }

    pub(crate) fn claim(&self) -> u64 {
        self.control().claim
    }

    /// Called by the worker as its last act.
    pub(crate) fn finish(&self, state: SegmentState, error: Option<String>) {
        let mut c = self.control();
        self.speed.store(0, Ordering::Relaxed);
        self.stop.store(false, Ordering::Release);
        c.state = state;
        c.last_error = error;
    }

    pub(crate) fn snapshot(&self) -> SegmentSnapshot {
        let c = self.control();
        SegmentSnapshot {
            index: self.index,
            from: self.range.from,
            to: self.range.to,
            pos: self.pos(),
            speed: self.speed.load(Ordering::Relaxed),
            state: c.state,
            error: c.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(pos: u64) -> SegmentSlot {
        SegmentSlot::new(0, ByteRange { from: 0, to: 100 }, pos)
    }

    #[test]
    fn new_slot_state_follows_position() {
        assert_eq!(slot(0).state(), SegmentState::Idle);
        assert_eq!(slot(40).state(), SegmentState::Idle);
        assert_eq!(slot(100).state(), SegmentState::Completed);
    }

    #[test]
    fn claim_only_from_startable_states() {
        let s = slot(0);
        assert_eq!(s.try_claim(), Some(SegmentState::Idle));
        assert_eq!(s.try_claim(), None, "already running");
        s.finish(SegmentState::Failed, Some("boom".into()));
        assert_eq!(s.snapshot().error.as_deref(), Some("boom"));
        assert_eq!(s.try_claim(), Some(SegmentState::Failed));
        assert_eq!(s.snapshot().error, None, "claim clears the old error");
        s.finish(SegmentState::Completed, None);
        assert_eq!(s.try_claim(), None, "completed is never restarted");
    }

    #[test]
    fn stop_flag_only_raised_while_running_and_cleared_on_finish() {
        let s = slot(0);
        assert_eq!(s.request_stop(), None);
        assert!(!s.stop_requested());
        s.try_claim().unwrap();
        assert_eq!(s.request_stop(), Some(1));
        assert!(s.stop_requested());
        s.finish(SegmentState::Stopped, None);
        assert!(!s.stop_requested());
    }

    #[test]
    fn position_is_monotonic() {
        let s = slot(10);
        s.advance_to(50);
        s.advance_to(30);
        assert_eq!(s.pos(), 50);
        assert_eq!(s.snapshot().downloaded(), 50);
    }

    #[test]
    fn release_claim_restores_previous_state() {
        let s = slot(0);
        let prev = s.try_claim().unwrap();
        s.release_claim(prev, "spawn failed".into());
        assert_eq!(s.state(), SegmentState::Idle);
    }

    #[test]
    fn reclaimed_segment_no_longer_counts_as_the_old_run() {
        let s = slot(0);
        s.try_claim().unwrap();
        let first = s.request_stop().unwrap();
        assert!(s.is_running_claim(first));
        s.finish(SegmentState::Stopped, None);
        assert!(!s.is_running_claim(first));

        s.try_claim().unwrap();
        assert_eq!(s.claim(), first + 1);
        assert_eq!(s.state(), SegmentState::Running);
        assert!(!s.is_running_claim(first), "a new run is not the stopped one");
        assert!(s.is_running_claim(first + 1));
    }
}
