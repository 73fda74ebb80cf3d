//! Aggregate progress of one job, computed on demand from segment snapshots.

use serde::Serialize;

use super::segment::{SegmentSnapshot, SegmentState};

/// Overall state of a job, derived from its segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Idle,
    Running,
    Stopped,
    Completed,
    Failed,
}

/// Totals across all segments of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSummary {
    pub size: u64,
    /// Σ(pos − from).
    pub downloaded: u64,
    /// Σ speed, bytes per second.
    pub speed: u64,
    /// floor(downloaded × 100 / size).
    pub percent: u64,
    pub state: JobState,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub stopped: usize,
    pub idle: usize,
}

impl ProgressSummary {
    pub fn from_segments(size: u64, segments: &[SegmentSnapshot]) -> Self {
        let mut s = ProgressSummary {
            size,
            downloaded: 0,
            speed: 0,
            percent: 0,
            state: JobState::Idle,
            running: 0,
            completed: 0,
            failed: 0,
            stopped: 0,
            idle: 0,
        };
        for seg in segments {
            s.downloaded += seg.downloaded();
            s.speed += seg.speed;
            match seg.state {
                SegmentState::Idle => s.idle += 1,
                SegmentState::Running => s.running += 1,
                SegmentState::Stopped => s.stopped += 1,
                SegmentState::Completed => s.completed += 1,
                SegmentState::Failed => s.failed += 1,
            }
        }
        // size is never 0 for a constructed Downloader.
        if size > 0 {
            s.percent = (s.downloaded as u128 * 100 / size as u128) as u64;
        }
        s.state = if s.running > 0 {
            JobState::Running
        } else if !segments.is_empty() && s.completed == segments.len() {
            JobState::Completed
        } else if s.failed > 0 {
            JobState::Failed
        } else if s.stopped > 0 {
            JobState::Stopped
        } else {
            JobState::Idle
        };
        s
    }
}
