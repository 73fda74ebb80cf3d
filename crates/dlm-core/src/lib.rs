//! Segmented HTTP download engine: probe, split, fetch ranges concurrently,
//! stop and resume from persisted positions.

pub mod config;
pub mod downloader;
pub mod error;
pub mod fetch_head;
pub mod jobs;
pub mod logging;
pub mod naming;
pub mod persist;
pub mod segmenter;
pub mod storage;

pub use downloader::{Downloader, FileInfo, JobState, ProgressSummary, SegmentSnapshot, SegmentState};
pub use error::{DlmError, Result};
pub use jobs::{JobDefaults, JobList, JobProgress, NewJob};
pub use persist::{PersistenceRecord, SegmentRecord};
