//! Error taxonomy for the engine and the job list.
//!
//! Job-level variants (`SizeUnknown`, `InvalidPartCount`, `CorruptState`,
//! `InvalidUrl`) abort creation or restore. Segment-level variants
//! (`RangeUnsupported`, `Network`, `FileIo` during transfer) only mark the
//! affected segment `Failed` and are reported per segment.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DlmError {
    /// The server did not report a usable content length.
    #[error("size unknown: server did not report a length for {url}")]
    SizeUnknown { url: String },

    #[error("invalid part count {count} for a file of {total_size} bytes")]
    InvalidPartCount { count: i64, total_size: u64 },

    #[error("file I/O error on {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The server ignored or mis-honored the requested byte range.
    #[error("range unsupported: {0}")]
    RangeUnsupported(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("corrupt persisted state: {0}")]
    CorruptState(String),

    #[error("error: id {index} is out of jobs list (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("segment did not acknowledge stop within {grace_ms} ms")]
    StopTimeout { grace_ms: u64 },

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Restored job whose remote resource no longer matches the record.
    #[error("remote resource changed since the job was saved ({0}); remove and re-add the job")]
    RemoteChanged(String),

    #[error("could not spawn segment worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

impl DlmError {
    pub(crate) fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DlmError::FileIo {
            path: path.into(),
            source,
        }
    }
}

impl From<curl::Error> for DlmError {
    fn from(e: curl::Error) -> Self {
        DlmError::Network(e.to_string())
    }
}

pub type Result<T, E = DlmError> = std::result::Result<T, E>;
