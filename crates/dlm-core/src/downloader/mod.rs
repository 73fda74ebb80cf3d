//! Core segmented downloader engine.
//!
//! A `Downloader` owns one file's metadata, its fixed partition into byte
//! ranges and a shared positioned-write handle. `start_all` spawns one worker
//! thread per startable segment; `stop_all` signals running workers and waits
//! (bounded) for them to acknowledge. Workers resume from each segment's
//! current position, so stop/start and restore-after-restart share one path.

mod progress;
mod segment;
mod worker;

pub use progress::{JobState, ProgressSummary};
pub use segment::{SegmentSnapshot, SegmentState};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::error::{DlmError, Result};
use crate::fetch_head::{self, HeadResult};
use crate::naming;
use crate::persist::{PersistenceRecord, SegmentRecord};
use crate::segmenter::{self, ByteRange};
use crate::storage::{StorageWriter, StorageWriterBuilder};
use segment::SegmentSlot;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Immutable description of the file a job downloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileInfo {
    pub url: String,
    /// Display name: final component of `file_path`.
    pub file_name: String,
    /// Where the bytes go. Older settings files only carry `FileName`, which
    /// then holds the path.
    #[serde(default)]
    pub file_path: PathBuf,
    pub size: u64,
    #[serde(rename = "ETag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl FileInfo {
    /// Effective target path, accounting for records without `FilePath`.
    pub fn target_path(&self) -> PathBuf {
        if self.file_path.as_os_str().is_empty() {
            PathBuf::from(&self.file_name)
        } else {
            self.file_path.clone()
        }
    }
}

/// Whether a restored job still has to confirm the remote is unchanged.
enum RemoteCheck {
    Pending,
    Done,
}

pub struct Downloader {
    info: FileInfo,
    slots: Vec<Arc<SegmentSlot>>,
    storage: StorageWriter,
    engine: EngineConfig,
    workers: Mutex<Vec<Option<JoinHandle<()>>>>,
    remote_check: Mutex<RemoteCheck>,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("info", &self.info)
            .field("segments", &self.slots.len())
            .finish()
    }
}

impl Downloader {
    /// Probes `url` for its size and creates a fresh job writing to `file_path`.
    pub fn create(
        url: &str,
        file_path: &Path,
        part_count: i64,
        engine: EngineConfig,
    ) -> Result<Self> {
        naming::validate_url(url)?;
        let head = fetch_head::probe(url)?;
        Self::create_probed(url, file_path, part_count, &head, engine)
    }

    /// Like `create`, with the probe already done by the caller.
    pub fn create_probed(
        url: &str,
        file_path: &Path,
        part_count: i64,
        head: &HeadResult,
        engine: EngineConfig,
    ) -> Result<Self> {
        let total_size = match head.content_length {
            Some(n) if n > 0 => n,
            _ => {
                return Err(DlmError::SizeUnknown {
                    url: url.to_string(),
                })
            }
        };
        if !head.accept_ranges {
            tracing::debug!(url, "server did not advertise byte ranges; segments will verify");
        }
        if part_count > engine.max_part_count {
            tracing::warn!(part_count, max = engine.max_part_count, "part count above configured limit");
            return Err(DlmError::InvalidPartCount {
                count: part_count,
                total_size,
            });
        }
        let ranges = segmenter::plan_ranges(total_size, part_count)?;

        let mut builder = StorageWriterBuilder::create(file_path)?;
        builder.preallocate(total_size)?;
        let storage = builder.build();

        let info = FileInfo {
            url: url.to_string(),
            file_name: naming::display_name(file_path),
            file_path: file_path.to_path_buf(),
            size: total_size,
            etag: head.etag.clone(),
            last_modified: head.last_modified.clone(),
        };
        tracing::info!(
            url,
            path = %file_path.display(),
            size = total_size,
            parts = ranges.len(),
            "created download"
        );
        let slots = ranges
            .iter()
            .enumerate()
            .map(|(i, r)| Arc::new(SegmentSlot::new(i, *r, r.from)))
            .collect();
        Ok(Self::assemble(info, slots, storage, engine, RemoteCheck::Done))
    }

    /// Rebuilds a job from persisted progress. Positions are taken verbatim;
    /// nothing is fetched here. The first `start_all` re-probes the remote.
    pub fn restore(info: FileInfo, segments: &[SegmentRecord], engine: EngineConfig) -> Result<Self> {
        let ranges: Vec<ByteRange> = segments
            .iter()
            .map(|s| ByteRange {
                from: s.from,
                to: s.to,
            })
            .collect();
        let total_size = segmenter::validate_tiling(&ranges)?;
        if info.size != 0 && info.size != total_size {
            return Err(DlmError::CorruptState(format!(
                "recorded size {} does not match segment ranges ending at {}",
                info.size, total_size
            )));
        }
        if let Some(bad) = segments.iter().find(|s| s.pos < s.from || s.pos > s.to) {
            return Err(DlmError::CorruptState(format!(
                "position {} outside segment {}..{}",
                bad.pos, bad.from, bad.to
            )));
        }

        let mut ordered: Vec<&SegmentRecord> = segments.iter().collect();
        ordered.sort_by_key(|s| s.from);

        let path = info.target_path();
        let storage = StorageWriter::open_existing(&path, total_size)?;
        let info = FileInfo {
            file_name: naming::display_name(&path),
            file_path: path,
            size: total_size,
            ..info
        };
        let slots: Vec<Arc<SegmentSlot>> = ordered
            .iter()
            .enumerate()
            .map(|(i, s)| {
                Arc::new(SegmentSlot::new(
                    i,
                    ByteRange {
                        from: s.from,
                        to: s.to,
                    },
                    s.pos,
                ))
            })
            .collect();
        tracing::info!(
            url = %info.url,
            path = %info.file_path.display(),
            size = total_size,
            parts = slots.len(),
            "restored download"
        );
        Ok(Self::assemble(info, slots, storage, engine, RemoteCheck::Pending))
    }

    /// Restores from a full persistence record.
    pub fn restore_record(record: &PersistenceRecord, engine: EngineConfig) -> Result<Self> {
        Self::restore(record.file_info.clone(), &record.segments, engine)
    }

    fn assemble(
        info: FileInfo,
        slots: Vec<Arc<SegmentSlot>>,
        storage: StorageWriter,
        engine: EngineConfig,
        remote_check: RemoteCheck,
    ) -> Self {
        let workers = (0..slots.len()).map(|_| None).collect();
        Self {
            info,
            slots,
            storage,
            engine,
            workers: Mutex::new(workers),
            remote_check: Mutex::new(remote_check),
        }
    }

    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn segment_count(&self) -> usize {
        self.slots.len()
    }

    fn workers(&self) -> MutexGuard<'_, Vec<Option<JoinHandle<()>>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts every segment that is idle, stopped or failed. Running and
    /// completed segments are left alone. Returns one entry per segment that
    /// could not be started; segments that did start keep running.
    pub fn start_all(&self) -> Vec<(usize, DlmError)> {
        let startable: Vec<usize> = self
            .slots
            .iter()
            .filter(|s| s.state().is_startable())
            .map(|s| s.index())
            .collect();
        if startable.is_empty() {
            return Vec::new();
        }

        if let Err(reason) = self.confirm_remote_unchanged() {
            return startable
                .into_iter()
                .map(|i| (i, DlmError::RemoteChanged(reason.clone())))
                .collect();
        }

        let mut errors = Vec::new();
        let mut workers = self.workers();
        for slot in &self.slots {
            let Some(previous) = slot.try_claim() else {
                continue;
            };
            if let Some(old) = workers[slot.index()].take() {
                // Finished: the claim succeeded, so the old worker left Running.
                let _ = old.join();
            }
            let job = worker::SegmentJob {
                slot: Arc::clone(slot),
                url: self.info.url.clone(),
                storage: self.storage.clone(),
                total_size: self.info.size,
                engine: self.engine,
            };
            let spawned = std::thread::Builder::new()
                .name(format!("dlm-seg-{}", slot.index()))
                .spawn(move || worker::run(job));
            match spawned {
                Ok(handle) => workers[slot.index()] = Some(handle),
                Err(e) => {
                    slot.release_claim(previous, e.to_string());
                    errors.push((slot.index(), DlmError::WorkerSpawn(e)));
                }
            }
        }
        errors
    }

    /// Re-probes a restored job once before its first start. A probe that
    /// fails is not fatal; a probe showing different size or validators is.
    fn confirm_remote_unchanged(&self) -> std::result::Result<(), String> {
        let mut check = self
            .remote_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if matches!(*check, RemoteCheck::Done) {
            return Ok(());
        }
        match fetch_head::probe(&self.info.url) {
            Ok(head) => {
                if let Some(reason) = remote_difference(&self.info, &head) {
                    tracing::warn!(url = %self.info.url, "refusing to resume: {}", reason);
                    return Err(reason);
                }
                *check = RemoteCheck::Done;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    url = %self.info.url,
                    "could not re-probe remote before resume ({}); starting anyway",
                    e
                );
                Ok(())
            }
        }
    }

    /// Signals every running segment and waits up to the configured grace
    /// period for each to leave `Running`. Segments that do not acknowledge in
    /// time are reported as `StopTimeout` and stay `Running`. A segment that
    /// stopped and was restarted by a concurrent `start_all` counts as stopped.
    pub fn stop_all(&self) -> Vec<(usize, DlmError)> {
        let signaled: Vec<(&Arc<SegmentSlot>, u64)> = self
            .slots
            .iter()
            .filter_map(|s| s.request_stop().map(|claim| (s, claim)))
            .collect();
        if signaled.is_empty() {
            return Vec::new();
        }
        tracing::debug!(url = %self.info.url, segments = signaled.len(), "stopping segments");

        let grace = self.engine.stop_grace();
        let deadline = Instant::now() + grace;
        loop {
            let pending = signaled
                .iter()
                .filter(|(s, claim)| s.is_running_claim(*claim))
                .count();
            if pending == 0 || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(STOP_POLL_INTERVAL);
        }

        let mut errors = Vec::new();
        // start_all claims under this lock, so claims cannot move while we look.
        let mut workers = self.workers();
        for (slot, claim) in signaled {
            if slot.is_running_claim(claim) {
                tracing::warn!(segment = slot.index(), "segment did not stop in time");
                errors.push((
                    slot.index(),
                    DlmError::StopTimeout {
                        grace_ms: grace.as_millis() as u64,
                    },
                ));
            } else if slot.claim() == claim {
                // Re-claimed slots had their old worker joined by start_all.
                if let Some(handle) = workers[slot.index()].take() {
                    let _ = handle.join();
                }
            }
        }
        if let Err(e) = self.storage.sync() {
            tracing::warn!("sync after stop failed: {}", e);
        }
        errors
    }

    /// Value copies of all segments, in index order.
    pub fn progress(&self) -> Vec<SegmentSnapshot> {
        self.slots.iter().map(|s| s.snapshot()).collect()
    }

    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary::from_segments(self.info.size, &self.progress())
    }

    /// Durable view of this job, for the settings file.
    pub fn to_record(&self) -> PersistenceRecord {
        PersistenceRecord {
            file_info: self.info.clone(),
            segments: self
                .progress()
                .iter()
                .map(|s| SegmentRecord {
                    from: s.from,
                    to: s.to,
                    pos: s.pos,
                    speed: s.speed,
                })
                .collect(),
        }
    }

    /// Blocks until no worker is running. Used by tests and shutdown paths
    /// that already requested a stop or expect completion.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self
            .slots
            .iter()
            .any(|s| s.state() == SegmentState::Running)
        {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(STOP_POLL_INTERVAL);
        }
        let mut workers = self.workers();
        for handle in workers.iter_mut().filter_map(Option::take) {
            let _ = handle.join();
        }
        true
    }
}

impl Drop for Downloader {
    fn drop(&mut self) {
        let errors = self.stop_all();
        if !errors.is_empty() {
            tracing::warn!(
                url = %self.info.url,
                "dropping downloader with {} segment(s) still running",
                errors.len()
            );
        }
    }
}

/// Describes how the remote differs from the record, if it does.
fn remote_difference(info: &FileInfo, head: &HeadResult) -> Option<String> {
    let mut changed = Vec::new();
    if head.content_length != Some(info.size) {
        changed.push(format!(
            "size {} -> {}",
            info.size,
            head.content_length
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        ));
    }
    if let (Some(old), Some(new)) = (&info.etag, &head.etag) {
        if old != new {
            changed.push("ETag".to_string());
        }
    }
    if let (Some(old), Some(new)) = (&info.last_modified, &head.last_modified) {
        if old != new {
            changed.push("Last-Modified".to_string());
        }
    }
    (!changed.is_empty()).then(|| changed.join(", "))
}
