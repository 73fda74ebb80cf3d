//! The job list behind the control plane.
//!
//! Jobs are addressed by their position in the list; removing one shifts the
//! indices of those after it. The list itself sits behind one mutex. Long
//! engine calls (probe, start, stop) run on a cloned handle after the lock is
//! released, so a slow stop never blocks progress polling.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::{DlmConfig, EngineConfig};
use crate::downloader::{Downloader, JobState};
use crate::error::{DlmError, Result};
use crate::fetch_head;
use crate::naming;
use crate::persist::PersistenceRecord;

/// Body of an `add_task` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewJob {
    pub url: String,
    #[serde(default)]
    pub part_count: Option<i64>,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// One row of `progress.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobProgress {
    pub id: usize,
    pub file_name: String,
    pub size: u64,
    pub downloaded: u64,
    /// Whole percent, rounded down.
    pub progress: u64,
    /// Bytes per second across all segments.
    pub speed: u64,
    pub state: JobState,
}

/// Errors from individual segments, keyed by segment index.
pub type SegmentErrors = Vec<(usize, DlmError)>;

/// Values applied to jobs added without explicit settings.
#[derive(Debug, Clone)]
pub struct JobDefaults {
    pub part_count: i64,
    pub download_dir: PathBuf,
    pub engine: EngineConfig,
}

impl JobDefaults {
    pub fn from_config(cfg: &DlmConfig) -> Self {
        Self {
            part_count: cfg.default_part_count,
            download_dir: cfg
                .download_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            engine: cfg.engine,
        }
    }
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self::from_config(&DlmConfig::default())
    }
}

pub struct JobList {
    jobs: Mutex<Vec<Arc<Downloader>>>,
    defaults: JobDefaults,
}

impl JobList {
    pub fn new(defaults: JobDefaults) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            defaults,
        }
    }

    fn jobs(&self) -> MutexGuard<'_, Vec<Arc<Downloader>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Arc<Downloader>> {
        let jobs = self.jobs();
        jobs.get(index)
            .cloned()
            .ok_or(DlmError::IndexOutOfRange {
                index,
                len: jobs.len(),
            })
    }

    /// Probes the URL, picks the target path and appends a new idle job.
    /// Returns the new job's index.
    pub fn add(&self, req: &NewJob) -> Result<usize> {
        let url = naming::validate_url(&req.url)?;
        let part_count = req.part_count.unwrap_or(self.defaults.part_count);
        let head = fetch_head::probe(&req.url)?;
        let path = naming::resolve_target_path(
            req.file_path.as_deref().unwrap_or(""),
            &url,
            head.content_disposition.as_deref(),
            &self.defaults.download_dir,
        );
        let dl = Downloader::create_probed(
            &req.url,
            &path,
            part_count,
            &head,
            self.defaults.engine,
        )?;
        Ok(self.push(dl))
    }

    /// Appends an already constructed job.
    pub fn push(&self, dl: Downloader) -> usize {
        let mut jobs = self.jobs();
        jobs.push(Arc::new(dl));
        jobs.len() - 1
    }

    pub fn start(&self, index: usize) -> Result<SegmentErrors> {
        let dl = self.get(index)?;
        let errors = dl.start_all();
        log_segment_errors("start", index, &errors);
        Ok(errors)
    }

    pub fn stop(&self, index: usize) -> Result<SegmentErrors> {
        let dl = self.get(index)?;
        let errors = dl.stop_all();
        log_segment_errors("stop", index, &errors);
        Ok(errors)
    }

    /// Takes the job out of the list, then stops it.
    pub fn remove(&self, index: usize) -> Result<SegmentErrors> {
        let dl = {
            let mut jobs = self.jobs();
            if index >= jobs.len() {
                return Err(DlmError::IndexOutOfRange {
                    index,
                    len: jobs.len(),
                });
            }
            jobs.remove(index)
        };
        let errors = dl.stop_all();
        log_segment_errors("stop", index, &errors);
        tracing::info!(index, file = %dl.info().file_name, "removed job");
        Ok(errors)
    }

    fn snapshot(&self) -> Vec<Arc<Downloader>> {
        self.jobs().clone()
    }

    /// Starts every job. Returns the number of segment errors.
    pub fn start_all_jobs(&self) -> usize {
        self.snapshot()
            .iter()
            .enumerate()
            .map(|(i, dl)| {
                let errors = dl.start_all();
                log_segment_errors("start", i, &errors);
                errors.len()
            })
            .sum()
    }

    /// Stops every job. Returns the number of segment errors.
    pub fn stop_all_jobs(&self) -> usize {
        self.snapshot()
            .iter()
            .enumerate()
            .map(|(i, dl)| {
                let errors = dl.stop_all();
                log_segment_errors("stop", i, &errors);
                errors.len()
            })
            .sum()
    }

    pub fn progress(&self) -> Vec<JobProgress> {
        self.snapshot()
            .iter()
            .enumerate()
            .map(|(id, dl)| {
                let s = dl.summary();
                JobProgress {
                    id,
                    file_name: dl.info().file_name.clone(),
                    size: s.size,
                    downloaded: s.downloaded,
                    progress: s.percent,
                    speed: s.speed,
                    state: s.state,
                }
            })
            .collect()
    }

    pub fn records(&self) -> Vec<PersistenceRecord> {
        self.snapshot().iter().map(|dl| dl.to_record()).collect()
    }

    /// Stops everything and returns the records to persist.
    pub fn drain(&self) -> Vec<PersistenceRecord> {
        let errors = self.stop_all_jobs();
        if errors > 0 {
            tracing::warn!(errors, "some segments did not stop before saving");
        }
        self.records()
    }

    /// Restores persisted jobs in order. Records that fail to restore are
    /// logged and skipped. Returns how many were restored.
    pub fn restore(&self, records: &[PersistenceRecord]) -> usize {
        let mut restored = 0;
        for record in records {
            match Downloader::restore_record(record, self.defaults.engine) {
                Ok(dl) => {
                    self.push(dl);
                    restored += 1;
                }
                Err(e) => tracing::warn!(
                    url = %record.file_info.url,
                    "skipping saved job: {}",
                    e
                ),
            }
        }
        tracing::info!(restored, total = records.len(), "restored saved jobs");
        restored
    }
}

fn log_segment_errors(op: &str, job: usize, errors: &SegmentErrors) {
    for (segment, e) in errors {
        tracing::warn!(job, segment, "{} failed: {}", op, e);
    }
}
