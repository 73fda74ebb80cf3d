//! Settings file: the jobs list written on shutdown and read at startup.
//!
//! Key names are PascalCase to stay readable by older front-ends and
//! settings files (`Ds` / `FI` / `Dp`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::downloader::FileInfo;

/// Durable state of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SegmentRecord {
    pub from: u64,
    pub to: u64,
    pub pos: u64,
    #[serde(default)]
    pub speed: u64,
}

/// Everything needed to restore one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceRecord {
    #[serde(rename = "FI")]
    pub file_info: FileInfo,
    #[serde(rename = "Dp", default)]
    pub segments: Vec<SegmentRecord>,
}

impl PersistenceRecord {
    pub fn downloaded(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| s.pos.saturating_sub(s.from))
            .sum()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(rename = "Ds", default)]
    jobs: Vec<PersistenceRecord>,
}

/// Default jobs file: `~/.local/state/dlm/jobs.json`.
pub fn default_settings_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dlm")?;
    Ok(xdg_dirs.get_state_home().join("jobs.json"))
}

/// Reads persisted jobs. A missing file is an empty list; an unreadable or
/// malformed one is an error.
pub fn load_settings(path: &Path) -> Result<Vec<PersistenceRecord>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("no settings file at {}; starting empty", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e).with_context(|| format!("read settings: {}", path.display())),
    };
    let file: SettingsFile = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse settings: {}", path.display()))?;
    Ok(file.jobs)
}

/// Writes `jobs` to `path` via a temporary file and rename, so a crash mid-write
/// leaves the previous file intact.
pub fn save_settings(path: &Path, jobs: &[PersistenceRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir: {}", parent.display()))?;
    }
    let file = SettingsFile {
        jobs: jobs.to_vec(),
    };
    let json = serde_json::to_vec_pretty(&file).context("serialize settings")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("write settings: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    tracing::info!(jobs = jobs.len(), "saved settings to {}", path.display());
    Ok(())
}
