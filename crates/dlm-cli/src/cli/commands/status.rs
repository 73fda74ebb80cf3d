//! `dlm status` – list jobs saved in the settings file.

use anyhow::Result;
use dlm_core::config::DlmConfig;
use dlm_core::persist::{self, PersistenceRecord};

pub fn run_status(cfg: &DlmConfig) -> Result<()> {
    let path = cfg.settings_path()?;
    let jobs = persist::load_settings(&path)?;
    if jobs.is_empty() {
        println!("No saved jobs in {}.", path.display());
        return Ok(());
    }
    println!(
        "{:<4} {:>14} {:>14} {:>5}  {}",
        "ID", "SIZE", "DOWNLOADED", "PCT", "FILE"
    );
    for (id, job) in jobs.iter().enumerate() {
        println!("{}", status_line(id, job));
    }
    Ok(())
}

fn status_line(id: usize, job: &PersistenceRecord) -> String {
    let size = job.file_info.size;
    let done = job.downloaded();
    let pct = if size > 0 {
        (done as u128 * 100 / size as u128) as u64
    } else {
        0
    };
    format!(
        "{:<4} {:>14} {:>14} {:>4}%  {}",
        id,
        size,
        done,
        pct,
        job.file_info.target_path().display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlm_core::persist::SegmentRecord;
    use dlm_core::FileInfo;
    use std::path::PathBuf;

    #[test]
    fn status_line_shows_percent_and_path() {
        let job = PersistenceRecord {
            file_info: FileInfo {
                url: "http://h/a.iso".to_string(),
                file_name: "a.iso".to_string(),
                file_path: PathBuf::from("/data/a.iso"),
                size: 200,
                etag: None,
                last_modified: None,
            },
            segments: vec![
                SegmentRecord { from: 0, to: 100, pos: 100, speed: 0 },
                SegmentRecord { from: 100, to: 200, pos: 133, speed: 0 },
            ],
        };
        let line = status_line(3, &job);
        assert!(line.starts_with("3 "));
        assert!(line.contains(" 133 "));
        assert!(line.contains("66%"));
        assert!(line.ends_with("/data/a.iso"));
    }
}
