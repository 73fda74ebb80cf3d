//! Concurrent offset writer for the target file.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

use crate::error::{DlmError, Result};

/// Shared handle to the target file. Cheap to clone; each `write_at` names its
/// absolute offset (pwrite-style), so clones never share a cursor.
#[derive(Clone, Debug)]
pub struct StorageWriter {
    file: Arc<File>,
    path: PathBuf,
}

impl StorageWriter {
    pub(crate) fn from_file_and_path(file: File, path: PathBuf) -> Self {
        Self {
            file: Arc::new(file),
            path,
        }
    }

    /// Open an existing file for resume (read+write, no truncation). A file
    /// shorter than `size` is extended; its existing bytes are kept.
    pub fn open_existing(path: &Path, size: u64) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| DlmError::file_io(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| DlmError::file_io(path, e))?
            .len();
        if len < size {
            tracing::debug!(path = %path.display(), len, size, "extending short file on resume");
            file.set_len(size).map_err(|e| DlmError::file_io(path, e))?;
        }
        Ok(Self::from_file_and_path(file, path.to_path_buf()))
    }

    /// Write all of `data` at `offset`.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    #[cfg(windows)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut done = 0usize;
        while done < data.len() {
            let n = self.file.seek_write(&data[done..], offset + done as u64)?;
            if n == 0 {
                return Err(std::io::ErrorKind::WriteZero.into());
            }
            done += n;
        }
        Ok(())
    }

    /// Sync file data to disk.
    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| DlmError::file_io(&self.path, e))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
