//! Creation of a fresh target file for a new job.

use std::fs::File;
use std::path::{Path, PathBuf};

use super::writer::StorageWriter;
use crate::error::{DlmError, Result};
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// A newly created, empty target file. Sized with [`preallocate`] before it
/// becomes the shared [`StorageWriter`] the segment workers write through.
///
/// [`preallocate`]: StorageWriterBuilder::preallocate
pub struct StorageWriterBuilder {
    file: File,
    path: PathBuf,
}

impl StorageWriterBuilder {
    /// Opens `path` read/write, creating it or discarding whatever a previous
    /// job left there.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| DlmError::file_io(path, e))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Sizes the file to the job's total length so every segment offset is
    /// writable from the start. Reserves real blocks with `posix_fallocate`
    /// where the filesystem supports it; otherwise the file is extended
    /// sparsely.
    pub fn preallocate(&mut self, size: u64) -> Result<()> {
        #[cfg(unix)]
        {
            // SAFETY: the descriptor belongs to `self.file` for this whole call.
            let rc = unsafe { libc::posix_fallocate(self.file.as_raw_fd(), 0, size as libc::off_t) };
            if rc == 0 {
                return Ok(());
            }
            tracing::debug!(
                path = %self.path.display(),
                errno = rc,
                size,
                "posix_fallocate unavailable, extending sparsely"
            );
        }
        self.file
            .set_len(size)
            .map_err(|e| DlmError::file_io(&self.path, e))
    }

    pub fn build(self) -> StorageWriter {
        StorageWriter::from_file_and_path(self.file, self.path)
    }
}
