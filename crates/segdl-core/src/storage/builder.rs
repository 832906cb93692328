//! Creating and preallocating a fresh temp file.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

use super::writer::TempFile;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Builder for a new temp file. Call `preallocate` (when the size is known) then `build`.
pub struct TempFileBuilder {
    file: File,
    path: PathBuf,
}

impl TempFileBuilder {
    /// Create a new temp file at `path`, truncating any leftover.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to create temp file: {}", path.display()))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Reserve `size` bytes. On Unix tries `posix_fallocate` so a full disk is
    /// reported up front; other failures fall back to `set_len`.
    pub fn preallocate(&mut self, size: u64) -> Result<()> {
        #[cfg(unix)]
        {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            if r == libc::ENOSPC {
                return Err(std::io::Error::from_raw_os_error(r))
                    .context("failed to preallocate temp file");
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file
            .set_len(size)
            .context("failed to preallocate temp file")?;
        Ok(())
    }

    pub fn build(self) -> TempFile {
        TempFile::from_parts(self.file, self.path)
    }
}
