//! Positioned writer over an open temp file.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Open temp file owned by a task's writer.
pub struct TempFile {
    file: File,
    path: PathBuf,
}

impl TempFile {
    pub(crate) fn from_parts(file: File, path: PathBuf) -> Self {
        Self { file, path }
    }

    /// Open an existing temp file for resume (read+write, no truncation).
    pub fn open_existing(path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open existing temp file: {}", path.display()))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Write all of `data` at `offset` without moving a shared cursor.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.file
            .write_all_at(data, offset)
            .context("storage write_at failed")
    }

    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = &self.file;
        f.seek(SeekFrom::Start(offset))
            .context("storage seek failed")?;
        f.write_all(data).context("storage write failed")
    }

    /// Flush file data (not metadata) so a checkpoint never runs ahead of the disk.
    pub fn sync_data(&self) -> Result<()> {
        self.file.sync_data().context("storage sync failed")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync, close, and atomically rename onto `final_path` (replacing it if present).
    pub fn finalize(self, final_path: &Path) -> Result<()> {
        self.file.sync_all().context("storage sync failed")?;
        let temp_path = self.path;
        drop(self.file);
        std::fs::rename(&temp_path, final_path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                temp_path.display(),
                final_path.display()
            )
        })
    }
}
