//! Temp file lifecycle for a task.
//!
//! The writer fills `<destination>.part` with positioned writes, syncs it at
//! checkpoints, and renames it over the destination when every chunk is done.
//! Cancel and restart remove it.

mod builder;
mod writer;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use builder::TempFileBuilder;
pub use writer::TempFile;

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `file.iso` → `file.iso.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Removes a file if it exists; a missing file is not an error.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn temp_path_appends_part() {
        let p = temp_path(Path::new("file.iso"));
        assert_eq!(p.to_string_lossy(), "file.iso.part");
        let p2 = temp_path(Path::new("/tmp/archive.zip"));
        assert_eq!(p2.to_string_lossy(), "/tmp/archive.zip.part");
    }

    #[test]
    fn create_preallocate_write_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("output.bin");
        let tp = temp_path(&final_path);

        let mut builder = TempFileBuilder::create(&tp).unwrap();
        builder.preallocate(100).unwrap();
        let file = builder.build();

        file.write_at(0, b"hello").unwrap();
        file.write_at(50, b"world").unwrap();
        file.write_at(95, b"xy").unwrap();
        file.sync_data().unwrap();
        file.finalize(&final_path).unwrap();

        assert!(!tp.exists());
        let mut f = std::fs::File::open(&final_path).unwrap();
        let mut buf = vec![0u8; 100];
        f.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[0..5], b"hello");
        assert_eq!(&buf[50..55], b"world");
        assert_eq!(&buf[95..97], b"xy");
    }

    #[test]
    fn reopen_keeps_existing_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("out.part");
        {
            let mut builder = TempFileBuilder::create(&tp).unwrap();
            builder.preallocate(8).unwrap();
            let file = builder.build();
            file.write_at(0, b"abcd").unwrap();
        }
        let file = TempFile::open_existing(&tp).unwrap();
        file.write_at(4, b"efgh").unwrap();
        let final_p = dir.path().join("out.bin");
        file.finalize(&final_p).unwrap();
        assert_eq!(std::fs::read(&final_p).unwrap(), b"abcdefgh");
    }

    #[test]
    fn remove_if_exists_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("gone.part");
        assert!(!remove_if_exists(&p).unwrap());
        std::fs::write(&p, b"x").unwrap();
        assert!(remove_if_exists(&p).unwrap());
        assert!(!p.exists());
    }
}
