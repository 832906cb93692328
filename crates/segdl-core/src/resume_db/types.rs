//! Types persisted by the resume database.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::http::ByteRange;
use crate::storage;

/// Task identifier, assigned by the database on first persist.
pub type TaskId = i64;

/// Lifecycle state of a download task, stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Preparing,
    Connecting,
    Running,
    Pausing,
    Paused,
    Finish,
    Waiting,
    Canceled,
    Error,
    FatalError,
}

impl TaskState {
    pub const ALL: [TaskState; 11] = [
        TaskState::Pending,
        TaskState::Preparing,
        TaskState::Connecting,
        TaskState::Running,
        TaskState::Pausing,
        TaskState::Paused,
        TaskState::Finish,
        TaskState::Waiting,
        TaskState::Canceled,
        TaskState::Error,
        TaskState::FatalError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Preparing => "preparing",
            TaskState::Connecting => "connecting",
            TaskState::Running => "running",
            TaskState::Pausing => "pausing",
            TaskState::Paused => "paused",
            TaskState::Finish => "finish",
            TaskState::Waiting => "waiting",
            TaskState::Canceled => "canceled",
            TaskState::Error => "error",
            TaskState::FatalError => "fatal_error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .unwrap_or(TaskState::Error)
    }

    /// Finish, Canceled and FatalError: only an explicit restart leaves these.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Finish | TaskState::Canceled | TaskState::FatalError
        )
    }

    /// States in which a driver is (or was, before a crash) working on the task.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            TaskState::Preparing | TaskState::Connecting | TaskState::Running | TaskState::Pausing
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller submits. The id is assigned when it is first stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub url: String,
    pub dest_dir: PathBuf,
    /// Destination filename; derived from the response when None.
    pub filename: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Per-task cap in bytes per second.
    pub speed_limit: Option<u64>,
}

impl NewTask {
    pub fn new(url: impl Into<String>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest_dir: dest_dir.into(),
            filename: None,
            headers: BTreeMap::new(),
            speed_limit: None,
        }
    }

    pub fn filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn speed_limit(mut self, bytes_per_sec: u64) -> Self {
        self.speed_limit = Some(bytes_per_sec);
        self
    }
}

/// Full persisted view of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub id: TaskId,
    pub url: String,
    pub dest_dir: PathBuf,
    pub filename: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Total size in bytes; None until known (persisted as -1).
    pub total_size: Option<u64>,
    /// Sum of chunk progress at the last checkpoint.
    pub downloaded_size: u64,
    pub state: TaskState,
    pub resumable: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub speed_limit: Option<u64>,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds.
    pub finished_at: Option<i64>,
    pub error_code: Option<u32>,
    pub error_message: Option<String>,
}

impl TaskRecord {
    /// Final path of the download, once the filename is known.
    pub fn destination(&self) -> Option<PathBuf> {
        self.filename.as_ref().map(|f| self.dest_dir.join(f))
    }

    /// Temp file the writer fills before the final rename.
    pub fn temp_path(&self) -> Option<PathBuf> {
        self.destination().map(|p| storage::temp_path(&p))
    }

    /// True when `other` would download the same thing to the same place.
    pub fn same_target(&self, url: &str, dest_dir: &Path, filename: Option<&str>) -> bool {
        self.url == url
            && self.dest_dir == dest_dir
            && match filename {
                Some(name) => self.filename.as_deref() == Some(name),
                None => true,
            }
    }

    pub fn clear_error(&mut self) {
        self.error_code = None;
        self.error_message = None;
    }
}

/// Progress of one byte range of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRecord {
    /// 0-based position in the plan.
    pub index: u32,
    /// Absolute offset of the first byte of the chunk.
    pub start: u64,
    /// Bytes of the chunk already on disk.
    pub downloaded: u64,
    /// Chunk length; None for a single stream of unknown size (persisted as -1).
    pub length: Option<u64>,
}

impl ChunkRecord {
    /// Offset of the next byte to fetch.
    pub fn next_offset(&self) -> u64 {
        self.start + self.downloaded
    }

    pub fn remaining(&self) -> Option<u64> {
        self.length.map(|len| len.saturating_sub(self.downloaded))
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Range to request for the rest of this chunk.
    pub fn request_range(&self) -> ByteRange {
        match self.length {
            Some(len) => ByteRange::inclusive(self.next_offset(), self.start + len - 1),
            None => ByteRange::starting_at(self.next_offset()),
        }
    }
}
