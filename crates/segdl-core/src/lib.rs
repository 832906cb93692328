pub mod config;
pub mod logging;

pub mod chunker;
pub mod control;
pub mod engine;
pub mod error;
pub mod events;
pub mod http;
pub mod network;
pub mod pipeline;
pub mod probe;
pub mod resume_db;
pub mod retry;
pub mod safe_resume;
pub mod scheduler;
pub mod storage;
pub mod task;
pub mod throttle;
pub mod url_model;

pub use engine::{Engine, EngineBuilder, EngineError};
pub use error::DownloadError;
pub use events::{DownloadListener, EngineEvent, FnListener, ListenerId};
pub use resume_db::{NewTask, ResumeDb, TaskId, TaskRecord, TaskState};
