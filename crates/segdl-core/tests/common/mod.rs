#![allow(dead_code)]

pub mod memory_http;
pub mod range_server;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use segdl_core::config::EngineConfig;
use segdl_core::http::HttpClient;
use segdl_core::network::{AlwaysUnmetered, NetworkMonitor};
use segdl_core::{DownloadListener, Engine, EngineEvent, ResumeDb, TaskId, TaskRecord, TaskState};
use tempfile::TempDir;

/// Engine over an on-disk database in a temp dir, plus a download dir.
pub struct Harness {
    pub engine: Engine,
    pub events: Arc<EventLog>,
    pub state_dir: TempDir,
    pub download_dir: TempDir,
}

impl Harness {
    pub async fn new(client: Arc<dyn HttpClient>, config: EngineConfig) -> Self {
        Self::with_network(client, config, Arc::new(AlwaysUnmetered)).await
    }

    pub async fn with_network(
        client: Arc<dyn HttpClient>,
        config: EngineConfig,
        network: Arc<dyn NetworkMonitor>,
    ) -> Self {
        let state_dir = tempfile::tempdir().unwrap();
        let download_dir = tempfile::tempdir().unwrap();
        let db = ResumeDb::open_at(state_dir.path().join("tasks.db"))
            .await
            .unwrap();
        let engine = Engine::builder(db, config)
            .http_client(client)
            .network_monitor(network)
            .build()
            .await
            .unwrap();
        let events = EventLog::attach(&engine);
        Self {
            engine,
            events,
            state_dir,
            download_dir,
        }
    }

    pub fn task(&self, id: TaskId) -> TaskRecord {
        self.engine.query(id).expect("task exists")
    }

    pub async fn wait_for_state(&self, id: TaskId, state: TaskState) -> TaskRecord {
        wait_until(Duration::from_secs(20), || self.task(id).state == state).await;
        self.task(id)
    }

    pub async fn wait_for_bytes(&self, id: TaskId, at_least: u64) {
        wait_until(Duration::from_secs(20), || self.task(id).downloaded_size >= at_least).await;
    }
}

pub async fn open_engine(
    state_dir: &TempDir,
    client: Arc<dyn HttpClient>,
    config: EngineConfig,
) -> Engine {
    let db = ResumeDb::open_at(state_dir.path().join("tasks.db"))
        .await
        .unwrap();
    Engine::builder(db, config)
        .http_client(client)
        .build()
        .await
        .unwrap()
}

/// Small, fast settings for tests.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        progress_interval_ms: 20,
        checkpoint_interval_ms: 50,
        acquire_timeout_ms: 50,
        min_chunk_bytes: 64 * 1024,
        buffer_bytes: 16 * 1024,
        ..EngineConfig::default()
    }
}

/// Polls `cond` every 10ms; panics after `timeout`.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met within {timeout:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Records every event delivered to it.
#[derive(Default)]
pub struct EventLog(Mutex<Vec<EngineEvent>>);

impl EventLog {
    pub fn attach(engine: &Engine) -> Arc<Self> {
        let log = Arc::new(Self::default());
        engine.add_listener(log.clone());
        log
    }

    pub fn all(&self) -> Vec<EngineEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn for_task(&self, id: TaskId) -> Vec<EngineEvent> {
        self.all().into_iter().filter(|e| e.task_id() == id).collect()
    }
}

impl DownloadListener for EventLog {
    fn on_event(&self, event: &EngineEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

/// Deterministic test body: `len` bytes of a repeating non-trivial pattern.
pub fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
