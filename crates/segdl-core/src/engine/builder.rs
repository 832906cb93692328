use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::watch;

use super::inner::{EngineInner, EngineState, TaskEntry};
use super::Engine;
use crate::config::{EngineConfig, RuntimeSettings};
use crate::events::EventDispatcher;
use crate::http::{CurlClient, HttpClient};
use crate::network::{AlwaysUnmetered, NetworkMonitor};
use crate::resume_db::{ResumeDb, TaskState};
use crate::scheduler::Admission;
use crate::task::TaskEnv;
use crate::throttle::SpeedLimiter;
use crate::url_model::{DefaultFilenamePolicy, FilenamePolicy};

/// Assembles an [`Engine`]. Everything but the database and the config has
/// a production default.
pub struct EngineBuilder {
    db: ResumeDb,
    config: EngineConfig,
    client: Option<Arc<dyn HttpClient>>,
    network: Option<Arc<dyn NetworkMonitor>>,
    filenames: Option<Arc<dyn FilenamePolicy>>,
}

impl EngineBuilder {
    pub fn new(db: ResumeDb, config: EngineConfig) -> Self {
        Self {
            db,
            config,
            client: None,
            network: None,
            filenames: None,
        }
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn network_monitor(mut self, network: Arc<dyn NetworkMonitor>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn filename_policy(mut self, policy: Arc<dyn FilenamePolicy>) -> Self {
        self.filenames = Some(policy);
        self
    }

    /// Recovers tasks a previous process left in flight and re-queues them
    /// (together with anything already waiting) in creation order.
    pub async fn build(self) -> Result<Engine> {
        let recovered = self
            .db
            .recover_interrupted()
            .await
            .context("recover interrupted tasks")?;
        if recovered > 0 {
            tracing::info!(recovered, "re-queued interrupted tasks");
        }
        let records = self.db.list_tasks().await.context("load task table")?;

        let dispatcher =
            Arc::new(EventDispatcher::new().context("spawn event dispatcher thread")?);
        let settings = Arc::new(RuntimeSettings::from_config(&self.config));
        let limiter = Arc::new(SpeedLimiter::new(self.config.max_bytes_per_sec));
        let admission = Admission::new(self.config.max_running_tasks);
        let config = Arc::new(self.config);

        let env = TaskEnv {
            db: self.db.clone(),
            client: self.client.unwrap_or_else(|| Arc::new(CurlClient::new())),
            network: self.network.unwrap_or_else(|| Arc::new(AlwaysUnmetered)),
            filenames: self
                .filenames
                .unwrap_or_else(|| Arc::new(DefaultFilenamePolicy)),
            config,
            settings,
            limiter,
            events: dispatcher.sender(),
        };

        // list_tasks is ordered by creation time.
        let requeue: Vec<_> = records
            .iter()
            .filter(|r| r.state == TaskState::Waiting)
            .map(|r| r.id)
            .collect();
        let tasks: HashMap<_, _> = records
            .into_iter()
            .map(|r| (r.id, TaskEntry::new(r)))
            .collect();

        let (active, _) = watch::channel(0usize);
        let inner = Arc::new(EngineInner {
            db: self.db,
            env,
            state: Mutex::new(EngineState { admission, tasks }),
            dispatcher,
            active,
            submit_lock: tokio::sync::Mutex::new(()),
            shutting_down: AtomicBool::new(false),
        });
        let engine = Engine { inner };
        for id in requeue {
            engine.start_task(id).await;
        }
        Ok(engine)
    }
}
