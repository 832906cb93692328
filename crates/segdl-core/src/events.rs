//! Task lifecycle events and listener fan-out.
//!
//! Events are queued to a single dispatcher thread and delivered to every
//! registered listener in registration order, so a listener sees the events
//! of one task in the order they happened and never runs on a download or
//! engine thread.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::resume_db::{TaskId, TaskRecord};

/// Something that happened to a task.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Submitted and stored.
    TaskAdded(TaskRecord),
    /// Probing the server and planning chunks.
    Preparing(TaskId),
    /// Chunk plan is in place and workers are about to start.
    Started(TaskRecord),
    Progress {
        id: TaskId,
        total: Option<u64>,
        current: u64,
        bytes_per_sec: u64,
    },
    /// Stop requested; workers are draining.
    Pausing(TaskId),
    Paused(TaskId),
    /// Queued behind the running limit.
    Waiting(TaskId),
    Canceled(TaskId),
    Finished(TaskRecord),
    Error {
        id: TaskId,
        code: u32,
        message: String,
        fatal: bool,
    },
    /// Stored fields changed (filename, size, ...).
    RecordUpdated(TaskRecord),
    TaskRemoved(TaskId),
}

impl EngineEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            EngineEvent::TaskAdded(r)
            | EngineEvent::Started(r)
            | EngineEvent::Finished(r)
            | EngineEvent::RecordUpdated(r) => r.id,
            EngineEvent::Preparing(id)
            | EngineEvent::Pausing(id)
            | EngineEvent::Paused(id)
            | EngineEvent::Waiting(id)
            | EngineEvent::Canceled(id)
            | EngineEvent::TaskRemoved(id) => *id,
            EngineEvent::Progress { id, .. } | EngineEvent::Error { id, .. } => *id,
        }
    }
}

/// Receives engine events on the dispatcher thread.
pub trait DownloadListener: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

/// Handle returned by `add_listener`, used to remove it again.
pub type ListenerId = u64;

type Listeners = Arc<Mutex<Vec<(ListenerId, Arc<dyn DownloadListener>)>>>;

enum Message {
    Event(EngineEvent),
    Flush(Sender<()>),
}

/// Cloneable producer side; used by task threads.
#[derive(Clone)]
pub struct EventSender(Sender<Message>);

impl EventSender {
    pub fn send(&self, event: EngineEvent) {
        // The dispatcher only goes away at shutdown; late events are dropped.
        let _ = self.0.send(Message::Event(event));
    }
}

/// Owns the dispatcher thread and the listener list.
pub struct EventDispatcher {
    sender: EventSender,
    listeners: Listeners,
    next_id: Mutex<ListenerId>,
}

impl EventDispatcher {
    pub fn new() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let listeners: Listeners = Arc::new(Mutex::new(Vec::new()));
        let worker_listeners = Arc::clone(&listeners);
        thread::Builder::new()
            .name("segdl-events".into())
            .spawn(move || dispatch_loop(rx, worker_listeners))?;
        Ok(Self {
            sender: EventSender(tx),
            listeners,
            next_id: Mutex::new(0),
        })
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn send(&self, event: EngineEvent) {
        self.sender.send(event);
    }

    pub fn add_listener(&self, listener: Arc<dyn DownloadListener>) -> ListenerId {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        self.listeners.lock().unwrap().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Blocks until every event sent before this call has been delivered.
    pub fn flush(&self) {
        let (tx, rx) = mpsc::channel();
        if self.sender.0.send(Message::Flush(tx)).is_ok() {
            let _ = rx.recv();
        }
    }
}

fn dispatch_loop(rx: Receiver<Message>, listeners: Listeners) {
    for msg in rx {
        match msg {
            Message::Event(event) => {
                // Snapshot so listeners may add/remove listeners from a callback.
                let current: Vec<Arc<dyn DownloadListener>> = listeners
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|(_, l)| Arc::clone(l))
                    .collect();
                for l in current {
                    l.on_event(&event);
                }
            }
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("event dispatcher stopped");
}

/// Adapter so a closure can be registered as a listener.
pub struct FnListener<F>(pub F);

impl<F> DownloadListener for FnListener<F>
where
    F: Fn(&EngineEvent) + Send + Sync,
{
    fn on_event(&self, event: &EngineEvent) {
        (self.0)(event)
    }
}
