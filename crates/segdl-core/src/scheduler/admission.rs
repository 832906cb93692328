//! Admission: at most `max_running` tasks run, the rest wait in FIFO order.
//!
//! Pure bookkeeping; the engine calls it under its state mutex and acts on
//! the decisions (spawning runs, stopping preempted ones).

use std::collections::HashSet;

use super::queue::UniqueQueue;
use crate::resume_db::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDecision {
    /// A slot was free; the caller must start the task now.
    Start,
    /// Appended to the waiting queue.
    Queued,
    AlreadyQueued,
    AlreadyRunning,
}

#[derive(Debug)]
pub struct Admission {
    max_running: usize,
    /// Tasks holding a slot, in start order. Includes tasks still draining
    /// after a stop request; they keep their slot until settled.
    running: Vec<TaskId>,
    stopping: HashSet<TaskId>,
    waiting: UniqueQueue<TaskId>,
}

impl Admission {
    pub fn new(max_running: usize) -> Self {
        Self {
            max_running: max_running.max(1),
            running: Vec::new(),
            stopping: HashSet::new(),
            waiting: UniqueQueue::new(),
        }
    }

    pub fn max_running(&self) -> usize {
        self.max_running
    }

    pub fn running(&self) -> &[TaskId] {
        &self.running
    }

    pub fn is_running(&self, id: TaskId) -> bool {
        self.running.contains(&id)
    }

    pub fn waiting(&self) -> Vec<TaskId> {
        self.waiting.iter().copied().collect()
    }

    pub fn request_start(&mut self, id: TaskId) -> StartDecision {
        if self.is_running(id) {
            return StartDecision::AlreadyRunning;
        }
        if self.waiting.contains(id) {
            return StartDecision::AlreadyQueued;
        }
        if self.running.len() < self.max_running {
            self.running.push(id);
            StartDecision::Start
        } else {
            self.waiting.push_back(id);
            StartDecision::Queued
        }
    }

    /// A run ended; its slot is free. Returns false if it held none.
    pub fn settle(&mut self, id: TaskId) -> bool {
        self.stopping.remove(&id);
        let before = self.running.len();
        self.running.retain(|r| *r != id);
        self.running.len() != before
    }

    /// Pops waiting tasks into free slots; the caller must start each.
    pub fn promotions(&mut self) -> Vec<TaskId> {
        let mut started = Vec::new();
        while self.running.len() < self.max_running {
            let Some(id) = self.waiting.pop() else {
                break;
            };
            self.running.push(id);
            started.push(id);
        }
        started
    }

    /// Changes the limit. Raising it promotes waiting tasks (call
    /// `promotions`). Lowering it below the number of active tasks returns
    /// the most recently started ones that must be stopped and re-queued.
    pub fn set_max_running(&mut self, max_running: usize) -> Vec<TaskId> {
        self.max_running = max_running.max(1);
        let active = self.running.len() - self.stopping.len();
        let excess = active.saturating_sub(self.max_running);
        let preempt: Vec<TaskId> = self
            .running
            .iter()
            .rev()
            .filter(|id| !self.stopping.contains(id))
            .take(excess)
            .copied()
            .collect();
        self.stopping.extend(preempt.iter().copied());
        preempt
    }

    /// The task was asked to stop (pause, cancel, preemption); it keeps its
    /// slot until `settle` but is no longer a preemption candidate.
    pub fn mark_stopping(&mut self, id: TaskId) {
        if self.is_running(id) {
            self.stopping.insert(id);
        }
    }

    pub fn is_stopping(&self, id: TaskId) -> bool {
        self.stopping.contains(&id)
    }

    /// Puts a preempted task back at the head of the queue.
    pub fn requeue_front(&mut self, id: TaskId) {
        self.waiting.push_front(id);
    }

    /// Takes a task out of the waiting queue.
    pub fn dequeue(&mut self, id: TaskId) -> bool {
        self.waiting.remove(id)
    }

    pub fn clear_waiting(&mut self) -> Vec<TaskId> {
        self.waiting.drain()
    }

    /// Forgets the task entirely.
    pub fn remove(&mut self, id: TaskId) {
        self.waiting.remove(id);
        self.settle(id);
    }
}
