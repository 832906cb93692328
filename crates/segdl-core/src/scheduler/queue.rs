//! FIFO queue that holds each id at most once.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct UniqueQueue<T> {
    order: VecDeque<T>,
    members: HashSet<T>,
}

impl<T> Default for UniqueQueue<T> {
    fn default() -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }
}

impl<T: Copy + Eq + Hash> UniqueQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and changes nothing) if `item` is already queued.
    pub fn push_back(&mut self, item: T) -> bool {
        if !self.members.insert(item) {
            return false;
        }
        self.order.push_back(item);
        true
    }

    /// Queues `item` first; an existing entry moves to the front.
    pub fn push_front(&mut self, item: T) {
        if !self.members.insert(item) {
            self.order.retain(|x| *x != item);
        }
        self.order.push_front(item);
    }

    pub fn pop(&mut self) -> Option<T> {
        let item = self.order.pop_front()?;
        self.members.remove(&item);
        Some(item)
    }

    pub fn remove(&mut self, item: T) -> bool {
        if !self.members.remove(&item) {
            return false;
        }
        self.order.retain(|x| *x != item);
        true
    }

    pub fn contains(&self, item: T) -> bool {
        self.members.contains(&item)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Empties the queue, returning the items in queue order.
    pub fn drain(&mut self) -> Vec<T> {
        self.members.clear();
        self.order.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter()
    }
}
