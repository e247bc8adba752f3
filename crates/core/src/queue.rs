//! Multi-producer FIFO of pending events
//!
//! Any thread may enqueue. Only the designated thread dequeues, through the
//! event loop that owns the queue.

use crossbeam::queue::SegQueue;
use std::fmt;

/// Unbounded FIFO queue of events
pub struct EventQueue<E> {
    inner: SegQueue<E>,
}

impl<E> EventQueue<E> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    /// Append an event; never blocks
    pub fn enqueue(&self, event: E) {
        self.inner.push(event);
    }

    /// Remove the oldest event
    pub fn dequeue(&self) -> Option<E> {
        self.inner.pop()
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Hand every queued event to `sink`, oldest first
    pub fn drain_into(&self, mut sink: impl FnMut(E)) -> usize {
        let mut moved = 0;
        while let Some(event) = self.dequeue() {
            sink(event);
            moved += 1;
        }
        moved
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue").field("len", &self.len()).finish()
    }
}
