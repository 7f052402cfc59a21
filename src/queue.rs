//! FIFO mailbox of commands waiting for the next poll cycle.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::protocol::Command;

/// Unbounded command queue shared between producers and the poll loop.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<VecDeque<Command>>>,
}

impl CommandQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command to the tail.
    pub fn enqueue(&self, command: Command) {
        self.lock().push_back(command);
    }

    /// Removes and returns the head, if any.
    #[must_use]
    pub fn try_dequeue(&self) -> Option<Command> {
        self.lock().pop_front()
    }

    /// Number of pending commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no command is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Commands are plain values, a panicking holder cannot leave them torn.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Command>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
