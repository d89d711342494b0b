//! Admission queues for executions awaiting scheduling.

use std::collections::VecDeque;

use skein_types::{ExId, Execution};

/// A FIFO queue of executions.
///
/// Front-insertion exists for moderator-release promotions: an execution
/// that already waited behind the gate jumps ahead of never-seen ones.
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    entries: VecDeque<Execution>,
}

impl AdmissionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an execution to the tail.
    pub fn enqueue(&mut self, execution: Execution) {
        self.entries.push_back(execution);
    }

    /// Insert an execution at the front.
    pub fn enqueue_front(&mut self, execution: Execution) {
        self.entries.push_front(execution);
    }

    /// Pop the execution at the front.
    pub fn dequeue(&mut self) -> Option<Execution> {
        self.entries.pop_front()
    }

    /// Remove an execution by ID, wherever it sits.
    pub fn remove(&mut self, ex_id: &ExId) -> Option<Execution> {
        let position = self.entries.iter().position(|ex| &ex.ex_id == ex_id)?;
        self.entries.remove(position)
    }

    /// Drain every queued execution, front first.
    pub fn drain(&mut self) -> Vec<Execution> {
        self.entries.drain(..).collect()
    }

    /// Whether an execution is queued.
    pub fn contains(&self, ex_id: &ExId) -> bool {
        self.entries.iter().any(|ex| &ex.ex_id == ex_id)
    }

    /// Number of queued executions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate front to back.
    pub fn iter(&self) -> impl Iterator<Item = &Execution> {
        self.entries.iter()
    }
}

/// The two admission queues. An execution sits in at most one of them;
/// moving between them is always a remove-then-insert on the same guard.
#[derive(Debug, Default)]
pub struct AdmissionQueues {
    /// Ready to schedule; drained by the allocator.
    pub pending: AdmissionQueue,

    /// Blocked on external moderation; re-scanned on moderator resume.
    pub held: AdmissionQueue,
}

impl AdmissionQueues {
    /// Create both queues empty.
    pub fn new() -> Self {
        Self::default()
    }
}
