//! Exactly-once task claims.
//!
//! A claim is exclusive ownership of a task ID by one worker, preventing
//! duplicate concurrent execution when the control plane redelivers an
//! event or two workers race on the same batch. Claims are held from
//! first sighting until the task's status has been reported, success or
//! failure, after which the ID is released so the control plane can
//! safely redeliver.

use dashmap::DashSet;

/// Lock-free set of in-flight task IDs.
#[derive(Default)]
pub struct TaskClaims {
    inner: DashSet<String>,
}

impl TaskClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims `task_id`. Returns `false` when another worker
    /// already holds it.
    pub fn claim(&self, task_id: &str) -> bool {
        self.inner.insert(task_id.to_string())
    }

    /// Releases `task_id`. Releasing an unclaimed ID is a no-op.
    pub fn release(&self, task_id: &str) {
        self.inner.remove(task_id);
    }

    /// Number of tasks currently in flight.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when no task is in flight.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
