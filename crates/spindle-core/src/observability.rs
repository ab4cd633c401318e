use serde::{Deserialize, Serialize};

/// Point-in-time scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Tasks waiting in the queue.
    pub queued: usize,
    /// Connections blocked in `get_task`.
    pub waiting_workers: usize,
    /// Pins held by the scheduler's decoded copies.
    pub pinned: usize,
    pub submitted: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub rejected: u64,
}
