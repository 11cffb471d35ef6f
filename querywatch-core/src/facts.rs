//! Point-in-time facts about the monitored node.
//!
//! Implemented outside the pipeline (process introspection, management-bean
//! polling). Fact-backed modules poll it from their own timer thread, so
//! every method is a synchronous snapshot.

use std::time::Duration;

/// A background task currently running on the node (compaction, repair, ...).
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveTask {
    pub kind: String,
    pub resource: String,
    pub completed: u64,
    pub total: u64,
}

pub trait NodeFacts: Send + Sync {
    fn active_tasks(&self) -> Vec<ActiveTask>;

    /// Repair-like jobs queued but not started.
    fn pending_repairs(&self) -> u64;

    fn unreachable_peers(&self) -> Vec<String>;

    fn uptime(&self) -> Duration;

    /// Whether the client-facing transport accepts connections.
    fn transport_active(&self) -> bool;

    /// Named numeric metrics exposed by the node, for periodic scraping.
    fn metrics(&self) -> Vec<(String, f64)> {
        Vec::new()
    }
}

/// Fixed facts, for tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct StaticFacts {
    pub tasks: Vec<ActiveTask>,
    pub pending_repairs: u64,
    pub unreachable: Vec<String>,
    pub uptime: Duration,
    pub transport_active: bool,
    pub metrics: Vec<(String, f64)>,
}

impl NodeFacts for StaticFacts {
    fn active_tasks(&self) -> Vec<ActiveTask> {
        self.tasks.clone()
    }

    fn pending_repairs(&self) -> u64 {
        self.pending_repairs
    }

    fn unreachable_peers(&self) -> Vec<String> {
        self.unreachable.clone()
    }

    fn uptime(&self) -> Duration {
        self.uptime
    }

    fn transport_active(&self) -> bool {
        self.transport_active
    }

    fn metrics(&self) -> Vec<(String, f64)> {
        self.metrics.clone()
    }
}
