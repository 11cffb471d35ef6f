//! Facts about this process, for running without an embedding host.

use std::time::{Duration, Instant};

use querywatch_core::facts::{ActiveTask, NodeFacts};
use querywatch_telemetry::PipelineMetrics;

/// Reports its own uptime and the pipeline's counters as scrapeable metrics.
pub struct ProcessFacts {
    started: Instant,
    metrics: PipelineMetrics,
}

impl ProcessFacts {
    pub fn new(metrics: PipelineMetrics) -> Self {
        Self {
            started: Instant::now(),
            metrics,
        }
    }
}

impl NodeFacts for ProcessFacts {
    fn active_tasks(&self) -> Vec<ActiveTask> {
        Vec::new()
    }

    fn pending_repairs(&self) -> u64 {
        0
    }

    fn unreachable_peers(&self) -> Vec<String> {
        Vec::new()
    }

    fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    fn transport_active(&self) -> bool {
        true
    }

    fn metrics(&self) -> Vec<(String, f64)> {
        let m = &self.metrics;
        vec![
            ("events_submitted".into(), m.events_submitted.get() as f64),
            ("events_dropped".into(), m.events_dropped.get() as f64),
            ("events_filtered".into(), m.events_filtered.get() as f64),
            ("task_failures".into(), m.task_failures.get() as f64),
            ("measurements_published".into(), m.measurements_published.get() as f64),
            ("sink_errors".into(), m.sink_errors.get() as f64),
            ("queue_depth".into(), m.queue_depth.get() as f64),
        ]
    }
}
