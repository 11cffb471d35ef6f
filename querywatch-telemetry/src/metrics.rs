//! ## querywatch-telemetry::metrics
//! **Prometheus counters describing the pipeline itself**
//!
//! These count what the pipeline does with events and measurements, not the
//! measurements it produces. Shedding shows up here as `events_dropped`.

use prometheus::{IntCounter, IntGauge, Registry};

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub registry: Registry,
    pub events_submitted: IntCounter,
    pub events_dropped: IntCounter,
    pub events_filtered: IntCounter,
    pub task_failures: IntCounter,
    pub measurements_published: IntCounter,
    pub sink_errors: IntCounter,
    pub queue_depth: IntGauge,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("static counter definition");
    registry
        .register(Box::new(counter.clone()))
        .expect("counter registered once per registry");
    counter
}

impl PipelineMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let events_submitted = counter(
            &registry,
            "querywatch_events_submitted_total",
            "Raw events accepted by the intake processor",
        );
        let events_dropped = counter(
            &registry,
            "querywatch_events_dropped_total",
            "Raw events shed while the intake processor was overloaded",
        );
        let events_filtered = counter(
            &registry,
            "querywatch_events_filtered_total",
            "Internally generated events discarded before queueing",
        );
        let task_failures = counter(
            &registry,
            "querywatch_task_failures_total",
            "Queued intake tasks that panicked",
        );
        let measurements_published = counter(
            &registry,
            "querywatch_measurements_published_total",
            "Measurements published by modules",
        );
        let sink_errors = counter(
            &registry,
            "querywatch_sink_errors_total",
            "Measurements a reporter failed to deliver",
        );

        let queue_depth = IntGauge::new(
            "querywatch_intake_queue_depth",
            "Queued but not yet executed intake tasks",
        )
        .expect("static gauge definition");
        registry
            .register(Box::new(queue_depth.clone()))
            .expect("gauge registered once per registry");

        Self {
            registry,
            events_submitted,
            events_dropped,
            events_filtered,
            task_failures,
            measurements_published,
            sink_errors,
            queue_depth,
        }
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
