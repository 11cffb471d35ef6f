//! Where a module's measurements go.

use std::sync::Arc;

use querywatch_core::events::{Message, TopicBus};
use querywatch_core::measurement::Measurement;
use querywatch_telemetry::PipelineMetrics;

/// Publishes to every reporter topic a module is configured with.
///
/// The measurement is wrapped in one `Arc` and shared by all topics.
#[derive(Clone)]
pub struct Outbox {
    bus: Arc<TopicBus>,
    topics: Arc<[String]>,
    metrics: PipelineMetrics,
}

impl Outbox {
    pub fn new(bus: Arc<TopicBus>, topics: Vec<String>, metrics: PipelineMetrics) -> Self {
        Self {
            bus,
            topics: topics.into(),
            metrics,
        }
    }

    pub fn publish(&self, measurement: Measurement) {
        let measurement = Arc::new(measurement);
        for topic in self.topics.iter() {
            self.bus
                .publish(topic, Message::Measurement(Arc::clone(&measurement)));
        }
        self.metrics.measurements_published.inc();
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }
}
