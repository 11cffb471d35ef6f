//! # querywatch-modules
//!
//! Aggregation units between the raw-event topic and the reporter topics.
//! A module reacts to raw events, to its own timer, or both, and publishes
//! [`Measurement`](querywatch_core::measurement::Measurement)s through its
//! [`Outbox`].
//!
//! ### Built-in modules:
//! - `slow_query`: threshold-and-filter slow statement detector
//! - `request_rate`: windowed per-(kind, level) request rates
//! - `heartbeat`: constant liveness signal
//! - `platform_pause`: scheduler pause percentiles from a sampler thread
//! - `cluster_health`: unreachable peers, from [`NodeFacts`]
//! - `node_status`: uptime, transport and background tasks, from [`NodeFacts`]
//! - `metrics`: filtered scrape of node metrics, from [`NodeFacts`]

use std::sync::Arc;
use std::time::Duration;

use querywatch_config::{resolve_options, ModuleSpec};
use querywatch_core::error::ConsumerError;
use querywatch_core::events::{Message, RawEvent};
use querywatch_core::facts::NodeFacts;
use querywatch_core::measurement::MeasurementBuilder;

pub mod cluster_health;
mod error;
pub mod heartbeat;
pub mod metrics;
pub mod node_status;
mod outbox;
pub mod platform_pause;
pub mod request_rate;
pub mod slow_query;

pub use error::ModuleError;
pub use outbox::Outbox;

/// Builds one module instance from its configuration entry.
pub type ModuleFactory = fn(&ModuleSpec, &ModuleContext) -> Result<Box<dyn Module>, ModuleError>;

/// Identifier and constructor of every built-in module.
pub const BUILTIN: &[(&str, ModuleFactory)] = &[
    ("slow_query", slow_query::build),
    ("request_rate", request_rate::build),
    ("heartbeat", heartbeat::build),
    ("platform_pause", platform_pause::build),
    ("cluster_health", cluster_health::build),
    ("node_status", node_status::build),
    ("metrics", metrics::build),
];

/// A configured aggregation unit.
///
/// All hooks run on the module's own thread, one at a time.
pub trait Module: Send {
    /// Measurement name the module publishes under.
    fn measurement(&self) -> &str;

    /// Whether the module wants every raw event.
    fn subscribes_to_events(&self) -> bool {
        false
    }

    /// Timer period, or `None` for event-only modules.
    fn period(&self) -> Option<Duration>;

    fn on_start(&mut self, _outbox: &Outbox) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Must not block on I/O.
    fn on_event(&mut self, _event: &RawEvent, _outbox: &Outbox) {}

    fn on_tick(&mut self, _outbox: &Outbox) {}

    fn on_stop(&mut self) {}

    /// Dispatches one mailbox delivery.
    fn handle(&mut self, message: &Message, outbox: &Outbox) -> Result<(), ConsumerError> {
        match message {
            Message::Query(event) if self.subscribes_to_events() => {
                self.on_event(event, outbox);
                Ok(())
            }
            other => Err(ConsumerError::Unhandled {
                consumer: format!("module '{}'", self.measurement()),
                message: other.kind(),
            }),
        }
    }
}

/// Process-wide inputs shared by every module.
#[derive(Clone)]
pub struct ModuleContext {
    pub system_name: String,
    pub hostname: String,
    pub facts: Option<Arc<dyn NodeFacts>>,
}

impl ModuleContext {
    pub fn new(system_name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            system_name: system_name.into(),
            hostname: hostname.into(),
            facts: None,
        }
    }

    pub fn with_facts(mut self, facts: Arc<dyn NodeFacts>) -> Self {
        self.facts = Some(facts);
        self
    }

    pub(crate) fn identity(&self) -> Identity {
        Identity {
            host: self.hostname.clone(),
            system: self.system_name.clone(),
        }
    }

    pub(crate) fn require_facts(&self, spec: &ModuleSpec) -> Result<Arc<dyn NodeFacts>, ModuleError> {
        self.facts
            .clone()
            .ok_or_else(|| ModuleError::MissingCollaborator {
                module: spec.measurement.clone(),
                collaborator: "node facts",
            })
    }
}

/// Host and system tags stamped on every measurement.
#[derive(Clone, Debug)]
pub(crate) struct Identity {
    host: String,
    system: String,
}

impl Identity {
    pub(crate) fn stamp(&self, builder: MeasurementBuilder) -> MeasurementBuilder {
        builder
            .tag("host", self.host.as_str())
            .tag("system", self.system.as_str())
    }
}

pub(crate) fn typed_options<T>(spec: &ModuleSpec) -> Result<T, ModuleError>
where
    T: serde::de::DeserializeOwned + validator::Validate,
{
    resolve_options(&spec.options).map_err(|source| ModuleError::Config {
        module: spec.measurement.clone(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crossbeam::channel::Receiver;
    use querywatch_config::Options;
    use querywatch_core::events::{mailbox, TopicBus};
    use querywatch_core::measurement::Measurement;
    use querywatch_telemetry::PipelineMetrics;

    pub fn spec(module: &str, options: serde_json::Value) -> ModuleSpec {
        let options: Options = match options {
            serde_json::Value::Object(map) => map,
            _ => Options::new(),
        };
        ModuleSpec {
            module: module.into(),
            measurement: module.into(),
            reporters: vec!["sink".into()],
            options,
        }
    }

    pub fn context() -> ModuleContext {
        ModuleContext::new("cluster-a", "node-1")
    }

    /// An outbox wired to one collecting mailbox.
    pub fn outbox() -> (Outbox, Receiver<Message>) {
        let bus = Arc::new(TopicBus::new());
        let (tx, rx) = mailbox();
        bus.subscribe("sink", &tx);
        let outbox = Outbox::new(bus, vec!["sink".into()], PipelineMetrics::new());
        (outbox, rx)
    }

    pub fn drain(rx: &Receiver<Message>) -> Vec<Arc<Measurement>> {
        rx.try_iter()
            .filter_map(|message| match message {
                Message::Measurement(m) => Some(m),
                Message::Query(_) => None,
            })
            .collect()
    }
}
