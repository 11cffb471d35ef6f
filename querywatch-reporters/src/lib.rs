//! # querywatch-reporters
//!
//! Sink consumers. A reporter subscribes to the topic named after it and
//! forwards every measurement it receives. Delivery failures are returned
//! as [`SinkError`] so the runtime can log and count them; they never stop
//! the reporter.
//!
//! ### Built-in reporters:
//! - `log`: human-readable form through `tracing`
//! - `console`: one JSON document per line on stdout
//! - `line_udp`: line protocol, one datagram per measurement

use querywatch_config::{resolve_options, ReporterSpec};
use querywatch_core::measurement::Measurement;

pub mod console;
mod error;
pub mod line_udp;
pub mod log;

pub use error::SinkError;

pub type ReporterFactory = fn(&ReporterSpec) -> Result<Box<dyn Reporter>, SinkError>;

/// Identifier and constructor of every built-in reporter.
pub const BUILTIN: &[(&str, ReporterFactory)] = &[
    ("log", log::build),
    ("console", console::build),
    ("line_udp", line_udp::build),
];

pub trait Reporter: Send {
    /// Topic this reporter consumes.
    fn name(&self) -> &str;

    /// Acquires sink resources.
    fn on_start(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_measurement(&mut self, measurement: &Measurement) -> Result<(), SinkError>;

    /// Best-effort flush and release.
    fn on_stop(&mut self) {}
}

pub(crate) fn typed_options<T>(spec: &ReporterSpec) -> Result<T, SinkError>
where
    T: serde::de::DeserializeOwned + validator::Validate,
{
    resolve_options(&spec.options).map_err(|source| SinkError::Config {
        reporter: spec.name().to_string(),
        source,
    })
}

#[cfg(test)]
pub(crate) fn spec(reporter: &str, options: serde_json::Value) -> ReporterSpec {
    ReporterSpec {
        name: None,
        reporter: reporter.into(),
        options: match options {
            serde_json::Value::Object(map) => map,
            _ => Default::default(),
        },
    }
}
