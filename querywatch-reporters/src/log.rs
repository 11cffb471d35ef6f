//! Logs each measurement's human-readable form.

use querywatch_config::ReporterSpec;
use querywatch_core::measurement::Measurement;
use tracing::info;

use crate::{Reporter, SinkError};

pub struct LogReporter {
    name: String,
}

pub fn build(spec: &ReporterSpec) -> Result<Box<dyn Reporter>, SinkError> {
    Ok(Box::new(LogReporter {
        name: spec.name().to_string(),
    }))
}

impl Reporter for LogReporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_measurement(&mut self, measurement: &Measurement) -> Result<(), SinkError> {
        info!(reporter = %self.name, "{}", measurement);
        Ok(())
    }
}
