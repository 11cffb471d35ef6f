//! Writes each measurement as one JSON line.

use std::io::{self, Write};

use querywatch_config::ReporterSpec;
use querywatch_core::measurement::Measurement;
use serde::Deserialize;
use validator::Validate;

use crate::{typed_options, Reporter, SinkError};

#[derive(Debug, Deserialize, Validate)]
pub struct ConsoleOptions {
    /// Accepted for compatibility; the encoder has a single compact layout.
    #[serde(default)]
    pub pretty: bool,
}

pub struct ConsoleReporter {
    name: String,
    out: Box<dyn Write + Send>,
}

pub fn build(spec: &ReporterSpec) -> Result<Box<dyn Reporter>, SinkError> {
    let _options: ConsoleOptions = typed_options(spec)?;
    Ok(Box::new(ConsoleReporter::new(spec.name(), Box::new(io::stdout()))))
}

impl ConsoleReporter {
    pub fn new(name: impl Into<String>, out: Box<dyn Write + Send>) -> Self {
        Self {
            name: name.into(),
            out,
        }
    }

    fn io_error(&self, source: io::Error) -> SinkError {
        SinkError::Io {
            reporter: self.name.clone(),
            source,
        }
    }
}

impl Reporter for ConsoleReporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_measurement(&mut self, measurement: &Measurement) -> Result<(), SinkError> {
        writeln!(self.out, "{}", measurement.to_json()).map_err(|e| self.io_error(e))
    }

    fn on_stop(&mut self) {
        let _ = self.out.flush();
    }
}
