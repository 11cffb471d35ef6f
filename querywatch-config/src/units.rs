//! Declarative module and reporter entries.
//!
//! Options stay free-form here; each unit resolves them into its own typed,
//! validated options when it is constructed. Entry-level mistakes are reported
//! per unit by `check`, never for the whole document.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::validation;

pub type Options = Map<String, Value>;

/// Why a single module or reporter entry cannot be built.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnitError {
    #[error("'{0}' is not a valid unit identifier")]
    InvalidIdentifier(String),

    #[error("module '{0}' has an empty measurement name")]
    EmptyMeasurement(String),

    #[error("module '{module}' publishes to undeclared reporter '{reporter}'")]
    UndeclaredReporter { module: String, reporter: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModuleSpec {
    /// Registered module identifier, e.g. `slow_query`.
    pub module: String,

    /// Default measurement name the module emits under.
    pub measurement: String,

    /// Reporter names (topics) the module publishes to.
    #[serde(default)]
    pub reporters: Vec<String>,

    #[serde(default)]
    pub options: Options,
}

impl ModuleSpec {
    /// Name the unit is logged and reported under.
    pub fn unit_name(&self) -> &str {
        if self.measurement.is_empty() {
            &self.module
        } else {
            &self.measurement
        }
    }

    /// Checks the entry against the reporter topics `declared` in the same document.
    pub fn check(&self, declared: &HashSet<&str>) -> Result<(), UnitError> {
        if !validation::is_identifier(&self.module) {
            return Err(UnitError::InvalidIdentifier(self.module.clone()));
        }
        if self.measurement.is_empty() {
            return Err(UnitError::EmptyMeasurement(self.module.clone()));
        }
        match self
            .reporters
            .iter()
            .find(|name| !declared.contains(name.as_str()))
        {
            Some(missing) => Err(UnitError::UndeclaredReporter {
                module: self.measurement.clone(),
                reporter: missing.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReporterSpec {
    /// Topic the reporter subscribes to; defaults to `reporter`.
    #[serde(default)]
    pub name: Option<String>,

    /// Registered reporter identifier, e.g. `log`.
    pub reporter: String,

    #[serde(default)]
    pub options: Options,
}

impl ReporterSpec {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.reporter)
    }

    pub fn check(&self) -> Result<(), UnitError> {
        if validation::is_identifier(&self.reporter) {
            Ok(())
        } else {
            Err(UnitError::InvalidIdentifier(self.reporter.clone()))
        }
    }
}
