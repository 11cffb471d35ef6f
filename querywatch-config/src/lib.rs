//! # QueryWatch Configuration System
//!
//! The pipeline is described by one document: global identity, intake
//! sizing, the reporter list and the module list.
//!
//! ## Features
//! - **Layered loading**: YAML file, then `QUERYWATCH_*` environment overrides
//! - **Validation**: empty unit lists and bad watermarks reject the whole
//!   document before anything is started
//! - **Per-unit checks**: identifiers, measurement names and reporter routing
//!   are checked per unit ([`ModuleSpec::check`], [`ReporterSpec::check`]) so
//!   a bad entry only disables itself
//! - **Free-form unit options**: each module/reporter resolves its own typed
//!   options at construction time

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::collections::HashSet;
use std::path::Path;

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod global;
mod intake;
mod options;
mod units;
mod validation;

pub use error::ConfigError;
pub use global::GlobalConfig;
pub use intake::IntakeConfig;
pub use options::{resolve_options, OptionsError};
pub use units::{ModuleSpec, Options, ReporterSpec, UnitError};

/// Prefix of environment overrides, e.g. `QUERYWATCH_INTAKE__WORKERS=4`.
pub const ENV_PREFIX: &str = "QUERYWATCH_";

/// Top-level pipeline configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    #[validate(nested)]
    pub global: GlobalConfig,

    #[serde(default)]
    #[validate(nested)]
    pub intake: IntakeConfig,

    /// Sinks; at least one is required.
    #[serde(default)]
    #[validate(length(min = 1, message = "at least one reporter must be configured"))]
    pub reporters: Vec<ReporterSpec>,

    /// Aggregation units; at least one is required.
    #[serde(default)]
    #[validate(length(min = 1, message = "at least one module must be configured"))]
    pub modules: Vec<ModuleSpec>,
}

impl PipelineConfig {
    /// Topic names of every declared reporter, valid or not.
    pub fn reporter_names(&self) -> HashSet<&str> {
        self.reporters.iter().map(ReporterSpec::name).collect()
    }

    /// Load configuration from a file, with `QUERYWATCH_*` overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        Self::from_figment(
            Figment::new()
                .merge(Yaml::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Parse an in-memory YAML document; no environment overrides apply.
    pub fn from_yaml_str(document: &str) -> Result<Self, ConfigError> {
        Self::from_figment(Figment::new().merge(Yaml::string(document)))
    }

    /// Extract and validate from an arbitrary provider stack.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
