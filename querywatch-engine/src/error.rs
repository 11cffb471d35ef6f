use querywatch_config::{ConfigError, UnitError};
use querywatch_core::IntakeError;
use querywatch_modules::ModuleError;
use querywatch_reporters::SinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid unit entry: {0}")]
    Unit(#[from] UnitError),

    #[error("Unknown module identifier '{0}'")]
    UnknownModule(String),

    #[error("Unknown reporter identifier '{0}'")]
    UnknownReporter(String),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),

    #[error("Failed to spawn thread for {unit}: {source}")]
    Spawn {
        unit: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{unit} exited before becoming ready")]
    Startup { unit: String },
}

impl From<validator::ValidationErrors> for PipelineError {
    fn from(errors: validator::ValidationErrors) -> Self {
        PipelineError::Config(ConfigError::from(errors))
    }
}
