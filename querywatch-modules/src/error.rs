use querywatch_config::OptionsError;
use thiserror::Error;

/// Why a module could not be constructed or started.
///
/// Every variant names the module, so the supervisor can log the failure and
/// keep the rest of the pipeline running.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Module '{module}' has invalid configuration: {source}")]
    Config {
        module: String,
        #[source]
        source: OptionsError,
    },

    #[error("Module '{module}' option '{option}' is invalid: {reason}")]
    InvalidOption {
        module: String,
        option: &'static str,
        reason: String,
    },

    #[error("Module '{module}' requires a {collaborator} provider")]
    MissingCollaborator {
        module: String,
        collaborator: &'static str,
    },

    #[error("Module '{module}' failed to start: {source}")]
    Start {
        module: String,
        #[source]
        source: std::io::Error,
    },
}
