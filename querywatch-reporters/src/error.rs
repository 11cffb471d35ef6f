use querywatch_config::OptionsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Reporter '{reporter}' has invalid configuration: {source}")]
    Config {
        reporter: String,
        #[source]
        source: OptionsError,
    },

    #[error("Reporter '{reporter}' option '{option}' is invalid: {reason}")]
    InvalidOption {
        reporter: String,
        option: &'static str,
        reason: String,
    },

    /// Transient; the measurement is lost and delivery continues.
    #[error("Reporter '{reporter}' I/O failure: {source}")]
    Io {
        reporter: String,
        #[source]
        source: std::io::Error,
    },
}
