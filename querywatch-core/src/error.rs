use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Intake processor needs at least one worker")]
    NoWorkers,

    #[error("Invalid thresholds: overflow_at ({overflow_at}) must be greater than relax_at ({relax_at})")]
    Thresholds { overflow_at: usize, relax_at: usize },

    #[error("Failed to spawn intake worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Raised by a module or reporter runtime when a delivery cannot be processed.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// A message kind reached a consumer that declares no handler for it.
    #[error("{consumer} has no handler for {message} messages")]
    Unhandled {
        consumer: String,
        message: &'static str,
    },
}
