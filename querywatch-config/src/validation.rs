//! Cross-field validation functions for configuration.

use std::borrow::Cow;

use validator::ValidationError;

use crate::IntakeConfig;

fn error(code: &'static str, message: String) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::from(message));
    error
}

/// The shedding hysteresis needs a gap between its two watermarks.
pub fn validate_thresholds(intake: &IntakeConfig) -> Result<(), ValidationError> {
    if intake.overflow_at > intake.relax_at {
        Ok(())
    } else {
        Err(error(
            "invalid_thresholds",
            format!(
                "overflow_at ({}) must be greater than relax_at ({})",
                intake.overflow_at, intake.relax_at
            ),
        ))
    }
}

/// Unit identifiers are lowercase snake case.
pub fn is_identifier(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
