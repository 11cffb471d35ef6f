//! Intake processor sizing and shedding watermarks.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[validate(schema(function = validation::validate_thresholds))]
pub struct IntakeConfig {
    /// Background workers executing report tasks.
    #[serde(default = "default_workers")]
    #[validate(range(min = 1, max = 64))]
    pub workers: usize,

    /// Queue depth above which new events are shed.
    #[serde(default = "default_overflow_at")]
    #[validate(range(min = 1))]
    pub overflow_at: usize,

    /// Queue depth at or below which shedding stops.
    #[serde(default = "default_relax_at")]
    pub relax_at: usize,
}

fn default_workers() -> usize {
    2
}

fn default_overflow_at() -> usize {
    1000
}

fn default_relax_at() -> usize {
    700
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            overflow_at: default_overflow_at(),
            relax_at: default_relax_at(),
        }
    }
}
