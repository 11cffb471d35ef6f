//! Typed resolution of a unit's free-form option map.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use validator::{Validate, ValidationErrors};

use crate::Options;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("malformed options: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid options: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// Deserialize `options` into `T`, filling defaults, then validate it.
pub fn resolve_options<T>(options: &Options) -> Result<T, OptionsError>
where
    T: DeserializeOwned + Validate,
{
    let typed: T = serde_json::from_value(Value::Object(options.clone()))?;
    typed.validate()?;
    Ok(typed)
}
