//! Identity attached to every measurement.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct GlobalConfig {
    /// Logical cluster or system the node belongs to.
    #[serde(default = "default_system_name")]
    #[validate(length(min = 1))]
    pub system_name: String,

    /// Explicit host tag; falls back to `$HOSTNAME`.
    #[serde(default)]
    pub hostname: Option<String>,
}

fn default_system_name() -> String {
    "querywatch".into()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            system_name: default_system_name(),
            hostname: None,
        }
    }
}

impl GlobalConfig {
    pub fn resolved_hostname(&self) -> String {
        self.hostname
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "unknown".into())
    }
}
