//! # Querywatch Telemetry
//!
//! Logging bootstrap and self-metrics for the measurement pipeline.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::PipelineMetrics;
