//! ## querywatch-telemetry::logging
//! **Structured logging with tracing and OpenTelemetry key/values**
//!
//! Consumer and worker threads are named, so thread names are always printed.
//! Lifecycle records (`pipeline_started`, `module_disabled`, ...) go through
//! [`EventLogger::log_event`] so they share one span shape.

use opentelemetry::KeyValue;
use tracing::info_span;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. Filter comes from `RUST_LOG`, falling back to `info`.
    ///
    /// Calling it twice is harmless; the second install is ignored.
    pub fn init() {
        let _ = fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_thread_names(true)
            .with_span_events(FmtSpan::NONE)
            .try_init();
    }

    #[inline]
    pub fn log_event(event_type: &str, metadata: Vec<KeyValue>) {
        let span = info_span!(
            "pipeline_event",
            event_type = event_type,
            otel.kind = "INTERNAL"
        );
        let _entered = span.enter();

        tracing::info!(
            event_type = event_type,
            metadata = ?metadata,
            "Pipeline event occurred"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_logging() {
        EventLogger::log_event("module_disabled", vec![KeyValue::new("module", "heartbeat")]);
        assert!(logs_contain("Pipeline event occurred"));
        assert!(logs_contain("module_disabled"));
    }
}
