//! Slow statement detector.
//!
//! An event is reported when all three hold:
//! - it is slow: `log_all_queries`, or a zero threshold, or
//!   `duration >= slow_query_threshold_ms`
//! - its kind is in `query_types_to_log` (empty means every kind)
//! - `namespace.resource` is in `tables_for_logging` (empty means every table)
//!
//! `log_all_queries` defaults to `true`, which makes the threshold inert
//! until it is switched off. Both knobs are kept independent.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use querywatch_config::ModuleSpec;
use querywatch_core::events::{QueryKind, RawEvent};
use querywatch_core::measurement::{Measurement, TimeUnit};
use serde::Deserialize;
use validator::Validate;

use crate::{typed_options, Identity, Module, ModuleContext, ModuleError, Outbox};

#[derive(Debug, Deserialize, Validate)]
pub struct SlowQueryOptions {
    #[serde(default = "default_threshold")]
    pub slow_query_threshold_ms: u64,

    #[serde(default = "default_true")]
    pub log_all_queries: bool,

    /// Fully qualified `namespace.resource` names.
    #[serde(default)]
    pub tables_for_logging: Vec<String>,

    #[serde(default)]
    pub query_types_to_log: Vec<QueryKind>,

    #[serde(default = "default_true")]
    pub count_report_enabled: bool,

    #[serde(default = "default_count_period")]
    #[validate(range(min = 1))]
    pub count_report_period_secs: u64,
}

fn default_threshold() -> u64 {
    25
}

fn default_true() -> bool {
    true
}

fn default_count_period() -> u64 {
    60
}

/// Per-kind counters, incremented on report and swapped out on tick.
#[derive(Debug, Default)]
pub struct KindCounters {
    counts: [AtomicU64; 3],
}

fn slot(kind: QueryKind) -> usize {
    match kind {
        QueryKind::Read => 0,
        QueryKind::Write => 1,
        QueryKind::Unknown => 2,
    }
}

impl KindCounters {
    pub fn increment(&self, kind: QueryKind) {
        self.counts[slot(kind)].fetch_add(1, Ordering::Relaxed);
    }

    /// Reads and resets every counter.
    pub fn drain(&self) -> [(QueryKind, u64); 3] {
        QueryKind::ALL.map(|kind| (kind, self.counts[slot(kind)].swap(0, Ordering::AcqRel)))
    }
}

pub struct SlowQuery {
    measurement: String,
    count_measurement: String,
    identity: Identity,
    threshold_ms: u64,
    log_all: bool,
    tables: HashSet<String>,
    kinds: HashSet<QueryKind>,
    count_period: Option<Duration>,
    counters: KindCounters,
}

pub fn build(spec: &ModuleSpec, ctx: &ModuleContext) -> Result<Box<dyn Module>, ModuleError> {
    let options: SlowQueryOptions = typed_options(spec)?;
    Ok(Box::new(SlowQuery::new(spec, ctx, options)))
}

impl SlowQuery {
    pub fn new(spec: &ModuleSpec, ctx: &ModuleContext, options: SlowQueryOptions) -> Self {
        let kinds = if options.query_types_to_log.is_empty() {
            QueryKind::ALL.into_iter().collect()
        } else {
            options.query_types_to_log.into_iter().collect()
        };
        Self {
            measurement: spec.measurement.clone(),
            count_measurement: format!("{}_count", spec.measurement),
            identity: ctx.identity(),
            threshold_ms: options.slow_query_threshold_ms,
            log_all: options.log_all_queries,
            tables: options.tables_for_logging.into_iter().collect(),
            kinds,
            count_period: options
                .count_report_enabled
                .then(|| Duration::from_secs(options.count_report_period_secs)),
            counters: KindCounters::default(),
        }
    }

    pub fn is_eligible(&self, event: &RawEvent) -> bool {
        let slow = self.log_all || self.threshold_ms == 0 || event.duration_ms >= self.threshold_ms;
        slow && self.kinds.contains(&event.kind)
            && (self.tables.is_empty() || self.tables.contains(&event.qualified_resource()))
    }
}

impl Module for SlowQuery {
    fn measurement(&self) -> &str {
        &self.measurement
    }

    fn subscribes_to_events(&self) -> bool {
        true
    }

    fn period(&self) -> Option<Duration> {
        self.count_period
    }

    fn on_event(&mut self, event: &RawEvent, outbox: &Outbox) {
        if !self.is_eligible(event) {
            return;
        }

        let mut builder = Measurement::simple(self.measurement.as_str(), event.duration_ms as f64)
            .at(event.start_ms, TimeUnit::Milliseconds)
            .tag("kind", event.kind.as_str())
            .field("client", event.client_address.as_str())
            .field("statement", event.statement.as_str())
            .field("consistency", event.consistency.as_str());
        if let Some(error) = &event.error {
            builder = builder.field("error", error.as_str());
        }
        outbox.publish(self.identity.stamp(builder).build());

        self.counters.increment(event.kind);
    }

    fn on_tick(&mut self, outbox: &Outbox) {
        for (kind, count) in self.counters.drain() {
            if !self.kinds.contains(&kind) {
                continue;
            }
            let builder = Measurement::simple(self.count_measurement.as_str(), count as f64)
                .tag("kind", kind.as_str());
            outbox.publish(self.identity.stamp(builder).build());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, drain, outbox, spec};
    use querywatch_core::events::{ConsistencyLevel, Message};
    use querywatch_core::measurement::FieldValue;
    use serde_json::json;

    fn module(options: serde_json::Value) -> Box<dyn Module> {
        build(&spec("slow_query", options), &context()).unwrap()
    }

    fn event(ms: u64) -> RawEvent {
        RawEvent::new(QueryKind::Read, "ks", "t1")
            .with_duration(ms)
            .with_client("10.0.0.7")
            .with_statement("SELECT * FROM ks.t1")
            .with_consistency(ConsistencyLevel::LocalQuorum)
    }

    #[test]
    fn threshold_applies_when_log_all_is_off() {
        let mut slow_query = module(json!({
            "slow_query_threshold_ms": 25,
            "log_all_queries": false,
        }));
        let (outbox, rx) = outbox();

        slow_query.on_event(&event(24), &outbox);
        assert!(drain(&rx).is_empty());

        slow_query.on_event(&event(26), &outbox);
        let published = drain(&rx);
        assert_eq!(published.len(), 1);
        let m = &published[0];
        assert_eq!(m.name(), "slow_query");
        assert_eq!(m.value(), Some(26.0));
        assert_eq!(m.tag("kind"), Some("READ"));
        assert_eq!(m.tag("host"), Some("node-1"));
        assert_eq!(m.tag("system"), Some("cluster-a"));
        assert_eq!(m.field("client"), Some(&FieldValue::Text("10.0.0.7".into())));
        assert_eq!(
            m.field("consistency"),
            Some(&FieldValue::Text("LOCAL_QUORUM".into()))
        );
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut slow_query = module(json!({"log_all_queries": false}));
        let (outbox, rx) = outbox();
        slow_query.on_event(&event(25), &outbox);
        assert_eq!(drain(&rx).len(), 1);
    }

    #[test]
    fn log_all_reports_fast_queries() {
        let mut slow_query = module(json!({"log_all_queries": true}));
        let (outbox, rx) = outbox();
        slow_query.on_event(&event(1), &outbox);
        assert_eq!(drain(&rx).len(), 1);
    }

    #[test]
    fn defaults_report_everything_despite_threshold() {
        // log_all_queries defaults to true, so the 25 ms default threshold is inert.
        let mut slow_query = module(json!({}));
        let (outbox, rx) = outbox();
        slow_query.on_event(&event(0), &outbox);
        slow_query.on_event(&event(3), &outbox);
        assert_eq!(drain(&rx).len(), 2);
    }

    #[test]
    fn zero_threshold_reports_everything() {
        let mut slow_query = module(json!({
            "slow_query_threshold_ms": 0,
            "log_all_queries": false,
        }));
        let (outbox, rx) = outbox();
        slow_query.on_event(&event(0), &outbox);
        assert_eq!(drain(&rx).len(), 1);
    }

    #[test]
    fn table_allow_list_matches_qualified_name() {
        let mut slow_query = module(json!({"tables_for_logging": ["ks.t1"]}));
        let (outbox, rx) = outbox();

        slow_query.on_event(&RawEvent::new(QueryKind::Read, "ks", "t2"), &outbox);
        assert!(drain(&rx).is_empty());

        slow_query.on_event(&RawEvent::new(QueryKind::Read, "ks", "t1"), &outbox);
        assert_eq!(drain(&rx).len(), 1);
    }

    #[test]
    fn kind_allow_list_filters() {
        let mut slow_query = module(json!({"query_types_to_log": ["WRITE"]}));
        let (outbox, rx) = outbox();

        slow_query.on_event(&RawEvent::new(QueryKind::Read, "ks", "t1"), &outbox);
        assert!(drain(&rx).is_empty());
        slow_query.on_event(&RawEvent::new(QueryKind::Write, "ks", "t1"), &outbox);
        assert_eq!(drain(&rx)[0].tag("kind"), Some("WRITE"));
    }

    #[test]
    fn tick_flushes_and_resets_counts() {
        let mut slow_query = module(json!({}));
        let (outbox, rx) = outbox();
        for _ in 0..3 {
            slow_query.on_event(&event(30), &outbox);
        }
        slow_query.on_event(&RawEvent::new(QueryKind::Write, "ks", "t1"), &outbox);
        drain(&rx);

        slow_query.on_tick(&outbox);
        let counts = drain(&rx);
        assert_eq!(counts.len(), 3);
        let read = counts.iter().find(|m| m.tag("kind") == Some("READ")).unwrap();
        assert_eq!(read.name(), "slow_query_count");
        assert_eq!(read.value(), Some(3.0));
        let write = counts.iter().find(|m| m.tag("kind") == Some("WRITE")).unwrap();
        assert_eq!(write.value(), Some(1.0));

        slow_query.on_tick(&outbox);
        assert!(drain(&rx).iter().all(|m| m.value() == Some(0.0)));
    }

    #[test]
    fn count_report_can_be_disabled() {
        let slow_query = module(json!({"count_report_enabled": false}));
        assert_eq!(slow_query.period(), None);
        let slow_query = module(json!({"count_report_period_secs": 10}));
        assert_eq!(slow_query.period(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn malformed_options_fail_construction() {
        let err = build(
            &spec("slow_query", json!({"query_types_to_log": ["DELETE"]})),
            &context(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ModuleError::Config { .. }));
        assert!(err.to_string().contains("slow_query"));
    }

    #[test]
    fn measurement_messages_are_unhandled() {
        let mut slow_query = module(json!({}));
        let (outbox, _rx) = outbox();
        let message: Message = Measurement::simple("m", 1.0).build().into();
        assert!(slow_query.handle(&message, &outbox).is_err());
    }
}
