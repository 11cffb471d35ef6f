//! Windowed request-rate aggregator.
//!
//! Each `requests_to_report` entry is a `KIND:LEVEL` pair where either side
//! may be `*`. An event bumps every matching counter; the tick swaps each
//! counter to zero and publishes `count / period_seconds`.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use querywatch_config::ModuleSpec;
use querywatch_core::events::{ConsistencyLevel, QueryKind, RawEvent};
use querywatch_core::measurement::{Measurement, TimeUnit};
use serde::Deserialize;
use validator::Validate;

use crate::{typed_options, Identity, Module, ModuleContext, ModuleError, Outbox};

const WILDCARD: &str = "*";

#[derive(Debug, Deserialize, Validate)]
pub struct RequestRateOptions {
    #[serde(default = "default_period")]
    #[validate(range(min = 1))]
    pub period: u64,

    #[serde(default = "default_time_unit")]
    pub time_unit: TimeUnit,

    #[serde(default = "default_requests")]
    #[validate(length(min = 1))]
    pub requests_to_report: Vec<String>,
}

fn default_period() -> u64 {
    1
}

fn default_time_unit() -> TimeUnit {
    TimeUnit::Seconds
}

fn default_requests() -> Vec<String> {
    vec!["*:*".into()]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pattern<T> {
    Any,
    Exactly(T),
}

impl<T: PartialEq> Pattern<T> {
    fn matches(&self, value: &T) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exactly(expected) => expected == value,
        }
    }
}

fn pattern<T: FromStr<Err = String>>(raw: &str) -> Result<Pattern<T>, String> {
    if raw == WILDCARD {
        Ok(Pattern::Any)
    } else {
        raw.parse().map(Pattern::Exactly)
    }
}

#[derive(Debug)]
struct RateCounter {
    kind: Pattern<QueryKind>,
    level: Pattern<ConsistencyLevel>,
    kind_label: String,
    level_label: String,
    count: AtomicU64,
}

/// The configured counters of one module instance.
///
/// Increments and the tick's read-and-reset are single atomic operations, so
/// an increment racing a tick lands in exactly one window.
#[derive(Debug)]
pub struct RateCounters {
    counters: Vec<RateCounter>,
}

impl RateCounters {
    /// Parses `KIND:LEVEL` entries.
    pub fn parse(entries: &[String]) -> Result<Self, String> {
        let counters = entries
            .iter()
            .map(|entry| {
                let (kind, level) = entry
                    .split_once(':')
                    .ok_or_else(|| format!("'{entry}' is not of the form KIND:LEVEL"))?;
                let (kind, level) = (kind.trim(), level.trim());
                Ok(RateCounter {
                    kind: pattern(kind)?,
                    level: pattern(level)?,
                    kind_label: kind.to_ascii_uppercase(),
                    level_label: level.to_ascii_uppercase(),
                    count: AtomicU64::new(0),
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Self { counters })
    }

    pub fn record(&self, kind: QueryKind, level: ConsistencyLevel) {
        for counter in &self.counters {
            if counter.kind.matches(&kind) && counter.level.matches(&level) {
                counter.count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Reads and resets every counter: `(kind label, level label, count)`.
    pub fn drain(&self) -> Vec<(&str, &str, u64)> {
        self.counters
            .iter()
            .map(|c| {
                (
                    c.kind_label.as_str(),
                    c.level_label.as_str(),
                    c.count.swap(0, Ordering::AcqRel),
                )
            })
            .collect()
    }
}

pub struct RequestRate {
    measurement: String,
    identity: Identity,
    period: Duration,
    counters: RateCounters,
}

pub fn build(spec: &ModuleSpec, ctx: &ModuleContext) -> Result<Box<dyn Module>, ModuleError> {
    let options: RequestRateOptions = typed_options(spec)?;
    let counters =
        RateCounters::parse(&options.requests_to_report).map_err(|reason| {
            ModuleError::InvalidOption {
                module: spec.measurement.clone(),
                option: "requests_to_report",
                reason,
            }
        })?;

    Ok(Box::new(RequestRate {
        measurement: spec.measurement.clone(),
        identity: ctx.identity(),
        period: options.time_unit.to_duration(options.period),
        counters,
    }))
}

impl Module for RequestRate {
    fn measurement(&self) -> &str {
        &self.measurement
    }

    fn subscribes_to_events(&self) -> bool {
        true
    }

    fn period(&self) -> Option<Duration> {
        Some(self.period)
    }

    fn on_event(&mut self, event: &RawEvent, _outbox: &Outbox) {
        self.counters.record(event.kind, event.consistency);
    }

    fn on_tick(&mut self, outbox: &Outbox) {
        let seconds = self.period.as_secs_f64();
        for (kind, level, count) in self.counters.drain() {
            let builder = Measurement::simple(self.measurement.as_str(), count as f64 / seconds)
                .tag("kind", kind)
                .tag("consistency", level);
            outbox.publish(self.identity.stamp(builder).build());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, drain, outbox, spec};
    use serde_json::json;
    use std::sync::Arc;

    fn read(level: ConsistencyLevel) -> RawEvent {
        RawEvent::new(QueryKind::Read, "ks", "t").with_consistency(level)
    }

    #[test]
    fn rate_is_count_over_period() {
        let mut rate = build(
            &spec("request_rate", json!({"period": 2, "time_unit": "SECONDS"})),
            &context(),
        )
        .unwrap();
        assert_eq!(rate.period(), Some(Duration::from_secs(2)));
        let (outbox, rx) = outbox();

        for _ in 0..1000 {
            rate.on_event(&read(ConsistencyLevel::One), &outbox);
        }
        assert!(drain(&rx).is_empty());

        rate.on_tick(&outbox);
        let published = drain(&rx);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].value(), Some(500.0));
        assert_eq!(published[0].tag("kind"), Some("*"));
        assert_eq!(published[0].tag("consistency"), Some("*"));

        rate.on_tick(&outbox);
        assert_eq!(drain(&rx)[0].value(), Some(0.0));
    }

    #[test]
    fn patterns_match_literals_and_wildcards() {
        let mut rate = build(
            &spec(
                "request_rate",
                json!({"requests_to_report": ["READ:*", "*:QUORUM", "write:one"]}),
            ),
            &context(),
        )
        .unwrap();
        let (outbox, rx) = outbox();

        rate.on_event(&read(ConsistencyLevel::Quorum), &outbox);
        rate.on_event(&read(ConsistencyLevel::One), &outbox);
        rate.on_event(
            &RawEvent::new(QueryKind::Write, "ks", "t").with_consistency(ConsistencyLevel::One),
            &outbox,
        );
        rate.on_tick(&outbox);

        let published = drain(&rx);
        let value_of = |kind: &str, level: &str| {
            published
                .iter()
                .find(|m| m.tag("kind") == Some(kind) && m.tag("consistency") == Some(level))
                .and_then(|m| m.value())
        };
        assert_eq!(value_of("READ", "*"), Some(2.0));
        assert_eq!(value_of("*", "QUORUM"), Some(1.0));
        assert_eq!(value_of("WRITE", "ONE"), Some(1.0));
    }

    #[test]
    fn bad_pattern_fails_construction() {
        for entry in ["READ", "SCAN:ONE", "READ:SOMETIMES"] {
            let err = build(
                &spec("request_rate", json!({"requests_to_report": [entry]})),
                &context(),
            )
            .err()
            .unwrap();
            assert!(
                matches!(err, ModuleError::InvalidOption { option: "requests_to_report", .. }),
                "{entry}"
            );
        }
    }

    #[test]
    fn concurrent_increments_are_never_lost_across_drains() {
        let counters = Arc::new(RateCounters::parse(&["*:*".into()]).unwrap());
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let counters = Arc::clone(&counters);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        counters.record(QueryKind::Read, ConsistencyLevel::One);
                    }
                })
            })
            .collect();

        let mut total = 0;
        while producers.iter().any(|p| !p.is_finished()) {
            total += counters.drain()[0].2;
        }
        for producer in producers {
            producer.join().unwrap();
        }
        total += counters.drain()[0].2;
        assert_eq!(total, 1000);
    }
}
