use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, Sender};

use querywatch_config::{PipelineConfig, ReporterSpec};
use querywatch_core::events::{ConsistencyLevel, QueryKind, RawEvent};
use querywatch_core::intake::Admission;
use querywatch_core::measurement::Measurement;
use querywatch_engine::{Pipeline, PipelineError, Registry};
use querywatch_reporters::{Reporter, SinkError};

/// Forwards every delivery to the test, tagged with its instance number.
struct Capture {
    name: String,
    instance: usize,
    tx: Sender<(usize, Measurement)>,
}

impl Reporter for Capture {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_measurement(&mut self, measurement: &Measurement) -> Result<(), SinkError> {
        let _ = self.tx.send((self.instance, measurement.clone()));
        Ok(())
    }
}

fn registry() -> (Registry, Receiver<(usize, Measurement)>) {
    let (tx, rx) = unbounded();
    let instances = Arc::new(AtomicUsize::new(0));
    let mut registry = Registry::with_defaults();
    registry.register_reporter("capture", move |spec: &ReporterSpec| {
        Ok(Box::new(Capture {
            name: spec.name().to_string(),
            instance: instances.fetch_add(1, Ordering::SeqCst),
            tx: tx.clone(),
        }) as Box<dyn Reporter>)
    });
    (registry, rx)
}

fn start(document: &str) -> (Pipeline, Receiver<(usize, Measurement)>) {
    let (registry, rx) = registry();
    let config = PipelineConfig::from_yaml_str(document).unwrap();
    let (pipeline, report) = Pipeline::builder().registry(registry).start(config).unwrap();
    assert!(report.disabled.is_empty(), "{:?}", report.disabled);
    (pipeline, rx)
}

/// Total request count carried by rate measurements named `name`.
fn collect_count(
    rx: &Receiver<(usize, Measurement)>,
    name: &str,
    period_secs: f64,
    expected: u64,
    within: Duration,
) -> u64 {
    let deadline = Instant::now() + within;
    let mut total = 0u64;
    while total < expected && Instant::now() < deadline {
        if let Ok((_, m)) = rx.recv_timeout(Duration::from_millis(50)) {
            if m.name() == name {
                total += (m.value().unwrap() * period_secs).round() as u64;
            }
        }
    }
    total
}

const FAN_OUT: &str = r#"
global: { system_name: cluster-a, hostname: node-1 }
reporters:
  - { name: fanout, reporter: capture }
  - { name: fanout, reporter: capture }
  - { name: fanout, reporter: capture }
modules:
  - module: slow_query
    measurement: slow
    reporters: [fanout]
    options: { count_report_enabled: false }
"#;

#[test]
fn measurement_reaches_every_reporter_exactly_once() {
    let (mut pipeline, rx) = start(FAN_OUT);
    assert_eq!(pipeline.bus().subscriber_count("fanout"), 3);

    let admission = pipeline.report(
        RawEvent::new(QueryKind::Write, "ks", "t1")
            .with_duration(40)
            .with_client("10.0.0.9"),
    );
    assert_eq!(admission, Admission::Accepted);

    let mut seen = BTreeSet::new();
    for _ in 0..3 {
        let (instance, measurement) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(measurement.name(), "slow");
        assert_eq!(measurement.value(), Some(40.0));
        assert_eq!(measurement.tag("kind"), Some("WRITE"));
        assert!(seen.insert(instance), "instance {instance} delivered twice");
    }
    assert_eq!(seen, BTreeSet::from([0, 1, 2]));
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    pipeline.stop();
    pipeline.stop();
    assert_eq!(pipeline.bus().subscriber_count("fanout"), 0);
}

const RATE: &str = r#"
intake: { workers: 2, overflow_at: 100000, relax_at: 50000 }
reporters:
  - { name: sink, reporter: capture }
modules:
  - module: request_rate
    measurement: rate
    reporters: [sink]
    options: { period: 200, time_unit: MILLISECONDS, requests_to_report: ["*:*"] }
"#;

#[test]
fn concurrent_producers_lose_and_duplicate_nothing() {
    let (pipeline, rx) = start(RATE);
    let pipeline = Arc::new(pipeline);

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let pipeline = Arc::clone(&pipeline);
            std::thread::spawn(move || {
                for i in 0..250 {
                    let event = RawEvent::new(QueryKind::Read, "ks", format!("t{p}"))
                        .with_duration(i)
                        .with_consistency(ConsistencyLevel::One);
                    assert_eq!(pipeline.report(event), Admission::Accepted);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    assert_eq!(collect_count(&rx, "rate", 0.2, 1000, Duration::from_secs(10)), 1000);
    // Later windows are empty: nothing was counted twice.
    assert_eq!(collect_count(&rx, "rate", 0.2, 1, Duration::from_secs(1)), 0);
    assert_eq!(pipeline.metrics().events_submitted.get(), 1000);
    assert_eq!(pipeline.metrics().events_dropped.get(), 0);
}

#[test]
fn internal_events_never_reach_modules() {
    let (pipeline, rx) = start(RATE);
    assert_eq!(
        pipeline.report(RawEvent::new(QueryKind::Read, "system", "local").internal()),
        Admission::Filtered
    );
    assert_eq!(pipeline.metrics().events_filtered.get(), 1);
    assert_eq!(collect_count(&rx, "rate", 0.2, 1, Duration::from_secs(1)), 0);
}

#[test]
fn rejected_reload_keeps_module_state() {
    let (mut pipeline, rx) = start(&RATE.replace("period: 200", "period: 500"));

    for _ in 0..10 {
        pipeline.report(RawEvent::new(QueryKind::Write, "ks", "t"));
    }

    let mut broken = pipeline.supervisor().config().unwrap().clone();
    broken.reporters.clear();
    let err = pipeline.reload(broken).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
    assert!(pipeline.supervisor().is_running());

    assert_eq!(collect_count(&rx, "rate", 0.5, 10, Duration::from_secs(10)), 10);
}

#[test]
fn reload_swaps_the_whole_set() {
    let (mut pipeline, rx) = start(RATE);

    let next = PipelineConfig::from_yaml_str(
        r#"
intake: { workers: 1, overflow_at: 10, relax_at: 5 }
reporters:
  - { name: sink, reporter: capture }
modules:
  - module: heartbeat
    measurement: alive
    reporters: [sink]
    options: { period: 50, time_unit: MILLISECONDS }
"#,
    )
    .unwrap();
    let report = pipeline.reload(next).unwrap();
    assert_eq!(report.modules, vec!["alive"]);
    assert_eq!(
        pipeline.supervisor().config().unwrap().intake.overflow_at,
        10
    );

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let (_, measurement) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        if measurement.name() == "alive" {
            assert_eq!(measurement.value(), Some(1.0));
            break;
        }
        assert!(Instant::now() < deadline);
    }
    assert_eq!(
        pipeline
            .bus()
            .subscriber_count(querywatch_core::events::RAW_EVENT_TOPIC),
        0
    );
}

#[test]
fn malformed_units_leave_the_rest_running() {
    let (registry, rx) = registry();
    let config = PipelineConfig::from_yaml_str(
        r#"
reporters:
  - { name: sink, reporter: capture }
modules:
  - module: heartbeat
    measurement: good
    reporters: [sink]
    options: { period: 50, time_unit: MILLISECONDS }
  - module: heartbeat
    measurement: bad
    reporters: [missing]
  - module: Heart-Beat
    measurement: worse
    reporters: [sink]
"#,
    )
    .unwrap();
    let (pipeline, report) = Pipeline::builder().registry(registry).start(config).unwrap();

    assert_eq!(report.modules, vec!["good"]);
    assert_eq!(report.reporters, vec!["sink"]);
    let disabled: Vec<_> = report.disabled.iter().map(|d| d.unit.as_str()).collect();
    assert_eq!(disabled, vec!["bad", "worse"]);
    assert!(report
        .disabled
        .iter()
        .all(|d| matches!(d.error, PipelineError::Unit(_))));

    let (_, measurement) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(measurement.name(), "good");
    assert!(pipeline.supervisor().is_running());
}
