#[macro_use]
extern crate criterion;

use std::sync::Arc;

use criterion::Criterion;

use querywatch_core::events::{mailbox, Message, QueryKind, RawEvent, TopicBus};
use querywatch_core::intake::{IntakeProcessor, IntakeSettings};
use querywatch_core::measurement::Measurement;
use querywatch_telemetry::PipelineMetrics;

fn bench_topic_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("topic_bus_publish");

    for subscribers in [1usize, 4, 16] {
        group.throughput(criterion::Throughput::Elements(subscribers as u64));
        group.bench_function(format!("subscribers_{}", subscribers), |b| {
            let bus = TopicBus::new();
            let mailboxes: Vec<_> = (0..subscribers).map(|_| mailbox()).collect();
            for (tx, _) in &mailboxes {
                bus.subscribe("reporter", tx);
            }
            let message = Message::Measurement(Arc::new(Measurement::simple("m", 1.0).build()));
            b.iter(|| {
                bus.publish("reporter", message.clone());
                for (_, rx) in &mailboxes {
                    rx.try_recv().unwrap();
                }
            });
        });
    }
    group.finish();
}

fn bench_intake_submit(c: &mut Criterion) {
    let intake = IntakeProcessor::new(
        IntakeSettings {
            workers: 2,
            overflow_at: 100_000,
            relax_at: 70_000,
        },
        PipelineMetrics::new(),
    )
    .unwrap();
    let bus = Arc::new(TopicBus::new());

    c.bench_function("intake_report", |b| {
        b.iter(|| {
            let event = RawEvent::new(QueryKind::Read, "ks", "t").with_duration(3);
            intake.report(event, &bus)
        });
    });
}

criterion_group!(benches, bench_topic_fan_out, bench_intake_submit);
criterion_main!(benches);
