//! ## querywatch-core::intake
//! **Non-blocking hand-off from the interception point to a worker pool**
//!
//! `submit` never waits: it either enqueues the task on an unbounded crossbeam
//! channel drained by a small fixed pool, or drops it. What bounds memory is
//! the [`Backpressure`] policy, not the channel capacity:
//!
//! ```text
//!            depth + 1 > overflow_at
//! ACCEPTING ------------------------> SHEDDING
//!     ^                                  |
//!     +----------------------------------+
//!            depth <= relax_at
//! ```
//!
//! The item that crosses `overflow_at` is still queued; later items are dropped
//! until the workers have drained the queue down to `relax_at`. Each transition
//! is logged once; drops are only counted.
//!
//! On Linux the workers run [`WORKER_NICENESS`] steps nicer than the thread
//! that built the processor, so the pool yields to the producing path.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use querywatch_telemetry::PipelineMetrics;

use crate::error::IntakeError;
use crate::events::{Message, RawEvent, TopicBus, RAW_EVENT_TOPIC};

/// Niceness added to each intake worker relative to its spawning thread.
pub const WORKER_NICENESS: i32 = 5;

/// A queued unit of work. Captures one raw event in practice.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntakeState {
    Accepting,
    Shedding,
}

/// Outcome of a hand-off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Shed under overload.
    Dropped,
    /// Internally generated event, discarded before queueing.
    Filtered,
}

#[derive(Clone, Debug)]
pub struct IntakeSettings {
    pub workers: usize,
    pub overflow_at: usize,
    pub relax_at: usize,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            overflow_at: 1000,
            relax_at: 700,
        }
    }
}

/// Hysteresis between [`IntakeState::Accepting`] and [`IntakeState::Shedding`].
#[derive(Debug)]
pub struct Backpressure {
    overflow_at: usize,
    relax_at: usize,
    shedding: AtomicBool,
}

/// Result of [`Backpressure::admit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    pub admit: bool,
    /// Set only on the call that flipped the state.
    pub transition: Option<IntakeState>,
}

impl Backpressure {
    pub fn new(overflow_at: usize, relax_at: usize) -> Result<Self, IntakeError> {
        if overflow_at <= relax_at {
            return Err(IntakeError::Thresholds {
                overflow_at,
                relax_at,
            });
        }
        Ok(Self {
            overflow_at,
            relax_at,
            shedding: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> IntakeState {
        if self.shedding.load(Ordering::Acquire) {
            IntakeState::Shedding
        } else {
            IntakeState::Accepting
        }
    }

    /// Decides on one submission, given the queue depth observed before it.
    pub fn admit(&self, depth: usize) -> Decision {
        if self.shedding.load(Ordering::Acquire) {
            if depth > self.relax_at {
                return Decision {
                    admit: false,
                    transition: None,
                };
            }
            let flipped = self
                .shedding
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();
            return Decision {
                admit: true,
                transition: flipped.then_some(IntakeState::Accepting),
            };
        }

        let mut transition = None;
        if depth + 1 > self.overflow_at
            && self
                .shedding
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            transition = Some(IntakeState::Shedding);
        }
        Decision {
            admit: true,
            transition,
        }
    }
}

struct Shared {
    depth: AtomicUsize,
    metrics: PipelineMetrics,
}

pub struct IntakeProcessor {
    tx: Option<Sender<Work>>,
    shared: Arc<Shared>,
    backpressure: Backpressure,
    workers: Vec<JoinHandle<()>>,
}

impl IntakeProcessor {
    pub fn new(settings: IntakeSettings, metrics: PipelineMetrics) -> Result<Self, IntakeError> {
        if settings.workers == 0 {
            return Err(IntakeError::NoWorkers);
        }
        let backpressure = Backpressure::new(settings.overflow_at, settings.relax_at)?;

        let (tx, rx) = unbounded::<Work>();
        let shared = Arc::new(Shared {
            depth: AtomicUsize::new(0),
            metrics,
        });

        let mut workers = Vec::with_capacity(settings.workers);
        for i in 0..settings.workers {
            let rx = rx.clone();
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("querywatch-intake-{i}"))
                .spawn(move || worker_loop(rx, shared))?;
            workers.push(handle);
        }

        info!(
            workers = settings.workers,
            overflow_at = settings.overflow_at,
            relax_at = settings.relax_at,
            "Intake processor started"
        );

        Ok(Self {
            tx: Some(tx),
            shared,
            backpressure,
            workers,
        })
    }

    /// Queues `work` or sheds it. Never blocks.
    pub fn submit<F>(&self, work: F) -> Admission
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(tx) = &self.tx else {
            return Admission::Dropped;
        };

        let depth = self.shared.depth.load(Ordering::Acquire);
        let decision = self.backpressure.admit(depth);
        match decision.transition {
            Some(IntakeState::Shedding) => warn!(
                depth = depth + 1,
                overflow_at = self.backpressure.overflow_at,
                relax_at = self.backpressure.relax_at,
                "Intake queue overflow, shedding events"
            ),
            Some(IntakeState::Accepting) => info!(
                depth,
                relax_at = self.backpressure.relax_at,
                "Intake queue relaxed, accepting events"
            ),
            None => {}
        }

        if !decision.admit {
            self.shared.metrics.events_dropped.inc();
            return Admission::Dropped;
        }

        self.shared.metrics.queue_depth.inc();
        self.shared.depth.fetch_add(1, Ordering::AcqRel);
        if tx.send(Box::new(work)).is_err() {
            self.shared.depth.fetch_sub(1, Ordering::AcqRel);
            self.shared.metrics.queue_depth.dec();
            self.shared.metrics.events_dropped.inc();
            return Admission::Dropped;
        }
        self.shared.metrics.events_submitted.inc();
        Admission::Accepted
    }

    /// Filters self-traffic, then queues a task publishing `event` on the raw-event topic.
    pub fn report(&self, event: RawEvent, bus: &Arc<TopicBus>) -> Admission {
        if event.internal {
            self.shared.metrics.events_filtered.inc();
            return Admission::Filtered;
        }
        let bus = Arc::clone(bus);
        self.submit(move || bus.publish(RAW_EVENT_TOPIC, Message::from(event)))
    }

    /// Queued but not yet executed tasks.
    pub fn depth(&self) -> usize {
        self.shared.depth.load(Ordering::Acquire)
    }

    pub fn state(&self) -> IntakeState {
        self.backpressure.state()
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.shared.metrics
    }

    /// Stops accepting work, lets the workers drain what is queued and joins them.
    pub fn shutdown(&mut self) {
        if self.tx.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Intake worker terminated abnormally");
            }
        }
        debug!("Intake processor stopped");
    }
}

impl Drop for IntakeProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(target_os = "linux")]
fn lower_priority() {
    // Linux applies PRIO_PROCESS with `who = 0` to the calling thread only.
    let result = unsafe {
        let current = libc::getpriority(libc::PRIO_PROCESS, 0);
        libc::setpriority(libc::PRIO_PROCESS, 0, (current + WORKER_NICENESS).min(19))
    };
    if result != 0 {
        debug!("Could not lower intake worker priority");
    }
}

#[cfg(not(target_os = "linux"))]
fn lower_priority() {}

fn worker_loop(rx: Receiver<Work>, shared: Arc<Shared>) {
    lower_priority();
    for work in rx.iter() {
        shared.metrics.queue_depth.dec();
        shared.depth.fetch_sub(1, Ordering::AcqRel);

        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(work)) {
            shared.metrics.task_failures.inc();
            error!(reason = panic_message(&*panic), "Intake task failed");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{mailbox, QueryKind};
    use crossbeam::channel::bounded;
    use proptest::prelude::*;
    use std::time::{Duration, Instant};
    use tracing_test::traced_test;

    fn processor(workers: usize, overflow_at: usize, relax_at: usize) -> IntakeProcessor {
        IntakeProcessor::new(
            IntakeSettings {
                workers,
                overflow_at,
                relax_at,
            },
            PipelineMetrics::new(),
        )
        .unwrap()
    }

    /// Occupies the single worker until the returned sender is dropped.
    fn block_worker(intake: &IntakeProcessor) -> Sender<()> {
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let (started_tx, started_rx) = bounded::<()>(1);
        intake.submit(move || {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
        });
        started_rx.recv().unwrap();
        gate_tx
    }

    fn wait_for_depth(intake: &IntakeProcessor, depth: usize) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while intake.depth() > depth {
            assert!(Instant::now() < deadline, "queue did not drain");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(matches!(
            IntakeProcessor::new(
                IntakeSettings {
                    workers: 0,
                    ..IntakeSettings::default()
                },
                PipelineMetrics::new()
            ),
            Err(IntakeError::NoWorkers)
        ));
        assert!(matches!(
            Backpressure::new(700, 700),
            Err(IntakeError::Thresholds { .. })
        ));
    }

    #[test]
    fn sheds_after_overflow_and_recovers_after_relax() {
        let intake = processor(1, 1000, 700);
        let gate = block_worker(&intake);
        assert_eq!(intake.depth(), 0);

        for _ in 0..1000 {
            assert_eq!(intake.submit(|| {}), Admission::Accepted);
        }
        assert_eq!(intake.state(), IntakeState::Accepting);

        assert_eq!(intake.submit(|| {}), Admission::Accepted);
        assert_eq!(intake.state(), IntakeState::Shedding);
        assert_eq!(intake.depth(), 1001);

        for _ in 0..50 {
            assert_eq!(intake.submit(|| {}), Admission::Dropped);
        }
        assert_eq!(intake.depth(), 1001);
        assert_eq!(intake.metrics().events_dropped.get(), 50);

        drop(gate);
        wait_for_depth(&intake, 0);

        assert_eq!(intake.submit(|| {}), Admission::Accepted);
        assert_eq!(intake.state(), IntakeState::Accepting);
    }

    #[traced_test]
    #[test]
    fn logs_each_transition_once() {
        let intake = processor(1, 10, 5);
        let gate = block_worker(&intake);

        for _ in 0..100 {
            intake.submit(|| {});
        }
        drop(gate);
        wait_for_depth(&intake, 0);
        intake.submit(|| {});

        logs_assert(|lines: &[&str]| {
            let overflow = lines
                .iter()
                .filter(|l| l.contains("Intake queue overflow"))
                .count();
            let relaxed = lines
                .iter()
                .filter(|l| l.contains("Intake queue relaxed"))
                .count();
            match (overflow, relaxed) {
                (1, 1) => Ok(()),
                other => Err(format!("unexpected transition log counts {other:?}")),
            }
        });
    }

    #[test]
    fn failing_task_does_not_stop_worker() {
        let intake = processor(1, 100, 10);
        let (done_tx, done_rx) = bounded::<u32>(1);

        intake.submit(|| panic!("task exploded"));
        intake.submit(move || done_tx.send(7).unwrap());

        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(7));
        assert_eq!(intake.metrics().task_failures.get(), 1);
    }

    #[test]
    fn internal_events_are_filtered_before_queueing() {
        let intake = processor(1, 100, 10);
        let bus = Arc::new(TopicBus::new());
        let (tx, rx) = mailbox();
        bus.subscribe(RAW_EVENT_TOPIC, &tx);

        let internal = RawEvent::new(QueryKind::Read, "system", "local").internal();
        assert_eq!(intake.report(internal, &bus), Admission::Filtered);
        assert_eq!(intake.metrics().events_submitted.get(), 0);

        let external = RawEvent::new(QueryKind::Write, "ks", "t1");
        assert_eq!(intake.report(external, &bus), Admission::Accepted);
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            Message::Query(event) => assert_eq!(event.resource, "t1"),
            other => panic!("unexpected message {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn shutdown_drains_and_is_idempotent() {
        let mut intake = processor(2, 100, 10);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            intake.submit(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        intake.shutdown();
        intake.shutdown();
        assert_eq!(counter.load(Ordering::Relaxed), 50);
        assert_eq!(intake.submit(|| {}), Admission::Dropped);
    }

    #[test]
    fn queue_depth_gauge_tracks_the_queue() {
        let intake = Arc::new(processor(1, 100_000, 50_000));
        let gate = block_worker(&intake);

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let intake = Arc::clone(&intake);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        intake.submit(|| {});
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        assert_eq!(intake.depth(), 2000);
        assert_eq!(intake.metrics().queue_depth.get(), 2000);

        drop(gate);
        wait_for_depth(&intake, 0);
        assert_eq!(intake.metrics().queue_depth.get(), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn workers_run_nicer_than_the_producer() {
        let intake = processor(1, 100, 10);
        let producer = unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) };

        let (tx, rx) = bounded::<i32>(1);
        intake.submit(move || {
            let _ = tx.send(unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) });
        });
        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(worker, (producer + WORKER_NICENESS).min(19));
    }

    #[test]
    fn relax_boundary_is_inclusive() {
        let bp = Backpressure::new(10, 5).unwrap();
        assert_eq!(bp.admit(10).transition, Some(IntakeState::Shedding));
        assert!(!bp.admit(6).admit);
        let decision = bp.admit(5);
        assert!(decision.admit);
        assert_eq!(decision.transition, Some(IntakeState::Accepting));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Submit,
        Drain(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => Just(Op::Submit),
            1 => (1usize..50).prop_map(Op::Drain),
        ]
    }

    proptest! {
        #[test]
        fn never_oscillates_on_a_single_crossing(
            overflow_at in 1usize..200,
            gap in 1usize..200,
            ops in prop::collection::vec(op(), 1..2000),
        ) {
            let relax_at = overflow_at.saturating_sub(gap);
            prop_assume!(relax_at < overflow_at);
            let bp = Backpressure::new(overflow_at, relax_at).unwrap();

            let mut depth = 0usize;
            let mut drained_since_shedding = 0usize;

            for op in ops {
                match op {
                    Op::Submit => {
                        let decision = bp.admit(depth);
                        match decision.transition {
                            Some(IntakeState::Shedding) => drained_since_shedding = 0,
                            Some(IntakeState::Accepting) => {
                                prop_assert!(depth <= relax_at);
                                prop_assert!(drained_since_shedding >= overflow_at + 1 - relax_at);
                            }
                            None => {}
                        }
                        if decision.admit {
                            depth += 1;
                        } else {
                            prop_assert_eq!(bp.state(), IntakeState::Shedding);
                            prop_assert!(depth > relax_at);
                        }
                        prop_assert!(depth <= overflow_at + 1);
                    }
                    Op::Drain(n) => {
                        let n = n.min(depth);
                        depth -= n;
                        drained_since_shedding += n;
                    }
                }
            }
        }
    }
}
