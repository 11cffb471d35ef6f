//! ## querywatch-engine::runtime
//! **One thread per module and per reporter**
//!
//! Each unit owns a bounded mailbox and a loop selecting over that mailbox,
//! its timer (or `never()`), and a stop channel. Units never wait on each
//! other; the only blocking point is the select itself.
//!
//! Startup is acknowledged: a unit subscribes, runs its start hook, arms its
//! timer, and only then reports ready to the spawning thread.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{bounded, never, select, tick, Receiver, Sender};
use tracing::{debug, error, warn};

use querywatch_core::error::ConsumerError;
use querywatch_core::events::{bounded_mailbox, Message, TopicBus, RAW_EVENT_TOPIC};
use querywatch_modules::{Module, Outbox};
use querywatch_reporters::Reporter;
use querywatch_telemetry::PipelineMetrics;

use crate::PipelineError;

/// Capacity of a module's raw-event mailbox. Deliveries beyond it are dropped.
pub const MODULE_MAILBOX_CAPACITY: usize = 16_384;
/// Capacity of a reporter's measurement mailbox.
pub const REPORTER_MAILBOX_CAPACITY: usize = 16_384;

/// Handle to a running unit thread.
pub struct UnitHandle {
    name: String,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl UnitHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the unit thread is still looping.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signals the unit and waits for it to unsubscribe and run its stop hook.
    /// Later calls are no-ops.
    pub fn stop(&mut self) {
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(unit = %self.name, "Unit thread panicked");
            }
        }
    }
}

impl Drop for UnitHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_unit<F>(name: String, body: F) -> Result<UnitHandle, PipelineError>
where
    F: FnOnce(Receiver<()>, Sender<Result<(), PipelineError>>) + Send + 'static,
{
    let (stop_tx, stop_rx) = bounded::<()>(0);
    let (ready_tx, ready_rx) = bounded(1);

    let thread = std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || body(stop_rx, ready_tx))
        .map_err(|source| PipelineError::Spawn {
            unit: name.clone(),
            source,
        })?;

    let mut handle = UnitHandle {
        name,
        stop: Some(stop_tx),
        thread: Some(thread),
    };

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => {
            handle.stop();
            Err(e)
        }
        Err(_) => {
            handle.stop();
            Err(PipelineError::Startup {
                unit: handle.name.clone(),
            })
        }
    }
}

/// Starts `module` on its own thread, publishing through `outbox`.
pub fn spawn_module(
    mut module: Box<dyn Module>,
    outbox: Outbox,
    bus: Arc<TopicBus>,
) -> Result<UnitHandle, PipelineError> {
    let name = format!("module-{}", module.measurement());

    spawn_unit(name.clone(), move |stop, ready| {
        let (mailbox, inbox) = bounded_mailbox(MODULE_MAILBOX_CAPACITY);
        let subscription = module
            .subscribes_to_events()
            .then(|| bus.subscribe(RAW_EVENT_TOPIC, &mailbox));

        if let Err(e) = module.on_start(&outbox) {
            if let Some(subscription) = &subscription {
                bus.unsubscribe(&subscription.topic, &mailbox);
            }
            let _ = ready.send(Err(e.into()));
            return;
        }

        let ticker = module.period().map(tick).unwrap_or_else(never);
        debug!(unit = %name, subscribed = subscription.is_some(), "Module ready");
        let _ = ready.send(Ok(()));

        loop {
            select! {
                recv(stop) -> _ => break,
                recv(inbox) -> message => {
                    let Ok(message) = message else { break };
                    if let Err(e) = module.handle(&message, &outbox) {
                        error!(unit = %name, error = %e, "Consumer terminated");
                        break;
                    }
                }
                recv(ticker) -> _ => module.on_tick(&outbox),
            }
        }

        if let Some(subscription) = &subscription {
            bus.unsubscribe(&subscription.topic, &mailbox);
        }
        module.on_stop();
        debug!(unit = %name, "Module stopped");
    })
}

fn deliver(
    reporter: &mut dyn Reporter,
    message: &Message,
    metrics: &PipelineMetrics,
) -> Result<(), ConsumerError> {
    let Message::Measurement(measurement) = message else {
        return Err(ConsumerError::Unhandled {
            consumer: format!("reporter '{}'", reporter.name()),
            message: message.kind(),
        });
    };
    if let Err(e) = reporter.on_measurement(measurement) {
        metrics.sink_errors.inc();
        warn!(reporter = %reporter.name(), error = %e, "Measurement delivery failed");
    }
    Ok(())
}

/// Starts `reporter` on its own thread, consuming the topic it is named after.
pub fn spawn_reporter(
    mut reporter: Box<dyn Reporter>,
    bus: Arc<TopicBus>,
    metrics: PipelineMetrics,
) -> Result<UnitHandle, PipelineError> {
    let name = format!("reporter-{}", reporter.name());

    spawn_unit(name.clone(), move |stop, ready| {
        if let Err(e) = reporter.on_start() {
            let _ = ready.send(Err(e.into()));
            return;
        }

        let (mailbox, inbox) = bounded_mailbox(REPORTER_MAILBOX_CAPACITY);
        let subscription = bus.subscribe(reporter.name(), &mailbox);
        debug!(unit = %name, topic = %subscription.topic, "Reporter ready");
        let _ = ready.send(Ok(()));

        loop {
            select! {
                recv(stop) -> _ => break,
                recv(inbox) -> message => {
                    let Ok(message) = message else { break };
                    if let Err(e) = deliver(reporter.as_mut(), &message, &metrics) {
                        error!(unit = %name, error = %e, "Consumer terminated");
                        break;
                    }
                }
            }
        }

        bus.unsubscribe(&subscription.topic, &mailbox);
        reporter.on_stop();
        debug!(unit = %name, "Reporter stopped");
    })
}
