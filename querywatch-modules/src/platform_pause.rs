//! Platform pause detector.
//!
//! A sampler thread repeatedly sleeps `resolution_ms` and records how much
//! longer than requested the sleep took. Long overshoots mean the process
//! was not scheduled: stop-the-world pauses, CPU starvation, swapping. The
//! tick publishes the interval's pause distribution in milliseconds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use querywatch_config::ModuleSpec;
use querywatch_core::measurement::{Measurement, TimeUnit};
use querywatch_core::recorder::LatencyRecorder;
use serde::Deserialize;
use tracing::{debug, warn};
use validator::Validate;

use crate::{typed_options, Identity, Module, ModuleContext, ModuleError, Outbox};

/// Published percentiles and their field names.
const PERCENTILES: [(&str, f64); 6] = [
    ("p90", 90.0),
    ("p95", 95.0),
    ("p99", 99.0),
    ("p999", 99.9),
    ("p9999", 99.99),
    ("p99999", 99.999),
];

#[derive(Debug, Deserialize, Validate)]
pub struct PlatformPauseOptions {
    #[serde(default = "default_period")]
    #[validate(range(min = 1))]
    pub period: u64,

    #[serde(default = "default_time_unit")]
    pub time_unit: TimeUnit,

    #[serde(default = "default_resolution")]
    #[validate(range(min = 1, max = 1000))]
    pub resolution_ms: u64,
}

fn default_period() -> u64 {
    5
}

fn default_time_unit() -> TimeUnit {
    TimeUnit::Seconds
}

fn default_resolution() -> u64 {
    1
}

struct Sampler {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct PlatformPause {
    measurement: String,
    identity: Identity,
    period: Duration,
    resolution: Duration,
    recorder: Arc<LatencyRecorder>,
    sampler: Option<Sampler>,
}

pub fn build(spec: &ModuleSpec, ctx: &ModuleContext) -> Result<Box<dyn Module>, ModuleError> {
    let options: PlatformPauseOptions = typed_options(spec)?;
    Ok(Box::new(PlatformPause {
        measurement: spec.measurement.clone(),
        identity: ctx.identity(),
        period: options.time_unit.to_duration(options.period),
        resolution: Duration::from_millis(options.resolution_ms),
        recorder: Arc::new(LatencyRecorder::new()),
        sampler: None,
    }))
}

fn sample(recorder: &LatencyRecorder, resolution: Duration, running: &AtomicBool) {
    while running.load(Ordering::Acquire) {
        let started = Instant::now();
        std::thread::sleep(resolution);
        let overshoot = started.elapsed().saturating_sub(resolution);
        recorder.record(overshoot.as_micros() as u64);
    }
}

fn micros_to_ms(micros: u64) -> f64 {
    micros as f64 / 1_000.0
}

impl PlatformPause {
    fn summary(&self) -> Measurement {
        let snapshot = self.recorder.drain();
        let mut builder = Measurement::complex(self.measurement.as_str());
        for (field, percentile) in PERCENTILES {
            builder = builder.field(field, micros_to_ms(snapshot.percentile(percentile)));
        }
        builder = builder
            .field("max", micros_to_ms(snapshot.max()))
            .field("count", snapshot.count());
        self.identity.stamp(builder).build()
    }
}

impl Module for PlatformPause {
    fn measurement(&self) -> &str {
        &self.measurement
    }

    fn period(&self) -> Option<Duration> {
        Some(self.period)
    }

    fn on_start(&mut self, _outbox: &Outbox) -> Result<(), ModuleError> {
        if self.sampler.is_some() {
            return Ok(());
        }
        let running = Arc::new(AtomicBool::new(true));
        let handle = std::thread::Builder::new()
            .name(format!("pause-sampler-{}", self.measurement))
            .spawn({
                let recorder = Arc::clone(&self.recorder);
                let running = Arc::clone(&running);
                let resolution = self.resolution;
                move || sample(&recorder, resolution, &running)
            })
            .map_err(|source| ModuleError::Start {
                module: self.measurement.clone(),
                source,
            })?;
        debug!(module = %self.measurement, "Pause sampler started");
        self.sampler = Some(Sampler { running, handle });
        Ok(())
    }

    fn on_tick(&mut self, outbox: &Outbox) {
        outbox.publish(self.summary());
    }

    fn on_stop(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.running.store(false, Ordering::Release);
            if sampler.handle.join().is_err() {
                warn!(module = %self.measurement, "Pause sampler panicked");
            }
        }
    }
}

impl Drop for PlatformPause {
    fn drop(&mut self) {
        self.on_stop();
    }
}
