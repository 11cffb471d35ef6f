//! Constant liveness signal.

use std::time::Duration;

use querywatch_config::ModuleSpec;
use querywatch_core::measurement::{Measurement, TimeUnit};
use serde::Deserialize;
use validator::Validate;

use crate::{typed_options, Identity, Module, ModuleContext, ModuleError, Outbox};

#[derive(Debug, Deserialize, Validate)]
pub struct HeartbeatOptions {
    #[serde(default = "default_period")]
    #[validate(range(min = 1))]
    pub period: u64,

    #[serde(default = "default_time_unit")]
    pub time_unit: TimeUnit,
}

fn default_period() -> u64 {
    15
}

fn default_time_unit() -> TimeUnit {
    TimeUnit::Minutes
}

pub struct Heartbeat {
    measurement: String,
    identity: Identity,
    period: Duration,
}

pub fn build(spec: &ModuleSpec, ctx: &ModuleContext) -> Result<Box<dyn Module>, ModuleError> {
    let options: HeartbeatOptions = typed_options(spec)?;
    Ok(Box::new(Heartbeat {
        measurement: spec.measurement.clone(),
        identity: ctx.identity(),
        period: options.time_unit.to_duration(options.period),
    }))
}

impl Module for Heartbeat {
    fn measurement(&self) -> &str {
        &self.measurement
    }

    fn period(&self) -> Option<Duration> {
        Some(self.period)
    }

    fn on_tick(&mut self, outbox: &Outbox) {
        let builder = Measurement::simple(self.measurement.as_str(), 1.0);
        outbox.publish(self.identity.stamp(builder).build());
    }
}
