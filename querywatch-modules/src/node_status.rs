//! Node status snapshot: uptime, transport state and background work.

use std::sync::Arc;
use std::time::Duration;

use querywatch_config::ModuleSpec;
use querywatch_core::facts::NodeFacts;
use querywatch_core::measurement::{Measurement, TimeUnit};
use serde::Deserialize;
use validator::Validate;

use crate::{typed_options, Identity, Module, ModuleContext, ModuleError, Outbox};

#[derive(Debug, Deserialize, Validate)]
pub struct NodeStatusOptions {
    #[serde(default = "default_period")]
    #[validate(range(min = 1))]
    pub period: u64,

    #[serde(default = "default_time_unit")]
    pub time_unit: TimeUnit,

    /// Also publish one measurement per running background task.
    #[serde(default = "default_true")]
    pub report_tasks: bool,
}

fn default_period() -> u64 {
    1
}

fn default_time_unit() -> TimeUnit {
    TimeUnit::Minutes
}

fn default_true() -> bool {
    true
}

pub struct NodeStatus {
    measurement: String,
    task_measurement: String,
    identity: Identity,
    period: Duration,
    report_tasks: bool,
    facts: Arc<dyn NodeFacts>,
}

pub fn build(spec: &ModuleSpec, ctx: &ModuleContext) -> Result<Box<dyn Module>, ModuleError> {
    let options: NodeStatusOptions = typed_options(spec)?;
    Ok(Box::new(NodeStatus {
        measurement: spec.measurement.clone(),
        task_measurement: format!("{}_task", spec.measurement),
        identity: ctx.identity(),
        period: options.time_unit.to_duration(options.period),
        report_tasks: options.report_tasks,
        facts: ctx.require_facts(spec)?,
    }))
}

impl Module for NodeStatus {
    fn measurement(&self) -> &str {
        &self.measurement
    }

    fn period(&self) -> Option<Duration> {
        Some(self.period)
    }

    fn on_tick(&mut self, outbox: &Outbox) {
        let tasks = self.facts.active_tasks();
        let status = Measurement::complex(self.measurement.as_str())
            .field("uptime_ms", self.facts.uptime().as_millis() as u64)
            .field("transport_active", self.facts.transport_active())
            .field("pending_repairs", self.facts.pending_repairs())
            .field("active_tasks", tasks.len() as u64);
        outbox.publish(self.identity.stamp(status).build());

        if !self.report_tasks {
            return;
        }
        for task in tasks {
            let builder = Measurement::simple(self.task_measurement.as_str(), task.completed as f64)
                .tag("task_kind", task.kind)
                .tag("resource", task.resource)
                .field("total", task.total);
            outbox.publish(self.identity.stamp(builder).build());
        }
    }
}
