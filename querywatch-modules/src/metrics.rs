//! Periodic scrape of the node's named metrics.
//!
//! A metric is published when its name matches any `include` pattern and no
//! `exclude` pattern. Each one becomes a simple measurement tagged `metric`.

use std::sync::Arc;
use std::time::Duration;

use querywatch_config::ModuleSpec;
use querywatch_core::facts::NodeFacts;
use querywatch_core::measurement::{Measurement, TimeUnit};
use regex::RegexSet;
use serde::Deserialize;
use validator::Validate;

use crate::{typed_options, Identity, Module, ModuleContext, ModuleError, Outbox};

#[derive(Debug, Deserialize, Validate)]
pub struct MetricsOptions {
    #[serde(default = "default_period")]
    #[validate(range(min = 1))]
    pub period: u64,

    #[serde(default = "default_time_unit")]
    pub time_unit: TimeUnit,

    #[serde(default = "default_include")]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_period() -> u64 {
    1
}

fn default_time_unit() -> TimeUnit {
    TimeUnit::Minutes
}

fn default_include() -> Vec<String> {
    vec![".*".into()]
}

pub struct MetricScrape {
    measurement: String,
    identity: Identity,
    period: Duration,
    include: RegexSet,
    exclude: RegexSet,
    facts: Arc<dyn NodeFacts>,
}

pub fn build(spec: &ModuleSpec, ctx: &ModuleContext) -> Result<Box<dyn Module>, ModuleError> {
    let options: MetricsOptions = typed_options(spec)?;
    let compile = |patterns: &[String], option: &'static str| {
        RegexSet::new(patterns).map_err(|e| ModuleError::InvalidOption {
            module: spec.measurement.clone(),
            option,
            reason: e.to_string(),
        })
    };

    Ok(Box::new(MetricScrape {
        measurement: spec.measurement.clone(),
        identity: ctx.identity(),
        period: options.time_unit.to_duration(options.period),
        include: compile(&options.include, "include")?,
        exclude: compile(&options.exclude, "exclude")?,
        facts: ctx.require_facts(spec)?,
    }))
}

impl MetricScrape {
    fn selected(&self, name: &str) -> bool {
        self.include.is_match(name) && !self.exclude.is_match(name)
    }
}

impl Module for MetricScrape {
    fn measurement(&self) -> &str {
        &self.measurement
    }

    fn period(&self) -> Option<Duration> {
        Some(self.period)
    }

    fn on_tick(&mut self, outbox: &Outbox) {
        for (name, value) in self.facts.metrics() {
            if !self.selected(&name) {
                continue;
            }
            let builder = Measurement::simple(self.measurement.as_str(), value).tag("metric", name);
            outbox.publish(self.identity.stamp(builder).build());
        }
    }
}
