//! Unreachable peers, polled from the node facts.

use std::sync::Arc;
use std::time::Duration;

use querywatch_config::ModuleSpec;
use querywatch_core::facts::NodeFacts;
use querywatch_core::measurement::{Measurement, TimeUnit};
use serde::Deserialize;
use validator::Validate;

use crate::{typed_options, Identity, Module, ModuleContext, ModuleError, Outbox};

#[derive(Debug, Deserialize, Validate)]
pub struct ClusterHealthOptions {
    #[serde(default = "default_period")]
    #[validate(range(min = 1))]
    pub period: u64,

    #[serde(default = "default_time_unit")]
    pub time_unit: TimeUnit,
}

fn default_period() -> u64 {
    10
}

fn default_time_unit() -> TimeUnit {
    TimeUnit::Seconds
}

pub struct ClusterHealth {
    measurement: String,
    identity: Identity,
    period: Duration,
    facts: Arc<dyn NodeFacts>,
}

pub fn build(spec: &ModuleSpec, ctx: &ModuleContext) -> Result<Box<dyn Module>, ModuleError> {
    let options: ClusterHealthOptions = typed_options(spec)?;
    Ok(Box::new(ClusterHealth {
        measurement: spec.measurement.clone(),
        identity: ctx.identity(),
        period: options.time_unit.to_duration(options.period),
        facts: ctx.require_facts(spec)?,
    }))
}

impl Module for ClusterHealth {
    fn measurement(&self) -> &str {
        &self.measurement
    }

    fn period(&self) -> Option<Duration> {
        Some(self.period)
    }

    fn on_tick(&mut self, outbox: &Outbox) {
        let peers = self.facts.unreachable_peers();
        let builder = Measurement::simple(self.measurement.as_str(), peers.len() as f64)
            .field("unreachable", peers.join(","));
        outbox.publish(self.identity.stamp(builder).build());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, drain, outbox, spec};
    use querywatch_core::facts::StaticFacts;
    use querywatch_core::measurement::FieldValue;
    use serde_json::json;

    #[test]
    fn reports_unreachable_peers() {
        let facts = StaticFacts {
            unreachable: vec!["10.0.0.2".into(), "10.0.0.3".into()],
            ..StaticFacts::default()
        };
        let ctx = context().with_facts(Arc::new(facts));
        let mut health = build(&spec("cluster_health", json!({})), &ctx).unwrap();
        let (outbox, rx) = outbox();
        health.on_tick(&outbox);

        let published = drain(&rx);
        assert_eq!(published[0].value(), Some(2.0));
        assert_eq!(
            published[0].field("unreachable"),
            Some(&FieldValue::Text("10.0.0.2,10.0.0.3".into()))
        );
    }

    #[test]
    fn requires_node_facts() {
        let err = build(&spec("cluster_health", json!({})), &context())
            .err()
            .unwrap();
        assert!(matches!(err, ModuleError::MissingCollaborator { .. }));
    }
}
