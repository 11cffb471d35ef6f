//! Producer-facing facade: intake in front, supervised units behind.

use std::sync::Arc;

use querywatch_config::{IntakeConfig, PipelineConfig};
use querywatch_core::events::{RawEvent, TopicBus};
use querywatch_core::facts::NodeFacts;
use querywatch_core::intake::{Admission, IntakeProcessor, IntakeSettings, IntakeState};
use querywatch_telemetry::PipelineMetrics;

use crate::supervisor::{StartReport, Supervisor};
use crate::{PipelineError, Registry};

fn settings(config: &IntakeConfig) -> IntakeSettings {
    IntakeSettings {
        workers: config.workers,
        overflow_at: config.overflow_at,
        relax_at: config.relax_at,
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    registry: Option<Registry>,
    facts: Option<Arc<dyn NodeFacts>>,
    metrics: Option<PipelineMetrics>,
}

impl PipelineBuilder {
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn facts(mut self, facts: Arc<dyn NodeFacts>) -> Self {
        self.facts = Some(facts);
        self
    }

    pub fn metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validates `config`, starts every unit and opens the intake.
    pub fn start(self, config: PipelineConfig) -> Result<(Pipeline, StartReport), PipelineError> {
        let metrics = self.metrics.unwrap_or_default();
        let bus = Arc::new(TopicBus::new());
        let mut supervisor = Supervisor::new(
            self.registry.unwrap_or_else(Registry::with_defaults),
            Arc::clone(&bus),
            self.facts,
            metrics.clone(),
        );

        let prepared = supervisor.prepare(config)?;
        let intake_config = prepared.config().intake.clone();
        let intake = IntakeProcessor::new(settings(&intake_config), metrics)?;
        let report = supervisor.replace(prepared);

        Ok((
            Pipeline {
                bus,
                intake,
                intake_config,
                supervisor,
            },
            report,
        ))
    }
}

pub struct Pipeline {
    bus: Arc<TopicBus>,
    intake: IntakeProcessor,
    intake_config: IntakeConfig,
    supervisor: Supervisor,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Hands one raw event to the intake. Never blocks.
    pub fn report(&self, event: RawEvent) -> Admission {
        self.intake.report(event, &self.bus)
    }

    /// Swaps in `config`. The running set is untouched unless the new one
    /// validates and its intake can be built.
    pub fn reload(&mut self, config: PipelineConfig) -> Result<StartReport, PipelineError> {
        let prepared = self.supervisor.prepare(config)?;

        let intake_config = prepared.config().intake.clone();
        let intake = if intake_config != self.intake_config {
            Some(IntakeProcessor::new(
                settings(&intake_config),
                self.intake.metrics().clone(),
            )?)
        } else {
            None
        };

        let report = self.supervisor.replace(prepared);
        if let Some(intake) = intake {
            // The old processor drains into the new set when dropped.
            self.intake = intake;
            self.intake_config = intake_config;
        }
        Ok(report)
    }

    /// Drains the intake, then stops every unit. Idempotent.
    pub fn stop(&mut self) {
        self.intake.shutdown();
        self.supervisor.stop();
    }

    pub fn intake_state(&self) -> IntakeState {
        self.intake.state()
    }

    pub fn queue_depth(&self) -> usize {
        self.intake.depth()
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        self.intake.metrics()
    }

    pub fn bus(&self) -> &Arc<TopicBus> {
        &self.bus
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }
}
