//! ## querywatch-engine::supervisor
//! **Wires modules and reporters from configuration and owns their lifecycle**
//!
//! A configuration change goes through two phases:
//! 1. [`Supervisor::prepare`] validates the document and constructs every
//!    unit. Nothing running is touched; a document-level failure ends here.
//! 2. [`Supervisor::replace`] stops the running set and starts the prepared
//!    one, reporters first so modules never publish into an empty topic.
//!
//! A unit with a malformed entry, an unknown identifier or a failing
//! constructor or start is logged and left disabled; the rest of the set
//! still runs.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::{info, instrument, warn};
use validator::Validate;

use querywatch_config::PipelineConfig;
use querywatch_core::events::TopicBus;
use querywatch_core::facts::NodeFacts;
use querywatch_modules::{Module, ModuleContext, Outbox};
use querywatch_reporters::Reporter;
use querywatch_telemetry::{EventLogger, PipelineMetrics};

use crate::runtime::{spawn_module, spawn_reporter, UnitHandle};
use crate::{PipelineError, Registry};

/// A unit left out of the running set, with the reason.
#[derive(Debug)]
pub struct Disabled {
    pub unit: String,
    pub error: PipelineError,
}

/// Outcome of starting a set.
#[derive(Debug, Default)]
pub struct StartReport {
    pub modules: Vec<String>,
    pub reporters: Vec<String>,
    pub disabled: Vec<Disabled>,
}

/// A validated, fully constructed set that has not started yet.
pub struct PreparedSet {
    config: PipelineConfig,
    modules: Vec<(Box<dyn Module>, Vec<String>)>,
    reporters: Vec<Box<dyn Reporter>>,
    disabled: Vec<Disabled>,
}

impl PreparedSet {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Units that failed to construct and will not start.
    pub fn disabled(&self) -> &[Disabled] {
        &self.disabled
    }
}

struct RunningSet {
    config: PipelineConfig,
    modules: Vec<UnitHandle>,
    reporters: Vec<UnitHandle>,
}

pub struct Supervisor {
    registry: Registry,
    bus: Arc<TopicBus>,
    facts: Option<Arc<dyn NodeFacts>>,
    metrics: PipelineMetrics,
    running: Option<RunningSet>,
}

fn disable(disabled: &mut Vec<Disabled>, kind: &str, unit: String, error: PipelineError) {
    warn!(unit = %unit, error = %error, "Unit disabled");
    EventLogger::log_event(
        &format!("{kind}_disabled"),
        vec![
            KeyValue::new("unit", unit.clone()),
            KeyValue::new("error", error.to_string()),
        ],
    );
    disabled.push(Disabled { unit, error });
}

impl Supervisor {
    pub fn new(
        registry: Registry,
        bus: Arc<TopicBus>,
        facts: Option<Arc<dyn NodeFacts>>,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            registry,
            bus,
            facts,
            metrics,
            running: None,
        }
    }

    /// Validates `config` and constructs every unit without starting any.
    #[instrument(level = "info", name = "prepare_pipeline", skip_all)]
    pub fn prepare(&self, config: PipelineConfig) -> Result<PreparedSet, PipelineError> {
        config.validate()?;

        let mut context = ModuleContext::new(
            config.global.system_name.clone(),
            config.global.resolved_hostname(),
        );
        if let Some(facts) = &self.facts {
            context = context.with_facts(Arc::clone(facts));
        }

        let mut disabled = Vec::new();

        let mut reporters = Vec::with_capacity(config.reporters.len());
        for spec in &config.reporters {
            if let Err(e) = spec.check() {
                disable(&mut disabled, "reporter", spec.name().to_string(), e.into());
                continue;
            }
            match self.registry.build_reporter(spec) {
                Ok(reporter) => reporters.push(reporter),
                Err(e) => disable(&mut disabled, "reporter", spec.name().to_string(), e),
            }
        }

        let declared = config.reporter_names();
        let mut modules = Vec::with_capacity(config.modules.len());
        for spec in &config.modules {
            let unit = spec.unit_name().to_string();
            if let Err(e) = spec.check(&declared) {
                disable(&mut disabled, "module", unit, e.into());
                continue;
            }
            match self.registry.build_module(spec, &context) {
                Ok(module) => modules.push((module, spec.reporters.clone())),
                Err(e) => disable(&mut disabled, "module", unit, e),
            }
        }

        Ok(PreparedSet {
            config,
            modules,
            reporters,
            disabled,
        })
    }

    /// Stops whatever is running and starts `prepared`.
    pub fn replace(&mut self, prepared: PreparedSet) -> StartReport {
        self.stop();

        let PreparedSet {
            config,
            modules,
            reporters,
            mut disabled,
        } = prepared;
        let mut report = StartReport::default();

        let mut reporter_handles = Vec::with_capacity(reporters.len());
        for reporter in reporters {
            let name = reporter.name().to_string();
            match spawn_reporter(reporter, Arc::clone(&self.bus), self.metrics.clone()) {
                Ok(handle) => {
                    report.reporters.push(name);
                    reporter_handles.push(handle);
                }
                Err(e) => disable(&mut disabled, "reporter", name, e),
            }
        }

        let mut module_handles = Vec::with_capacity(modules.len());
        for (module, topics) in modules {
            let name = module.measurement().to_string();
            let outbox = Outbox::new(Arc::clone(&self.bus), topics, self.metrics.clone());
            match spawn_module(module, outbox, Arc::clone(&self.bus)) {
                Ok(handle) => {
                    report.modules.push(name);
                    module_handles.push(handle);
                }
                Err(e) => disable(&mut disabled, "module", name, e),
            }
        }

        info!(
            modules = report.modules.len(),
            reporters = report.reporters.len(),
            disabled = disabled.len(),
            "Pipeline started"
        );
        EventLogger::log_event(
            "pipeline_started",
            vec![
                KeyValue::new("modules", report.modules.join(",")),
                KeyValue::new("reporters", report.reporters.join(",")),
                KeyValue::new("disabled", disabled.len() as i64),
            ],
        );

        report.disabled = disabled;
        self.running = Some(RunningSet {
            config,
            modules: module_handles,
            reporters: reporter_handles,
        });
        report
    }

    /// Validate-then-swap. On error the running set is left as it was.
    #[instrument(level = "info", name = "reload_pipeline", skip_all)]
    pub fn reload(&mut self, config: PipelineConfig) -> Result<StartReport, PipelineError> {
        let prepared = match self.prepare(config) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(error = %e, "Reload rejected, keeping running configuration");
                return Err(e);
            }
        };
        Ok(self.replace(prepared))
    }

    /// Stops modules, then reporters. Safe to call repeatedly.
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        for module in &mut running.modules {
            module.stop();
        }
        for reporter in &mut running.reporters {
            reporter.stop();
        }
        info!("Pipeline stopped");
        EventLogger::log_event("pipeline_stopped", vec![]);
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Configuration of the running set.
    pub fn config(&self) -> Option<&PipelineConfig> {
        self.running.as_ref().map(|r| &r.config)
    }

    /// Names of unit threads still looping.
    pub fn live_units(&self) -> Vec<String> {
        self.running
            .iter()
            .flat_map(|r| r.reporters.iter().chain(r.modules.iter()))
            .filter(|h| h.is_running())
            .map(|h| h.name().to_string())
            .collect()
    }

    pub fn bus(&self) -> &Arc<TopicBus> {
        &self.bus
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
