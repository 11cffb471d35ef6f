//! Compile-time registry of unit constructors, keyed by identifier.

use std::collections::BTreeMap;
use std::sync::Arc;

use querywatch_config::{ModuleSpec, ReporterSpec};
use querywatch_modules::{Module, ModuleContext, ModuleError};
use querywatch_reporters::{Reporter, SinkError};

use crate::PipelineError;

type ModuleConstructor =
    Arc<dyn Fn(&ModuleSpec, &ModuleContext) -> Result<Box<dyn Module>, ModuleError> + Send + Sync>;
type ReporterConstructor =
    Arc<dyn Fn(&ReporterSpec) -> Result<Box<dyn Reporter>, SinkError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Registry {
    modules: BTreeMap<String, ModuleConstructor>,
    reporters: BTreeMap<String, ReporterConstructor>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in module and reporter.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (id, factory) in querywatch_modules::BUILTIN {
            registry.register_module(id, *factory);
        }
        for (id, factory) in querywatch_reporters::BUILTIN {
            registry.register_reporter(id, *factory);
        }
        registry
    }

    /// Registers `constructor` under `id`, replacing any previous entry.
    pub fn register_module<F>(&mut self, id: &str, constructor: F) -> &mut Self
    where
        F: Fn(&ModuleSpec, &ModuleContext) -> Result<Box<dyn Module>, ModuleError>
            + Send
            + Sync
            + 'static,
    {
        self.modules.insert(id.to_string(), Arc::new(constructor));
        self
    }

    pub fn register_reporter<F>(&mut self, id: &str, constructor: F) -> &mut Self
    where
        F: Fn(&ReporterSpec) -> Result<Box<dyn Reporter>, SinkError> + Send + Sync + 'static,
    {
        self.reporters.insert(id.to_string(), Arc::new(constructor));
        self
    }

    pub fn build_module(
        &self,
        spec: &ModuleSpec,
        context: &ModuleContext,
    ) -> Result<Box<dyn Module>, PipelineError> {
        let constructor = self
            .modules
            .get(&spec.module)
            .ok_or_else(|| PipelineError::UnknownModule(spec.module.clone()))?;
        Ok(constructor(spec, context)?)
    }

    pub fn build_reporter(&self, spec: &ReporterSpec) -> Result<Box<dyn Reporter>, PipelineError> {
        let constructor = self
            .reporters
            .get(&spec.reporter)
            .ok_or_else(|| PipelineError::UnknownReporter(spec.reporter.clone()))?;
        Ok(constructor(spec)?)
    }

    pub fn module_ids(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn reporter_ids(&self) -> impl Iterator<Item = &str> {
        self.reporters.keys().map(String::as_str)
    }
}
