//! # querywatch-engine
//!
//! Runs the pipeline: builds units through the [`Registry`], runs each on
//! its own thread ([`runtime`]), supervises start/stop/reload
//! ([`Supervisor`]) and exposes the producer entry point ([`Pipeline`]).

mod error;
pub mod pipeline;
pub mod registry;
pub mod runtime;
pub mod supervisor;

pub use self::{
    error::PipelineError,
    pipeline::{Pipeline, PipelineBuilder},
    registry::Registry,
    supervisor::{Disabled, StartReport, Supervisor},
};

pub mod prelude {
    pub use super::{Pipeline, PipelineError, Registry, StartReport, Supervisor};
}
