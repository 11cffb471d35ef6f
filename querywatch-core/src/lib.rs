//! # querywatch-core
//!
//! Foundation layer of the measurement pipeline:
//!
//! ```text
//! report(RawEvent) -> intake (shedding gate, worker pool) -> TopicBus[raw events]
//!     -> modules -> TopicBus[reporter name] -> reporters -> sinks
//! ```
//!
//! ### Key Submodules:
//! - `events`: raw query events, bus messages and the topic bus
//! - `intake`: non-blocking hand-off with ACCEPTING/SHEDDING hysteresis
//! - `measurement`: the normalized output model and its wire encodings
//! - `recorder`: lock-free interval latency recorder
//! - `facts`: the node fact-provider seam

pub mod error;
pub mod events;
pub mod facts;
pub mod intake;
pub mod measurement;
pub mod recorder;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::facts::*;
    pub use crate::intake::*;
    pub use crate::measurement::*;
    pub use crate::recorder::*;
}

pub use error::{ConsumerError, IntakeError};
