//! ## querywatch-core::events
//! **Raw events and the topic bus that carries them**
//!
//! ### Key Submodules:
//! - `query`: the intercepted-operation model ([`RawEvent`])
//! - `bus`: named-topic publish/subscribe fabric ([`TopicBus`])
//!
//! Everything on the bus is a [`Message`]; payloads are `Arc`-shared so a
//! fan-out to N subscribers never copies an event or a measurement.

pub mod bus;
pub mod query;

use std::sync::Arc;

pub use bus::{bounded_mailbox, mailbox, MailboxId, MailboxRef, Subscription, TopicBus};
pub use query::{ConsistencyLevel, QueryKind, RawEvent};

use crate::measurement::Measurement;

/// Topic every raw query event is published to.
pub const RAW_EVENT_TOPIC: &str = "querywatch.raw-events";

/// Unit of delivery on the [`TopicBus`].
#[derive(Clone, Debug)]
pub enum Message {
    Query(Arc<RawEvent>),
    Measurement(Arc<Measurement>),
}

impl Message {
    /// Short name used when a consumer reports a message it cannot handle.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Query(_) => "query",
            Message::Measurement(_) => "measurement",
        }
    }
}

impl From<RawEvent> for Message {
    fn from(event: RawEvent) -> Self {
        Message::Query(Arc::new(event))
    }
}

impl From<Measurement> for Message {
    fn from(measurement: Measurement) -> Self {
        Message::Measurement(Arc::new(measurement))
    }
}
