//! Topic-based publish/subscribe fabric.
//!
//! Publishers and subscribers only share a topic name. Each subscriber owns a
//! private crossbeam mailbox; `publish` hands the message to every mailbox
//! registered for the topic with a non-blocking `try_send` and returns.
//!
//! - A slow subscriber only grows its own mailbox (or, for bounded
//!   mailboxes, loses messages); it never stalls the publisher or its peers.
//! - Messages from one publishing thread reach each subscriber in
//!   publication order, since every mailbox is a FIFO channel.
//! - A closed mailbox silently loses the message. Publishers are not told.
//!
//! The registry is the only structure here touched by arbitrary threads. It
//! is read on every publish and written only on (un)subscribe, hence the
//! `RwLock`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::Message;

static NEXT_MAILBOX_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a mailbox, stable across clones of its [`MailboxRef`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MailboxId(u64);

/// Sending half of a subscriber's mailbox.
#[derive(Clone, Debug)]
pub struct MailboxRef {
    id: MailboxId,
    tx: Sender<Message>,
}

impl MailboxRef {
    pub fn new(tx: Sender<Message>) -> Self {
        Self {
            id: MailboxId(NEXT_MAILBOX_ID.fetch_add(1, Ordering::Relaxed)),
            tx,
        }
    }

    pub fn id(&self) -> MailboxId {
        self.id
    }
}

/// Creates an unbounded mailbox.
pub fn mailbox() -> (MailboxRef, Receiver<Message>) {
    let (tx, rx) = unbounded();
    (MailboxRef::new(tx), rx)
}

/// Creates a mailbox that drops messages once `capacity` are pending.
pub fn bounded_mailbox(capacity: usize) -> (MailboxRef, Receiver<Message>) {
    let (tx, rx) = bounded(capacity.max(1));
    (MailboxRef::new(tx), rx)
}

/// Acknowledgement returned to a subscriber once it is registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub mailbox: MailboxId,
}

#[derive(Default)]
pub struct TopicBus {
    topics: RwLock<HashMap<String, Vec<MailboxRef>>>,
    undelivered: AtomicU64,
}

impl TopicBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `mailbox` for `topic`. Registering the same mailbox twice is a no-op.
    pub fn subscribe(&self, topic: &str, mailbox: &MailboxRef) -> Subscription {
        let mut topics = self.topics.write();
        let subscribers = topics.entry(topic.to_string()).or_default();
        if !subscribers.iter().any(|m| m.id == mailbox.id) {
            subscribers.push(mailbox.clone());
            debug!(topic, mailbox = mailbox.id.0, "Subscribed");
        }
        Subscription {
            topic: topic.to_string(),
            mailbox: mailbox.id,
        }
    }

    /// Removes `mailbox` from `topic`. Returns whether it was registered.
    pub fn unsubscribe(&self, topic: &str, mailbox: &MailboxRef) -> bool {
        let mut topics = self.topics.write();
        let Some(subscribers) = topics.get_mut(topic) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|m| m.id != mailbox.id);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            topics.remove(topic);
        }
        if removed {
            debug!(topic, mailbox = mailbox.id.0, "Unsubscribed");
        }
        removed
    }

    /// Delivers `message` to every mailbox currently subscribed to `topic`.
    pub fn publish(&self, topic: &str, message: Message) {
        let topics = self.topics.read();
        let Some(subscribers) = topics.get(topic) else {
            trace!(topic, "Publish without subscribers");
            return;
        };

        for subscriber in subscribers {
            match subscriber.tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                    self.undelivered.fetch_add(1, Ordering::Relaxed);
                    trace!(topic, mailbox = subscriber.id.0, "Message not delivered");
                }
            }
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, Vec::len)
    }

    /// Messages lost to full or closed mailboxes since creation.
    pub fn undelivered(&self) -> u64 {
        self.undelivered.load(Ordering::Relaxed)
    }
}
