//! Change broadcaster: fan-out of link events with per-category dedup
//!
//! Status snapshots, text updates and connection edges are each compared
//! with the last value published in the same category and dropped when
//! equal. Notices are always delivered. A subscriber whose delivery fails is
//! removed; the failure never reaches the publisher.

use crate::{ConnectionEvent, LinkEvent, Notice, StatusSnapshot, TextEvent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

pub type SubscriberId = u64;

#[derive(Debug, Error)]
#[error("subscriber is gone")]
pub struct SinkClosed;

/// Destination for broadcast events. Delivery must not block.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: &LinkEvent) -> Result<(), SinkClosed>;
}

impl EventSink for mpsc::UnboundedSender<LinkEvent> {
    fn deliver(&self, event: &LinkEvent) -> Result<(), SinkClosed> {
        self.send(event.clone()).map_err(|_| SinkClosed)
    }
}

#[derive(Debug, Default)]
struct LastPublished {
    status: Option<StatusSnapshot>,
    text: Option<TextEvent>,
    connection: Option<ConnectionEvent>,
}

#[derive(Default)]
pub struct ChangeBroadcaster {
    subscribers: Mutex<Vec<(SubscriberId, Box<dyn EventSink>)>>,
    last: Mutex<LastPublished>,
    next_id: AtomicU64,
}

impl ChangeBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel-backed subscriber
    pub fn subscribe(&self) -> (SubscriberId, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.register(Box::new(tx)), rx)
    }

    pub fn register(&self, sink: Box<dyn EventSink>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.subscribers.lock().push((id, sink));
        debug!(subscriber = id, "subscriber registered");
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        before != subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Publish a status snapshot unless it equals the previous one.
    /// Returns whether anything was delivered.
    pub fn publish_status(&self, snapshot: StatusSnapshot) -> bool {
        {
            let mut last = self.last.lock();
            if last.status.as_ref() == Some(&snapshot) {
                return false;
            }
            last.status = Some(snapshot.clone());
        }
        self.deliver(LinkEvent::Status(snapshot));
        true
    }

    pub fn publish_text(&self, text: TextEvent) -> bool {
        {
            let mut last = self.last.lock();
            if last.text.as_ref() == Some(&text) {
                return false;
            }
            last.text = Some(text.clone());
        }
        self.deliver(LinkEvent::Text(text));
        true
    }

    pub fn publish_connection(&self, event: ConnectionEvent) -> bool {
        {
            let mut last = self.last.lock();
            if last.connection.as_ref() == Some(&event) {
                return false;
            }
            last.connection = Some(event.clone());
        }
        self.deliver(LinkEvent::Connection(event));
        true
    }

    pub fn publish_notice(&self, notice: Notice) {
        self.deliver(LinkEvent::Notice(notice));
    }

    pub fn last_status(&self) -> Option<StatusSnapshot> {
        self.last.lock().status.clone()
    }

    pub fn last_connection(&self) -> Option<ConnectionEvent> {
        self.last.lock().connection.clone()
    }

    fn deliver(&self, event: LinkEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(id, sink)| match sink.deliver(&event) {
            Ok(()) => true,
            Err(SinkClosed) => {
                debug!(subscriber = id, event = event.type_name(), "dropping closed subscriber");
                false
            }
        });
    }
}
