//! Fan-out of state events to live subscribers.
//!
//! Delivery is best effort: a subscriber whose sink fails is dropped from the
//! set and never delays delivery to the others. Events are relayed unchanged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::StateEvent;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("subscriber is gone")]
    Closed,
    #[error("subscriber is not keeping up")]
    Full,
}

pub trait EventSink: Send + Sync {
    fn send(&self, event: Arc<StateEvent>) -> Result<(), SinkError>;
}

pub type SubscriberId = u64;

type Subscribers = Vec<(SubscriberId, Arc<dyn EventSink>)>;

#[derive(Default)]
pub struct EventBroadcaster {
    subscribers: Mutex<Subscribers>,
    next_id: AtomicU64,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        // The list stays consistent even if a holder panicked
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, sink: Arc<dyn EventSink>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.lock();
        subscribers.push((id, sink));
        metrics::gauge!("broadcaster.subscribers").set(subscribers.len() as f64);
        debug!("Subscriber {} added ({} active)", id, subscribers.len());
        id
    }

    /// Returns false if the subscriber was already removed
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        metrics::gauge!("broadcaster.subscribers").set(subscribers.len() as f64);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `event` to every subscriber and return how many accepted it.
    pub fn publish(&self, event: StateEvent) -> usize {
        let event = Arc::new(event);
        // Sinks are called without holding the lock so they may subscribe
        // or unsubscribe re-entrantly
        let snapshot: Subscribers = self.lock().clone();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, sink) in &snapshot {
            match sink.send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Dropping subscriber {} after failed {} send: {}", id, event.kind(), e);
                    failed.push(*id);
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.lock();
            subscribers.retain(|(id, _)| !failed.contains(id));
            metrics::counter!("broadcaster.subscribers_removed_total").increment(failed.len() as u64);
            metrics::gauge!("broadcaster.subscribers").set(subscribers.len() as f64);
        }

        metrics::counter!("broadcaster.events_published_total", "kind" => event.kind()).increment(1);
        delivered
    }
}

/// Sink backed by a bounded channel; a full or closed channel fails the send
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<StateEvent>>,
}

impl ChannelSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<StateEvent>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: Arc<StateEvent>) -> Result<(), SinkError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}
