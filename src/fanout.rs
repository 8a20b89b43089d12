//! Fan-out of decoded events to live subscribers.
//!
//! The subscriber set is guarded by a mutex and copied before delivery, so
//! attach and detach can happen from any task while a publish is running.
//! A subscriber whose delivery fails is detached and the publish carries on
//! with the rest.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::event::DecodedEvent;

/// Identifier handed out on attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An outbound delivery sink.
///
/// `deliver` runs on the publishing task and must not block. Returning an
/// error detaches the subscriber.
#[cfg_attr(test, mockall::automock)]
pub trait Subscriber: Send + Sync {
    /// Hand one event to the sink.
    fn deliver(&self, event: &DecodedEvent) -> Result<()>;
}

/// Forwards events into an unbounded tokio channel.
pub struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<DecodedEvent>,
}

impl ChannelSubscriber {
    /// Wrap a sender.
    pub fn new(tx: mpsc::UnboundedSender<DecodedEvent>) -> Self {
        Self { tx }
    }
}

impl Subscriber for ChannelSubscriber {
    fn deliver(&self, event: &DecodedEvent) -> Result<()> {
        self.tx.send(event.clone()).map_err(|_| Error::Delivery {
            reason: "receiver dropped".to_string(),
        })
    }
}

/// Forwards the text rendering of each event, for line-oriented transports.
pub struct LineSubscriber {
    tx: mpsc::UnboundedSender<String>,
}

impl LineSubscriber {
    /// Wrap a sender.
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl Subscriber for LineSubscriber {
    fn deliver(&self, event: &DecodedEvent) -> Result<()> {
        self.tx.send(event.to_string()).map_err(|_| Error::Delivery {
            reason: "receiver dropped".to_string(),
        })
    }
}

/// Calls a closure for each event.
pub struct CallbackSubscriber<F> {
    callback: F,
}

impl<F> CallbackSubscriber<F>
where
    F: Fn(&DecodedEvent) -> Result<()> + Send + Sync,
{
    /// Wrap a closure.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> Subscriber for CallbackSubscriber<F>
where
    F: Fn(&DecodedEvent) -> Result<()> + Send + Sync,
{
    fn deliver(&self, event: &DecodedEvent) -> Result<()> {
        (self.callback)(event)
    }
}

/// Callback handle for unregistering callbacks.
///
/// Dropping the handle detaches the callback.
pub struct CallbackHandle {
    id: SubscriberId,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: SubscriberId, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the subscriber ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

type SubscriberSet = Vec<(SubscriberId, Arc<dyn Subscriber>)>;

#[derive(Default)]
struct BroadcasterInner {
    subscribers: Mutex<SubscriberSet>,
    next_id: AtomicU64,
}

impl BroadcasterInner {
    fn detach(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        before != subscribers.len()
    }
}

/// Delivers every published event to every attached subscriber.
///
/// Cloning yields another handle to the same subscriber set.
#[derive(Clone, Default)]
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

impl Broadcaster {
    /// Create an empty broadcaster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a subscriber.
    pub fn attach(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.inner.subscribers.lock().push((id, subscriber));
        debug!("Subscriber {} attached", id);
        id
    }

    /// Attach a channel subscriber and return its receiving end.
    pub fn attach_channel(&self) -> (SubscriberId, mpsc::UnboundedReceiver<DecodedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.attach(Arc::new(ChannelSubscriber::new(tx))), rx)
    }

    /// Attach a line subscriber and return its receiving end.
    pub fn attach_lines(&self) -> (SubscriberId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.attach(Arc::new(LineSubscriber::new(tx))), rx)
    }

    /// Register a callback for every event. Detached when the handle drops.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&DecodedEvent) + Send + Sync + 'static,
    {
        let id = self.attach(Arc::new(CallbackSubscriber::new(move |event: &DecodedEvent| {
            callback(event);
            Ok(())
        })));

        let inner: Weak<BroadcasterInner> = Arc::downgrade(&self.inner);
        CallbackHandle::new(id, move || {
            if let Some(inner) = inner.upgrade() {
                inner.detach(id);
            }
        })
    }

    /// Detach a subscriber. Returns `false` if it was not attached.
    pub fn detach(&self, id: SubscriberId) -> bool {
        let removed = self.inner.detach(id);
        if removed {
            debug!("Subscriber {} detached", id);
        }
        removed
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Deliver `event` to every subscriber attached right now.
    ///
    /// Returns how many subscribers accepted it.
    pub fn publish(&self, event: DecodedEvent) -> usize {
        let snapshot: SubscriberSet = self.inner.subscribers.lock().clone();
        let mut failed = Vec::new();

        for (id, subscriber) in &snapshot {
            if let Err(e) = subscriber.deliver(&event) {
                warn!("Dropping subscriber {}: {}", id, e);
                failed.push(*id);
            }
        }

        if !failed.is_empty() {
            self.inner
                .subscribers
                .lock()
                .retain(|(id, _)| !failed.contains(id));
        }

        let delivered = snapshot.len() - failed.len();
        trace!("Published {:?} to {} subscribers", event, delivered);
        delivered
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
