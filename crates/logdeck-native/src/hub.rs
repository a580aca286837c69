use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use logdeck_logs::{LogSubscription, SourceError};
use logdeck_types::RawLogRecord;

#[derive(Default)]
struct HubInner {
    subscribers: HashMap<u64, mpsc::UnboundedSender<Vec<RawLogRecord>>>,
    next_id: u64,
    offline: bool,
}

/// Fan-out point for live log batches coming from the backend process.
///
/// Each subscriber gets every batch emitted while it is registered.
#[derive(Clone, Default)]
pub struct NativeLogHub {
    inner: Arc<Mutex<HubInner>>,
}

impl NativeLogHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Fails while the hub is offline.
    pub fn subscribe(&self) -> Result<LogSubscription, SourceError> {
        let mut inner = self.inner.lock();
        if inner.offline {
            return Err(SourceError::Disconnected);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.insert(id, tx);

        let weak: Weak<Mutex<HubInner>> = Arc::downgrade(&self.inner);
        Ok(LogSubscription::new(rx, move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().subscribers.remove(&id);
            }
        }))
    }

    /// Deliver a batch to all live subscribers. Returns how many received it.
    pub fn emit(&self, batch: Vec<RawLogRecord>) -> usize {
        if batch.is_empty() {
            return 0;
        }

        let mut inner = self.inner.lock();
        inner
            .subscribers
            .retain(|_, tx| tx.send(batch.clone()).is_ok());
        inner.subscribers.len()
    }

    /// Drop every subscription; their streams end
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock();
        tracing::debug!(subscribers = inner.subscribers.len(), "disconnecting log hub");
        inner.subscribers.clear();
    }

    /// Mark the backend reachable or not. Going offline also disconnects.
    pub fn set_online(&self, online: bool) {
        let mut inner = self.inner.lock();
        inner.offline = !online;
        if !online {
            inner.subscribers.clear();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}
