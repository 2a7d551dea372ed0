use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use alloy::consensus::Header;
use tokio::sync::mpsc;
use tracing::{info, warn};

// Per-subscriber buffer. A monitor that falls this far behind starts
// losing heads rather than stalling the dispatch loop.
const SUBSCRIBER_BUFFER: usize = 10;

/// Receiving end of a dispatcher subscription.
///
/// Handles for the same id share one underlying channel, so `subscribe`
/// stays idempotent.
#[derive(Clone)]
pub struct Subscription {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Arc<Header>>>>,
}

impl Subscription {
    /// Receives the next header, or `None` once the subscription closed.
    pub async fn recv(&self) -> Option<Arc<Header>> {
        self.rx.lock().await.recv().await
    }
}

struct Entry {
    tx: mpsc::Sender<Arc<Header>>,
    handle: Subscription,
}

/// Fan-out of canonical block headers to the monitors.
///
/// Delivery is non-blocking: a full subscriber buffer drops the header for
/// that subscriber only, and the drop is counted and logged.
#[derive(Default)]
pub struct Dispatcher {
    subs: Mutex<HashMap<String, Entry>>,
    dropped: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber. Subscribing an already-known id returns the
    /// existing stream.
    pub fn subscribe(&self, id: &str) -> Subscription {
        let mut subs = self.subs.lock().expect("dispatcher lock poisoned");

        if let Some(entry) = subs.get(id) {
            return entry.handle.clone();
        }

        info!(target: "sparseth::dispatcher", id, "new subscription");
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let handle = Subscription {
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        };
        subs.insert(
            id.to_string(),
            Entry {
                tx,
                handle: handle.clone(),
            },
        );
        handle
    }

    /// Removes the subscriber and closes its stream. Unknown ids are
    /// ignored.
    pub fn unsubscribe(&self, id: &str) {
        let mut subs = self.subs.lock().expect("dispatcher lock poisoned");
        if subs.remove(id).is_some() {
            info!(target: "sparseth::dispatcher", id, "unsubscribe");
        }
    }

    /// Sends the header to all active subscribers without blocking.
    pub fn broadcast(&self, header: Arc<Header>) {
        // Senders are cloned out so the guard is never held across a send.
        let targets: Vec<(String, mpsc::Sender<Arc<Header>>)> = {
            let subs = self.subs.lock().expect("dispatcher lock poisoned");
            subs.iter()
                .map(|(id, entry)| (id.clone(), entry.tx.clone()))
                .collect()
        };

        for (id, tx) in targets {
            match tx.try_send(header.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        target: "sparseth::dispatcher",
                        id,
                        num = header.number,
                        "dropping block head for slow subscriber"
                    );
                }
                // A closed receiver is unsubscribing concurrently.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }

    /// Total number of headers dropped due to subscriber backpressure.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Closes all subscriber streams.
    pub fn close(&self) {
        info!(target: "sparseth::dispatcher", "shutting down");
        self.subs
            .lock()
            .expect("dispatcher lock poisoned")
            .clear();
    }
}
