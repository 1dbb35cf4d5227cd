//! Per-client subscriptions: bounded delivery queues, backfill, and the
//! sender tasks that feed the transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::Event;
use crate::filter::Filter;
use crate::proto;
use crate::storage::EventStore;

/// Capacity of each subscription's delivery queue.
pub const SUB_QUEUE_CAPACITY: usize = 100;
/// Capacity of a connection's outbound frame channel.
pub const OUT_QUEUE_CAPACITY: usize = 256;

/// Item on a subscription's delivery queue. `Eose` is enqueued exactly once,
/// after the last historical event.
enum SubItem {
    Event(Box<Event>),
    Eose,
}

/// A named filter set registered by one client.
struct Subscription {
    filters: Vec<Filter>,
    queue: mpsc::Sender<SubItem>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Offer a live event. A full queue drops the event for this
    /// subscription; the relay favors liveness over completeness for slow
    /// consumers.
    fn offer(&self, ev: &Event) {
        if self.cancel.is_cancelled() {
            return;
        }
        if self.filters.iter().any(|f| f.matches(ev))
            && self
                .queue
                .try_send(SubItem::Event(Box::new(ev.clone())))
                .is_err()
        {
            debug!("subscription queue full, dropping live event");
        }
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// One connected client: its outbound frame channel, subscription map, and
/// single-fire closed flag.
pub struct Client {
    id: u64,
    out: mpsc::Sender<String>,
    subs: Mutex<HashMap<String, Subscription>>,
    closed: AtomicBool,
}

impl Client {
    pub fn new(id: u64, out: mpsc::Sender<String>) -> Arc<Self> {
        Arc::new(Self {
            id,
            out,
            subs: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Install a subscription, cancelling any prior one with the same id,
    /// then start its sender and backfill tasks.
    pub fn subscribe(&self, store: Arc<dyn EventStore>, sub_id: String, filters: Vec<Filter>) {
        let (tx, rx) = mpsc::channel(SUB_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();
        {
            let mut subs = self.subs.lock().unwrap();
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            if let Some(old) = subs.remove(&sub_id) {
                old.cancel();
            }
            subs.insert(
                sub_id.clone(),
                Subscription {
                    filters: filters.clone(),
                    queue: tx.clone(),
                    cancel: cancel.clone(),
                },
            );
        }
        tokio::spawn(run_sender(sub_id, rx, cancel.clone(), self.out.clone()));
        spawn_backfill(store, filters, tx, cancel);
    }

    /// Drop a subscription. Idempotent.
    pub fn unsubscribe(&self, sub_id: &str) {
        if let Some(sub) = self.subs.lock().unwrap().remove(sub_id) {
            sub.cancel();
        }
    }

    /// Route a newly accepted event to every interested subscription.
    pub fn dispatch(&self, ev: &Event) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        for sub in self.subs.lock().unwrap().values() {
            sub.offer(ev);
        }
    }

    /// Cancel every subscription. The flag flips at most once; later calls
    /// are no-ops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for (_, sub) in self.subs.lock().unwrap().drain() {
            sub.cancel();
        }
    }

    #[cfg(test)]
    pub fn subscription_count(&self) -> usize {
        self.subs.lock().unwrap().len()
    }
}

/// Forward queued items to the client's outbound channel in receive order.
/// The `Eose` item turns into a single EOSE frame; live events keep flowing
/// after it.
async fn run_sender(
    sub_id: String,
    mut rx: mpsc::Receiver<SubItem>,
    cancel: CancellationToken,
    out: mpsc::Sender<String>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            item = rx.recv() => match item {
                Some(SubItem::Event(ev)) => {
                    if out.send(proto::event_frame(&sub_id, &ev)).await.is_err() {
                        break;
                    }
                }
                Some(SubItem::Eose) => {
                    if out.send(proto::eose_frame(&sub_id)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

/// Stream stored matches into the queue, then enqueue the end-of-stored
/// marker. A full queue suspends the scan; a cancelled subscription ends it
/// promptly.
fn spawn_backfill(
    store: Arc<dyn EventStore>,
    filters: Vec<Filter>,
    queue: mpsc::Sender<SubItem>,
    cancel: CancellationToken,
) {
    tokio::task::spawn_blocking(move || {
        let result = store.query(&filters, &mut |ev| {
            if cancel.is_cancelled() {
                return false;
            }
            queue.blocking_send(SubItem::Event(Box::new(ev))).is_ok()
        });
        if let Err(e) = result {
            warn!(error = %e, "historical query failed");
        }
        let _ = queue.blocking_send(SubItem::Eose);
    });
}
