//! Change notifications emitted by the grid.
//!
//! Every world mutation produces one batch of [`Update`]s. Batches are
//! pushed onto an unbounded ordered queue while the cell lock is held and a
//! dedicated bus thread fans them out to subscriber channels, so mutators
//! never block on slow consumers and every subscriber observes the same
//! causal order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossfire::mpmc;
use crossfire::{MRx, MTx};
use gridlife_chanbuf::{self as chanbuf, LimitQueue, Queue};
use tracing::trace;

use crate::occupant::Occupant;

/// A value located at specific coordinates, as carried by notifications and
/// snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub value: Occupant,
}

impl Point {
    /// Creates a point.
    #[must_use]
    pub fn new(x: i32, y: i32, value: Occupant) -> Self {
        Self { x, y, value }
    }
}

/// One grid mutation. The kind is derivable from which sides are present
/// and whether the coordinates differ.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub old: Option<Point>,
    pub new: Option<Point>,
}

impl Update {
    /// An occupant appeared in a previously empty cell.
    #[must_use]
    pub fn added(new: Point) -> Self {
        Self {
            old: None,
            new: Some(new),
        }
    }

    /// An occupant left the grid.
    #[must_use]
    pub fn removed(old: Point) -> Self {
        Self {
            old: Some(old),
            new: None,
        }
    }

    /// An occupant moved between cells.
    #[must_use]
    pub fn moved(old: Point, new: Point) -> Self {
        Self {
            old: Some(old),
            new: Some(new),
        }
    }

    /// An occupant was swapped for another in place.
    #[must_use]
    pub fn replaced(old: Point, new: Point) -> Self {
        Self {
            old: Some(old),
            new: Some(new),
        }
    }

    #[must_use]
    pub fn is_add(&self) -> bool {
        self.old.is_none() && self.new.is_some()
    }

    #[must_use]
    pub fn is_remove(&self) -> bool {
        self.old.is_some() && self.new.is_none()
    }

    #[must_use]
    pub fn is_move(&self) -> bool {
        match (&self.old, &self.new) {
            (Some(old), Some(new)) => old.x != new.x || old.y != new.y,
            _ => false,
        }
    }

    #[must_use]
    pub fn is_replace(&self) -> bool {
        match (&self.old, &self.new) {
            (Some(old), Some(new)) => old.x == new.x && old.y == new.y && old.value != new.value,
            _ => false,
        }
    }
}

/// Updates emitted within one grid critical section, delivered atomically.
pub type UpdateBatch = Vec<Update>;

/// Receiving side of a bus subscription.
pub type UpdateRx = MRx<UpdateBatch>;

/// Identifies a subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct SubscriberTable {
    next_id: u64,
    entries: Vec<(u64, MTx<UpdateBatch>)>,
}

/// One queued batch plus the subscribers registered when it was emitted.
/// Snapshotting recipients at publish time means a subscriber only ever
/// observes mutations that happened after it subscribed.
struct Delivery {
    batch: UpdateBatch,
    recipients: Vec<MTx<UpdateBatch>>,
}

/// The ordered fan-out bus behind a grid.
pub(crate) struct UpdateBus {
    queue: Arc<LimitQueue<Delivery>>,
    subscribers: Arc<Mutex<SubscriberTable>>,
    closed: AtomicBool,
}

impl UpdateBus {
    pub(crate) fn new() -> Self {
        let queue = chanbuf::unlimited();
        let subscribers = Arc::new(Mutex::new(SubscriberTable {
            next_id: 0,
            entries: Vec::new(),
        }));

        let source: Arc<LimitQueue<Delivery>> = Arc::clone(&queue);
        let table = Arc::clone(&subscribers);
        thread::Builder::new()
            .name("update-bus".into())
            .spawn(move || loop {
                match source.get() {
                    Some(deliveries) => {
                        for delivery in deliveries {
                            for tx in &delivery.recipients {
                                let _ = tx.send(delivery.batch.clone());
                            }
                        }
                    }
                    None => {
                        table.lock().expect("bus lock poisoned").entries.clear();
                        return;
                    }
                }
            })
            .expect("failed to spawn update bus thread");

        Self {
            queue,
            subscribers,
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueues a batch for delivery. Never blocks; a no-op after close.
    pub(crate) fn publish(&self, batch: UpdateBatch) {
        if batch.is_empty() {
            return;
        }
        // The subscriber lock also serializes against `close`, so the queue
        // can never be fed after it is marked done.
        let table = self.subscribers.lock().expect("bus lock poisoned");
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let recipients: Vec<MTx<UpdateBatch>> =
            table.entries.iter().map(|(_, tx)| tx.clone()).collect();
        if recipients.is_empty() {
            return;
        }
        trace!(target: "gridlife::grid", updates = batch.len(), "publishing batch");
        self.queue.put(Delivery { batch, recipients });
    }

    pub(crate) fn subscribe(&self) -> (SubscriptionId, UpdateRx) {
        let (tx, rx) = mpmc::unbounded_blocking();
        let mut table = self.subscribers.lock().expect("bus lock poisoned");
        let id = table.next_id;
        table.next_id += 1;
        table.entries.push((id, tx));
        (SubscriptionId(id), rx)
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) {
        let mut table = self.subscribers.lock().expect("bus lock poisoned");
        table.entries.retain(|(entry_id, _)| *entry_id != id.0);
    }

    /// Stops delivery after everything already queued has been fanned out.
    /// Subscriber channels disconnect once drained.
    pub(crate) fn close(&self) {
        let _table = self.subscribers.lock().expect("bus lock poisoned");
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.queue.done();
        }
    }
}

impl Drop for UpdateBus {
    fn drop(&mut self) {
        self.close();
    }
}
