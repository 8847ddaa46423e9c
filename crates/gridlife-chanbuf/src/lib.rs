//! Queueing and rate-limiting primitives that buffer a supply of data
//! without ever blocking the producer.
//!
//! A [`Queue`] accumulates values from one or more producers and hands
//! everything accumulated so far to a consumer in a single [`Queue::get`]
//! call. The different implementations only differ in what they retain:
//! everything ([`unlimited`]), the first n values ([`limit`]), the last n
//! values ([`ring`]), or nothing beyond the fact that something arrived
//! ([`trigger`]).
//!
//! [`rate_limited`] and [`tick`] drain a queue onto a channel no faster than
//! a configured interval, which is how bursty update streams are collapsed
//! for slow consumers such as a terminal renderer.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crossfire::mpmc;
use crossfire::MRx;

/// A producer-side handle plus a blocking consumer side.
///
/// `put` never blocks. `get` blocks until at least one value is available
/// (or the queue is closed) and drains everything retained so far. Calling
/// `put` after `done` is a programming error and panics.
pub trait Queue<T>: Send + Sync {
    /// Add a value to the queue. Guaranteed not to block.
    fn put(&self, value: T);

    /// Block until values are available, then drain them. Returns `None`
    /// once the queue is closed and empty.
    fn get(&self) -> Option<Vec<T>>;

    /// Signal that no further values will be added.
    fn done(&self);
}

struct BoundedState<T> {
    values: Vec<T>,
    done: bool,
}

/// Retains the first `limit` values between drains; the rest are discarded.
pub struct LimitQueue<T> {
    state: Mutex<BoundedState<T>>,
    cond: Condvar,
    limit: Option<usize>,
}

impl<T> LimitQueue<T> {
    fn with_limit(limit: Option<usize>) -> Self {
        Self {
            state: Mutex::new(BoundedState {
                values: Vec::new(),
                done: false,
            }),
            cond: Condvar::new(),
            limit,
        }
    }
}

/// Creates a queue that retains the first `size` values between drains.
/// A size of 0 discards everything.
#[must_use]
pub fn limit<T: Send>(size: usize) -> Arc<LimitQueue<T>> {
    Arc::new(LimitQueue::with_limit(Some(size)))
}

/// Creates a queue with no retention bound.
#[must_use]
pub fn unlimited<T: Send>() -> Arc<LimitQueue<T>> {
    Arc::new(LimitQueue::with_limit(None))
}

/// Creates a queue that drops every value. `get` blocks until `done`.
/// To drop values while still waking consumers, see [`trigger`].
#[must_use]
pub fn discard<T: Send>() -> Arc<LimitQueue<T>> {
    limit(0)
}

impl<T: Send> Queue<T> for LimitQueue<T> {
    fn put(&self, value: T) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        assert!(!state.done, "put called after done");
        if self.limit.is_none_or(|n| state.values.len() < n) {
            state.values.push(value);
            self.cond.notify_one();
        }
    }

    fn get(&self) -> Option<Vec<T>> {
        let mut state = self.state.lock().expect("queue lock poisoned");
        while state.values.is_empty() && !state.done {
            state = self.cond.wait(state).expect("queue lock poisoned");
        }
        if state.values.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut state.values))
    }

    fn done(&self) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        state.done = true;
        self.cond.notify_all();
    }
}

struct RingState<T> {
    values: VecDeque<T>,
    done: bool,
}

/// Retains the last `size` values between drains, overwriting the oldest.
pub struct RingQueue<T> {
    state: Mutex<RingState<T>>,
    cond: Condvar,
    size: usize,
}

/// Creates a queue that retains only the last `size` values.
#[must_use]
pub fn ring<T: Send>(size: usize) -> Arc<RingQueue<T>> {
    assert!(size > 0, "ring size must be positive");
    Arc::new(RingQueue {
        state: Mutex::new(RingState {
            values: VecDeque::with_capacity(size),
            done: false,
        }),
        cond: Condvar::new(),
        size,
    })
}

impl<T: Send> Queue<T> for RingQueue<T> {
    fn put(&self, value: T) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        assert!(!state.done, "put called after done");
        if state.values.len() == self.size {
            state.values.pop_front();
        }
        state.values.push_back(value);
        self.cond.notify_one();
    }

    fn get(&self) -> Option<Vec<T>> {
        let mut state = self.state.lock().expect("queue lock poisoned");
        while state.values.is_empty() && !state.done {
            state = self.cond.wait(state).expect("queue lock poisoned");
        }
        if state.values.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut state.values).into_iter().collect())
    }

    fn done(&self) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        state.done = true;
        self.cond.notify_all();
    }
}

/// Retains no values; `get` yields an empty batch if `put` was called any
/// number of times since the last drain.
pub struct TriggerQueue {
    state: Mutex<(bool, bool)>, // (triggered, done)
    cond: Condvar,
}

/// Creates a trigger queue.
#[must_use]
pub fn trigger() -> Arc<TriggerQueue> {
    Arc::new(TriggerQueue {
        state: Mutex::new((false, false)),
        cond: Condvar::new(),
    })
}

impl<T: Send> Queue<T> for TriggerQueue {
    fn put(&self, _value: T) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        assert!(!state.1, "put called after done");
        state.0 = true;
        self.cond.notify_one();
    }

    fn get(&self) -> Option<Vec<T>> {
        let mut state = self.state.lock().expect("queue lock poisoned");
        while !state.0 && !state.1 {
            state = self.cond.wait(state).expect("queue lock poisoned");
        }
        if !state.0 {
            return None;
        }
        state.0 = false;
        Some(Vec::new())
    }

    fn done(&self) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        state.1 = true;
        self.cond.notify_all();
    }
}

/// Calls `queue.put` for every value received from `source`, and `done`
/// once the channel disconnects.
pub fn feed<T, Q: Queue<T> + ?Sized>(queue: &Q, source: &MRx<T>) {
    while let Ok(value) = source.recv() {
        queue.put(value);
    }
    queue.done();
}

/// Drains `source` onto the returned channel, sleeping at least `min`
/// between deliveries. The channel closes when the queue is exhausted.
pub fn rate_limited<T, Q>(source: Arc<Q>, min: Duration) -> MRx<Vec<T>>
where
    T: Send + Unpin + 'static,
    Q: Queue<T> + 'static,
{
    let (tx, rx) = mpmc::unbounded_blocking();
    thread::spawn(move || {
        while let Some(values) = source.get() {
            if tx.send(values).is_err() {
                return;
            }
            thread::sleep(min);
        }
    });
    rx
}

/// Delivers accumulated values from `source` once per `interval`. When
/// `always` is set, an empty batch is sent for intervals in which nothing
/// arrived. The channel closes once the queue is exhausted.
pub fn tick<T, Q>(source: Arc<Q>, interval: Duration, always: bool) -> MRx<Vec<T>>
where
    T: Send + Unpin + 'static,
    Q: Queue<T> + 'static,
{
    let (tx, rx) = mpmc::unbounded_blocking();
    let pending: Arc<Mutex<TickState<T>>> = Arc::new(Mutex::new(TickState {
        values: None,
        open: true,
    }));

    let fetch_pending = Arc::clone(&pending);
    thread::spawn(move || loop {
        match source.get() {
            Some(mut values) => {
                let mut state = fetch_pending.lock().expect("tick lock poisoned");
                match state.values.as_mut() {
                    Some(existing) => existing.append(&mut values),
                    None => state.values = Some(values),
                }
            }
            None => {
                fetch_pending.lock().expect("tick lock poisoned").open = false;
                return;
            }
        }
    });

    thread::spawn(move || loop {
        thread::sleep(interval);
        let (values, open) = {
            let mut state = pending.lock().expect("tick lock poisoned");
            (state.values.take(), state.open)
        };
        match values {
            Some(values) => {
                if tx.send(values).is_err() {
                    return;
                }
            }
            None if !open => return,
            None if always => {
                if tx.send(Vec::new()).is_err() {
                    return;
                }
            }
            None => {}
        }
    });

    rx
}

struct TickState<T> {
    values: Option<Vec<T>>,
    open: bool,
}
