//! A thread-safe blocking queue over any [`Scheduler`].
//!
//! [`BlockingScheduler`] pairs a scheduler with a mutex and a condition variable, so
//! producers and consumers on different threads can share one ordering policy
//! without a pool around it. Consumers block in [`pop`](BlockingScheduler::pop)
//! until an item arrives.

use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::scheduler::{FifoScheduler, LifoScheduler, PriorityScheduler, Scheduler};

/// A [`Scheduler`] guarded by a mutex, with blocking withdrawal.
///
/// All methods take `&self`; share it between threads through an `Arc`.
///
/// ```
/// use std::{sync::Arc, thread};
/// use taskpool::blocking::BlockingScheduler;
///
/// let queue = Arc::new(BlockingScheduler::<i32, _>::fifo());
/// let consumer = {
///     let queue = queue.clone();
///     thread::spawn(move || queue.pop())
/// };
/// queue.push(7);
/// assert_eq!(consumer.join().unwrap(), 7);
/// ```
pub struct BlockingScheduler<T, S: Scheduler<T>> {
    inner: Mutex<Inner<S>>,
    not_empty: Condvar,
    _item: std::marker::PhantomData<fn(T) -> T>,
}

struct Inner<S> {
    scheduler: S,
    waiting: usize,
}

impl<T> BlockingScheduler<T, FifoScheduler<T>> {
    /// Creates an empty queue that yields items in push order.
    pub fn fifo() -> Self {
        Self::new(FifoScheduler::new())
    }
}

impl<T> BlockingScheduler<T, LifoScheduler<T>> {
    /// Creates an empty queue that yields the most recently pushed item first.
    pub fn lifo() -> Self {
        Self::new(LifoScheduler::new())
    }
}

impl<T: Ord> BlockingScheduler<T, PriorityScheduler<T>> {
    /// Creates an empty queue that yields the greatest item first.
    pub fn priority() -> Self {
        Self::new(PriorityScheduler::new())
    }
}

impl<T, S: Scheduler<T>> BlockingScheduler<T, S> {
    /// Wraps an existing scheduler. Items it already holds are available to `pop`.
    pub fn new(scheduler: S) -> Self {
        BlockingScheduler {
            inner: Mutex::new(Inner {
                scheduler,
                waiting: 0,
            }),
            not_empty: Condvar::new(),
            _item: std::marker::PhantomData,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts an item and wakes one blocked consumer, if any.
    pub fn push(&self, item: T) {
        let mut inner = self.lock();
        inner.scheduler.push(item);
        let wake = inner.waiting > 0;
        drop(inner);
        if wake {
            self.not_empty.notify_one();
        }
    }

    /// Blocks until an item is available and withdraws it.
    pub fn pop(&self) -> T {
        let mut inner = self.lock();
        loop {
            if let Some(item) = inner.scheduler.withdraw() {
                return item;
            }
            inner.waiting += 1;
            inner = self
                .not_empty
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
            inner.waiting -= 1;
        }
    }

    /// Like [`pop`](Self::pop), but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if let Some(item) = inner.scheduler.withdraw() {
                return Some(item);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            inner.waiting += 1;
            let (guard, _) = self
                .not_empty
                .wait_timeout(inner, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
            inner.waiting -= 1;
        }
    }

    /// Withdraws an item if one is available, without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().scheduler.withdraw()
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.lock().scheduler.len()
    }

    /// Returns `true` if no item is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().scheduler.is_empty()
    }
}
