//! Ordering policies for pending work.
//!
//! A [`Scheduler`] decides which pending item is withdrawn next. Three policies are
//! provided:
//!
//! - [`FifoScheduler`]: admission order
//! - [`LifoScheduler`]: reverse admission order
//! - [`PriorityScheduler`]: descending by the item's [`Ord`]
//!
//! Schedulers are plain containers without any synchronization of their own; the
//! pool only touches its scheduler while holding its state mutex. For a standalone
//! thread-safe queue over a scheduler, see [`crate::blocking::BlockingScheduler`].
//!
//! All schedulers move items in and out, so items need not be `Clone`.

use std::{
    collections::{BinaryHeap, VecDeque},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use taskpool_common::error::Error;

/// An ordering policy over pending items.
pub trait Scheduler<T> {
    /// Inserts an item.
    fn push(&mut self, item: T);

    /// Removes and returns the next item according to the policy, or `None` when
    /// the scheduler is empty.
    fn withdraw(&mut self) -> Option<T>;

    /// Number of pending items.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all pending items, in no particular order.
    fn drain(&mut self) -> Vec<T>;
}

/// Withdraws items in the order they were pushed.
#[derive(Debug)]
pub struct FifoScheduler<T>(VecDeque<T>);

impl<T> FifoScheduler<T> {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        FifoScheduler(VecDeque::new())
    }
}

impl<T> Default for FifoScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> for FifoScheduler<T> {
    fn push(&mut self, item: T) {
        self.0.push_back(item);
    }

    fn withdraw(&mut self) -> Option<T> {
        self.0.pop_front()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn drain(&mut self) -> Vec<T> {
        self.0.drain(..).collect()
    }
}

/// Withdraws the most recently pushed item first.
#[derive(Debug)]
pub struct LifoScheduler<T>(VecDeque<T>);

impl<T> LifoScheduler<T> {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        LifoScheduler(VecDeque::new())
    }
}

impl<T> Default for LifoScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> for LifoScheduler<T> {
    fn push(&mut self, item: T) {
        self.0.push_back(item);
    }

    fn withdraw(&mut self) -> Option<T> {
        self.0.pop_back()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn drain(&mut self) -> Vec<T> {
        self.0.drain(..).collect()
    }
}

/// Withdraws the greatest item first (a max-heap).
///
/// For task envelopes the order is `(priority, sequence)` compared lexicographically:
/// a higher priority wins, and among equal priorities the envelope submitted *later*
/// wins. Equal-priority work therefore runs in LIFO order, not FIFO. Callers that need
/// FIFO behavior within a priority level must encode it into the priority itself.
#[derive(Debug)]
pub struct PriorityScheduler<T: Ord>(BinaryHeap<T>);

impl<T: Ord> PriorityScheduler<T> {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        PriorityScheduler(BinaryHeap::new())
    }
}

impl<T: Ord> Default for PriorityScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord> Scheduler<T> for PriorityScheduler<T> {
    fn push(&mut self, item: T) {
        self.0.push(item);
    }

    fn withdraw(&mut self) -> Option<T> {
        self.0.pop()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn drain(&mut self) -> Vec<T> {
        self.0.drain().collect()
    }
}

/// Selects the scheduler a pool is constructed with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingPolicy {
    /// Arrival order.
    #[default]
    Fifo,
    /// Reverse arrival order.
    Lifo,
    /// Highest priority first; later submissions first among equal priorities.
    Priority,
}

impl SchedulingPolicy {
    /// Every policy, in declaration order.
    pub const ALL: [SchedulingPolicy; 3] = [
        SchedulingPolicy::Fifo,
        SchedulingPolicy::Lifo,
        SchedulingPolicy::Priority,
    ];

    /// Creates an empty scheduler implementing this policy.
    pub fn create_scheduler<T>(self) -> Box<dyn Scheduler<T> + Send>
    where
        T: Ord + Send + 'static,
    {
        match self {
            SchedulingPolicy::Fifo => Box::new(FifoScheduler::new()),
            SchedulingPolicy::Lifo => Box::new(LifoScheduler::new()),
            SchedulingPolicy::Priority => Box::new(PriorityScheduler::new()),
        }
    }

    /// The lowercase name used in configuration files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulingPolicy::Fifo => "fifo",
            SchedulingPolicy::Lifo => "lifo",
            SchedulingPolicy::Priority => "priority",
        }
    }
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(SchedulingPolicy::Fifo),
            "lifo" => Ok(SchedulingPolicy::Lifo),
            "priority" => Ok(SchedulingPolicy::Priority),
            _ => Err(Error::invalid_arg(
                "policy",
                format!("unknown scheduling policy '{s}' (expected fifo, lifo or priority)"),
            )),
        }
    }
}
