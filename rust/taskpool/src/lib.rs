//! A resizable worker-thread pool with a pluggable admission order.
//!
//! A bounded set of worker threads pulls tasks from a shared scheduler, runs them and
//! delivers each outcome to the handle its submitter received.
//!
//! # Key Components
//!
//! - [`pool::TaskPool`] - submission, resize, shutdown and introspection
//! - [`scheduler`] - the [`Scheduler`](scheduler::Scheduler) trait with FIFO, LIFO
//!   and priority policies
//! - [`handle::TaskHandle`] - blocking, polling and timed retrieval of a task's result
//! - [`envelope::TaskEnvelope`] - a queued task with its ordering key and result sink
//! - [`oneshot`] - the single-assignment channel behind every handle
//! - [`blocking::BlockingScheduler`] - a standalone thread-safe queue over any scheduler
//! - [`config::PoolConfig`] - construction settings, loadable from JSON
//!
//! # Example
//!
//! ```rust,no_run
//! use taskpool::{SchedulingPolicy, TaskPool};
//!
//! let pool = TaskPool::new(4, SchedulingPolicy::Priority).unwrap();
//! let urgent = pool.submit_with_priority(|| "urgent", 10);
//! let routine = pool.submit(|| "routine");
//! assert_eq!(urgent.get().unwrap(), "urgent");
//! assert_eq!(routine.get().unwrap(), "routine");
//! pool.shutdown().unwrap();
//! ```

pub mod blocking;
pub mod config;
pub mod envelope;
pub mod handle;
pub mod oneshot;
pub mod pool;
pub mod scheduler;
mod worker;

pub use config::PoolConfig;
pub use handle::{TaskHandle, TaskPoll};
pub use pool::{PoolStats, TaskPool};
pub use scheduler::SchedulingPolicy;
pub use taskpool_common::{
    Result,
    error::{Error, ErrorKind, TaskError},
};
