//! The unit of work stored in a pool's scheduler.

use std::{
    any::Any,
    cmp::Ordering,
    panic::{self, AssertUnwindSafe},
};

use taskpool_common::error::TaskError;

use crate::{handle::TaskHandle, oneshot};

/// How the work inside an envelope ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed,
    Panicked,
}

type WorkFn = Box<dyn FnOnce() -> TaskOutcome + Send + 'static>;

/// Binds a unit of work to its ordering key and its result sink.
///
/// The result sink is captured inside `work`. Running the envelope writes the
/// outcome to the sink exactly once; dropping it unrun closes the sink, which the
/// submitter observes as [`TaskError::NotExecuted`].
///
/// Envelopes order by `(priority, sequence)`, which is what
/// [`PriorityScheduler`](crate::scheduler::PriorityScheduler) relies on.
pub struct TaskEnvelope {
    priority: i64,
    sequence: u64,
    work: WorkFn,
}

impl TaskEnvelope {
    /// Wraps a callable producing `Result<R, TaskError>` and returns the envelope
    /// together with the handle observing its result.
    pub(crate) fn with_handle<F, R>(priority: i64, sequence: u64, f: F) -> (Self, TaskHandle<R>)
    where
        F: FnOnce() -> Result<R, TaskError> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<R, TaskError>>();
        let work = move || {
            let (result, outcome) = match panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(Ok(value)) => (Ok(value), TaskOutcome::Completed),
                Ok(Err(e)) => (Err(e), TaskOutcome::Failed),
                Err(payload) => (
                    Err(TaskError::Panicked {
                        message: panic_message(payload.as_ref()),
                    }),
                    TaskOutcome::Panicked,
                ),
            };
            // The submitter may have dropped its handle.
            let _ = tx.send(result);
            outcome
        };
        let envelope = TaskEnvelope {
            priority,
            sequence,
            work: Box::new(work),
        };
        (envelope, TaskHandle::new(rx, priority, sequence))
    }

    /// Wraps a callable whose result nobody observes.
    pub(crate) fn detached<F>(priority: i64, sequence: u64, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let work = move || match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(()) => TaskOutcome::Completed,
            Err(payload) => {
                log::warn!(
                    "detached task #{sequence} panicked: {}",
                    panic_message(payload.as_ref())
                );
                TaskOutcome::Panicked
            }
        };
        TaskEnvelope {
            priority,
            sequence,
            work: Box::new(work),
        }
    }

    /// The ordering key given at submission.
    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// The admission sequence number; unique within a pool.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Runs the work on the current thread. Panics never escape this call.
    pub fn run(self) -> TaskOutcome {
        (self.work)()
    }
}

impl std::fmt::Debug for TaskEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEnvelope")
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl PartialEq for TaskEnvelope {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TaskEnvelope {}

impl PartialOrd for TaskEnvelope {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TaskEnvelope {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl TaskEnvelope {
    #[inline]
    fn key(&self) -> (i64, u64) {
        (self.priority, self.sequence)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::TaskPoll;

    #[test]
    fn test_run_delivers_value() {
        let (envelope, handle) = TaskEnvelope::with_handle(0, 1, || Ok(21 * 2));
        assert!(!handle.is_ready());
        assert_eq!(envelope.run(), TaskOutcome::Completed);
        assert_eq!(handle.get().unwrap(), 42);
    }

    #[test]
    fn test_run_captures_panic() {
        let (envelope, handle) =
            TaskEnvelope::with_handle(0, 1, || -> Result<u32, TaskError> { panic!("boom") });
        assert_eq!(envelope.run(), TaskOutcome::Panicked);
        match handle.get() {
            Err(TaskError::Panicked { message }) => assert_eq!(message, "boom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_run_reports_failure() {
        let (envelope, handle) = TaskEnvelope::with_handle(0, 1, || -> Result<u32, TaskError> {
            Err(TaskError::failed("bad input"))
        });
        assert_eq!(envelope.run(), TaskOutcome::Failed);
        assert!(matches!(handle.get(), Err(TaskError::Failed { .. })));
    }

    #[test]
    fn test_dropped_envelope_resolves_not_executed() {
        let (envelope, mut handle) = TaskEnvelope::with_handle(0, 1, || Ok(()));
        assert!(matches!(handle.poll(), TaskPoll::Pending));
        drop(envelope);
        assert!(matches!(handle.get(), Err(TaskError::NotExecuted)));
    }

    #[test]
    fn test_ordering_by_priority_then_sequence() {
        let a = TaskEnvelope::detached(5, 2, || {});
        let b = TaskEnvelope::detached(5, 3, || {});
        let c = TaskEnvelope::detached(7, 1, || {});
        assert!(b > a);
        assert!(c > b);
        assert_eq!(c.priority(), 7);
        assert_eq!(a.sequence(), 2);
    }

    #[test]
    fn test_panic_message_formats() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(17u8);
        assert_eq!(panic_message(payload.as_ref()), "<non-string panic payload>");
    }
}
