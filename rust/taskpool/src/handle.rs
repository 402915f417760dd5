//! Handles for retrieving the results of submitted tasks.
//!
//! A [`TaskHandle`] is returned by every `submit*` call before the task runs. It
//! resolves exactly once, to one of:
//!
//! - `Ok(value)`: the callable returned normally
//! - `Err(TaskError::Panicked { .. })` or `Err(TaskError::Failed { .. })`: the callable failed
//! - `Err(TaskError::NotExecuted)`: the pool shut down before the task was withdrawn
//!
//! Reading a handle again after its result was delivered yields
//! `Err(TaskError::AlreadyRetrieved)`.

use std::time::Duration;

use taskpool_common::error::TaskError;

use crate::oneshot::{self, Received, ResultReceiver};

/// Outcome of a non-blocking look at a [`TaskHandle`].
#[derive(Debug)]
pub enum TaskPoll<R> {
    /// The task has not finished (it may still be queued or running).
    Pending,
    /// The task resolved; the result is handed over to the caller.
    Ready(Result<R, TaskError>),
}

impl<R> TaskPoll<R> {
    /// Returns `true` if the task has not resolved yet.
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskPoll::Pending)
    }

    /// Converts into the result, or `None` while pending.
    pub fn ready(self) -> Option<Result<R, TaskError>> {
        match self {
            TaskPoll::Pending => None,
            TaskPoll::Ready(res) => Some(res),
        }
    }
}

/// The read side of a task's result sink.
///
/// ## Lifecycle
///
/// 1. **Created**: returned by `submit`, before the task runs
/// 2. **Pending**: the task is queued or running
/// 3. **Ready**: the task resolved (value, failure, or not executed)
/// 4. **Consumed**: the result was taken via [`get`](Self::get),
///    [`poll`](Self::poll) or [`wait_timeout`](Self::wait_timeout)
pub struct TaskHandle<R> {
    rx: ResultReceiver<Result<R, TaskError>>,
    priority: i64,
    sequence: u64,
}

impl<R> TaskHandle<R> {
    pub(crate) fn new(
        rx: ResultReceiver<Result<R, TaskError>>,
        priority: i64,
        sequence: u64,
    ) -> TaskHandle<R> {
        TaskHandle {
            rx,
            priority,
            sequence,
        }
    }

    /// Creates a handle that is already resolved with `value`.
    pub fn ready(value: R) -> Self {
        TaskHandle {
            rx: oneshot::ready(Ok(value)),
            priority: 0,
            sequence: 0,
        }
    }

    /// The admission sequence number the pool assigned to this task.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The priority the task was submitted with.
    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Returns `true` once the result is available (or was already taken).
    pub fn is_ready(&self) -> bool {
        !self.rx.is_pending()
    }

    /// Blocks until the task resolves and returns its result.
    pub fn get(self) -> Result<R, TaskError> {
        Self::resolve(self.rx.recv())
    }

    /// Takes the result if it is available, without blocking.
    pub fn poll(&mut self) -> TaskPoll<R> {
        match self.rx.try_recv() {
            Some(received) => TaskPoll::Ready(Self::resolve(received)),
            None => TaskPoll::Pending,
        }
    }

    /// Waits at most `timeout` for the result. Timing out does not cancel the task.
    pub fn wait_timeout(&mut self, timeout: Duration) -> TaskPoll<R> {
        match self.rx.recv_timeout(timeout) {
            Some(received) => TaskPoll::Ready(Self::resolve(received)),
            None => TaskPoll::Pending,
        }
    }

    /// Waits for every handle and collects the results in input order.
    pub fn get_all(handles: impl IntoIterator<Item = TaskHandle<R>>) -> Vec<Result<R, TaskError>> {
        handles.into_iter().map(|h| h.get()).collect()
    }

    fn resolve(received: Received<Result<R, TaskError>>) -> Result<R, TaskError> {
        match received {
            Received::Value(res) => res,
            Received::Closed => Err(TaskError::NotExecuted),
            Received::Consumed => Err(TaskError::AlreadyRetrieved),
        }
    }
}

impl<R> std::fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_ready_handle() {
        let handle = TaskHandle::ready(5);
        assert!(handle.is_ready());
        assert_eq!(handle.get().unwrap(), 5);
    }

    #[test]
    fn test_poll_then_already_retrieved() {
        let (tx, rx) = oneshot::channel();
        let mut handle = TaskHandle::<u8>::new(rx, 1, 9);
        assert!(handle.poll().is_pending());
        tx.send(Ok(3)).unwrap();
        assert_eq!(handle.poll().ready().unwrap().unwrap(), 3);
        assert!(matches!(
            handle.poll(),
            TaskPoll::Ready(Err(TaskError::AlreadyRetrieved))
        ));
        assert_eq!(handle.sequence(), 9);
        assert_eq!(handle.priority(), 1);
    }

    #[test]
    fn test_wait_timeout_does_not_consume_pending() {
        let (tx, rx) = oneshot::channel();
        let mut handle = TaskHandle::<&str>::new(rx, 0, 1);
        assert!(handle.wait_timeout(Duration::from_millis(5)).is_pending());
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let _ = tx.send(Ok("late"));
        });
        match handle.wait_timeout(Duration::from_secs(5)) {
            TaskPoll::Ready(Ok(v)) => assert_eq!(v, "late"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_get_all_preserves_order() {
        let handles = (0..4).map(TaskHandle::ready);
        let results: Vec<_> = TaskHandle::get_all(handles)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(results, vec![0, 1, 2, 3]);
    }
}
