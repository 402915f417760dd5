//! Single-assignment result channel between a task and its submitter.
//!
//! A [`ResultSender`] writes exactly one value, consuming itself in the process.
//! A [`ResultReceiver`] observes that value at most once. Unlike a plain channel,
//! the receiver can tell apart a sender that went away without sending
//! ([`Received::Closed`]) from a value that was already taken ([`Received::Consumed`]).
//!
//! ## Channel Lifecycle
//!
//! 1. Pending: waiting for the value
//! 2. Ready: the value was sent and is available
//! 3. Consumed: the value was taken by the receiver
//! 4. Closed: the sender was dropped without sending
//!
//! Both halves are `Send + Sync` when `T: Send`.

use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    time::Duration,
};

/// Creates a new result channel, returning the sender and receiver pair.
pub fn channel<T>() -> (ResultSender<T>, ResultReceiver<T>) {
    let cell = Arc::new(ResultCell::new(State::Pending));
    (ResultSender(cell.clone()), ResultReceiver(cell))
}

/// Creates a receiver that is already resolved with the given value.
pub fn ready<T>(value: T) -> ResultReceiver<T> {
    ResultReceiver(Arc::new(ResultCell::new(State::Ready(value))))
}

/// What a receiver observed when the channel was no longer pending.
#[derive(Debug, PartialEq, Eq)]
pub enum Received<T> {
    /// The sent value, handed over to this caller.
    Value(T),
    /// The sender was dropped before sending anything.
    Closed,
    /// The value has already been taken by an earlier receive.
    Consumed,
}

/// The writing half. Sending consumes it, so a value is written at most once.
pub struct ResultSender<T>(Arc<ResultCell<T>>);

impl<T> ResultSender<T> {
    /// Writes the value. Returns it back if the receiver can no longer observe it.
    pub fn send(self, value: T) -> Result<(), T> {
        self.0.set(value)
    }

    /// Returns `true` until a value is sent.
    pub fn is_pending(&self) -> bool {
        self.0.is_pending()
    }
}

impl<T> Drop for ResultSender<T> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// The reading half.
pub struct ResultReceiver<T>(Arc<ResultCell<T>>);

impl<T> ResultReceiver<T> {
    /// Blocks until the channel is no longer pending.
    pub fn recv(&self) -> Received<T> {
        self.0.wait()
    }

    /// Waits at most `timeout`. Returns `None` if the channel is still pending.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Received<T>> {
        self.0.wait_for(timeout)
    }

    /// Non-blocking receive. Returns `None` if the channel is still pending.
    pub fn try_recv(&self) -> Option<Received<T>> {
        self.0.try_take()
    }

    /// Returns `true` while no value was sent and the sender is alive.
    pub fn is_pending(&self) -> bool {
        self.0.is_pending()
    }
}

struct ResultCell<T> {
    state: Mutex<State<T>>,
    condvar: Condvar,
}

impl<T> ResultCell<T> {
    fn new(state: State<T>) -> ResultCell<T> {
        ResultCell {
            state: Mutex::new(state),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, value: T) -> Result<(), T> {
        let res = self.lock().set(value);
        self.condvar.notify_all();
        res
    }

    fn close(&self) {
        self.lock().close();
        self.condvar.notify_all();
    }

    fn is_pending(&self) -> bool {
        self.lock().is_pending()
    }

    fn try_take(&self) -> Option<Received<T>> {
        let mut guard = self.lock();
        (!guard.is_pending()).then(|| guard.take())
    }

    fn wait(&self) -> Received<T> {
        let guard = self.lock();
        self.condvar
            .wait_while(guard, |state| state.is_pending())
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn wait_for(&self, timeout: Duration) -> Option<Received<T>> {
        let guard = self.lock();
        let (mut guard, res) = self
            .condvar
            .wait_timeout_while(guard, timeout, |state| state.is_pending())
            .unwrap_or_else(PoisonError::into_inner);
        if res.timed_out() && guard.is_pending() {
            None
        } else {
            Some(guard.take())
        }
    }
}

/// Transitions:
/// - `Pending` -> `Ready(T)` on send
/// - `Pending` -> `Closed` when the sender is dropped unsent
/// - `Ready(T)` -> `Consumed` when the value is taken
enum State<T> {
    Pending,
    Ready(T),
    Consumed,
    Closed,
}

impl<T> State<T> {
    fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }

    fn set(&mut self, value: T) -> Result<(), T> {
        match self {
            State::Pending => {
                *self = State::Ready(value);
                Ok(())
            }
            State::Ready(_) | State::Consumed | State::Closed => Err(value),
        }
    }

    fn close(&mut self) {
        if self.is_pending() {
            *self = State::Closed;
        }
    }

    /// Must not be called while pending.
    fn take(&mut self) -> Received<T> {
        match self {
            State::Pending => unreachable!("take() on a pending result cell"),
            State::Closed => Received::Closed,
            State::Consumed => Received::Consumed,
            State::Ready(_) => match std::mem::replace(self, State::Consumed) {
                State::Ready(value) => Received::Value(value),
                _ => unreachable!(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::UnsafeCell, time::Duration};

    use super::{Received, ResultReceiver, ResultSender, channel, ready};

    #[test]
    fn test_result_channel_send_sync() {
        fn is_send_sync<T: Send + Sync>() {}

        fn test<T: Send>() {
            is_send_sync::<ResultReceiver<T>>();
            is_send_sync::<ResultSender<T>>();
        }

        test::<usize>();
        test::<UnsafeCell<usize>>();
    }

    #[test]
    fn test_send_then_consume() {
        let (tx, rx) = channel::<usize>();
        assert!(rx.is_pending());
        assert!(rx.try_recv().is_none());
        tx.send(7).unwrap();
        assert!(!rx.is_pending());
        assert_eq!(rx.recv(), Received::Value(7));
        assert_eq!(rx.recv(), Received::Consumed);
        assert_eq!(rx.try_recv(), Some(Received::Consumed));
    }

    #[test]
    fn test_cross_thread_send() {
        let (tx, rx) = channel::<usize>();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.send(1).unwrap();
        });
        assert_eq!(rx.recv(), Received::Value(1));
    }

    #[test]
    fn test_timeout_leaves_channel_pending() {
        let (tx, rx) = channel::<usize>();
        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            tx.send(1).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_millis(10)).is_none());
        assert!(rx.is_pending());
        assert_eq!(rx.recv(), Received::Value(1));
        sender.join().unwrap();
    }

    #[test]
    fn test_dropped_sender_closes() {
        let (tx, rx) = channel::<usize>();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            drop(tx);
        });
        assert_eq!(rx.recv(), Received::Closed);
        assert!(!rx.is_pending());
        assert_eq!(rx.recv(), Received::Closed);
    }

    #[test]
    fn test_ready_receiver() {
        let rx = ready("done");
        assert!(!rx.is_pending());
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(1)),
            Some(Received::Value("done"))
        );
    }
}
