//! Worker threads and the registry that joins them.
//!
//! A worker moves through `Spawned → Running ⇄ Waiting → Retiring → Joined`:
//!
//! - it repeatedly asks the pool to execute one task ([`PoolShared::execute_one`]),
//!   waiting inside that call while the queue is empty;
//! - when the queue is empty and the pool has more active workers than its target,
//!   the worker gives up its slot and *retires*: it moves its own `JoinHandle` from
//!   the live set into the retired set and signals shutdown progress;
//! - the pool joins retired workers later (on `resize` or `shutdown`). A thread
//!   never joins itself.

use std::{
    cell::Cell,
    collections::HashMap,
    io,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use crate::pool::{PoolShared, WorkerStep};

thread_local! {
    /// Address of the `PoolShared` the current thread works for, or 0.
    static CURRENT_POOL: Cell<usize> = const { Cell::new(0) };
}

/// Returns `true` if the calling thread is one of `shared`'s workers.
pub(crate) fn is_current_worker(shared: &Arc<PoolShared>) -> bool {
    CURRENT_POOL.with(|current| current.get() == Arc::as_ptr(shared) as usize)
}

/// Starts a worker thread. The caller must register the returned handle before
/// releasing the pool state lock.
pub(crate) fn spawn(shared: Arc<PoolShared>, id: usize) -> io::Result<JoinHandle<()>> {
    let mut builder = thread::Builder::new();
    if let Some(name) = shared.config().thread_name(id) {
        builder = builder.name(name);
    }
    if let Some(stack_size) = shared.config().stack_size {
        builder = builder.stack_size(stack_size);
    }
    builder.spawn(move || run(shared, id))
}

fn run(shared: Arc<PoolShared>, id: usize) {
    CURRENT_POOL.with(|current| current.set(Arc::as_ptr(&shared) as usize));
    log::debug!("worker {id} started");

    let mut executed = 0u64;
    while let WorkerStep::Executed = shared.execute_one() {
        executed += 1;
    }

    log::debug!("worker {id} retiring after {executed} tasks");
    shared.workers().retire(id);
    CURRENT_POOL.with(|current| current.set(0));
}

#[derive(Default)]
struct Registry {
    live: HashMap<usize, JoinHandle<()>>,
    retired: Vec<(usize, JoinHandle<()>)>,
    /// Callers of `join_retired` currently joining handles they took out.
    joining: usize,
}

/// Handles of running and retired workers, with the shutdown-progress condition.
///
/// Guarded by its own mutex so that waiting for shutdown never blocks submission.
/// Lock order: pool state, then this registry.
#[derive(Default)]
pub(crate) struct WorkerSet {
    registry: Mutex<Registry>,
    progress: Condvar,
}

impl WorkerSet {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register(&self, id: usize, handle: JoinHandle<()>) {
        let prev = self.lock().live.insert(id, handle);
        debug_assert!(prev.is_none(), "worker {id} registered twice");
    }

    /// Called by worker `id` on its own thread once it has given up its slot.
    fn retire(&self, id: usize) {
        let mut registry = self.lock();
        if let Some(handle) = registry.live.remove(&id) {
            registry.retired.push((id, handle));
        }
        drop(registry);
        self.progress.notify_all();
    }

    /// Blocks until no worker is live and no other caller is still joining
    /// handles it took from the retired set. Only meaningful once the target is zero.
    pub(crate) fn wait_all_retired(&self) {
        let registry = self.lock();
        let _registry = self
            .progress
            .wait_while(registry, |r| !r.live.is_empty() || r.joining > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Joins every retired worker outside the registry lock. Returns how many were joined.
    ///
    /// The handles leave the registry before they are joined; `joining` stays raised
    /// until they are, so [`wait_all_retired`](Self::wait_all_retired) cannot return
    /// in between.
    pub(crate) fn join_retired(&self) -> usize {
        let retired = {
            let mut registry = self.lock();
            if registry.retired.is_empty() {
                return 0;
            }
            registry.joining += 1;
            std::mem::take(&mut registry.retired)
        };

        let count = retired.len();
        for (id, handle) in retired {
            if handle.join().is_err() {
                log::warn!("worker {id} terminated abnormally");
            } else {
                log::debug!("worker {id} joined");
            }
        }

        self.lock().joining -= 1;
        self.progress.notify_all();
        count
    }

    #[cfg(test)]
    pub(crate) fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    pub(crate) fn retired_count(&self) -> usize {
        self.lock().retired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_retire_moves_handle() {
        let set = WorkerSet::default();
        set.register(1, thread::spawn(|| {}));
        set.register(2, thread::spawn(|| {}));
        assert_eq!(set.live_count(), 2);

        set.retire(1);
        assert_eq!(set.live_count(), 1);
        assert_eq!(set.retired_count(), 1);
        assert_eq!(set.join_retired(), 1);
        assert_eq!(set.retired_count(), 0);

        set.retire(2);
        set.wait_all_retired();
        assert_eq!(set.join_retired(), 1);
    }

    #[test]
    fn test_wait_all_retired_blocks_until_last_retires() {
        let set = Arc::new(WorkerSet::default());
        set.register(7, thread::spawn(|| {}));

        let retirer = {
            let set = set.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                set.retire(7);
            })
        };
        set.wait_all_retired();
        assert_eq!(set.live_count(), 0);
        assert_eq!(set.join_retired(), 1);
        retirer.join().unwrap();
    }

    #[test]
    fn test_wait_all_retired_waits_for_joins_in_progress() {
        let set = Arc::new(WorkerSet::default());
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        set.register(
            3,
            thread::spawn(move || {
                let _ = release_rx.recv();
            }),
        );
        set.retire(3);

        // Takes the handle and blocks in `join` until the thread is released.
        let joiner = {
            let set = set.clone();
            thread::spawn(move || set.join_retired())
        };
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while set.retired_count() != 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(set.retired_count(), 0);
        assert_eq!(set.live_count(), 0);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let waiter = {
            let set = set.clone();
            thread::spawn(move || {
                set.wait_all_retired();
                done_tx.send(()).unwrap();
            })
        };
        assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());

        release_tx.send(()).unwrap();
        assert_eq!(joiner.join().unwrap(), 1);
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
        assert_eq!(set.join_retired(), 0);
    }

    #[test]
    fn test_unknown_retire_is_ignored() {
        let set = WorkerSet::default();
        set.retire(42);
        assert_eq!(set.retired_count(), 0);
    }
}
