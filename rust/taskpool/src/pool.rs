//! A resizable worker pool with a pluggable admission order.
//!
//! [`TaskPool`] owns a scheduler (see [`SchedulingPolicy`]), a set of worker threads
//! and the counters that tie them together. Callers submit callables and receive a
//! [`TaskHandle`] immediately; workers withdraw envelopes in policy order, run them
//! outside any lock and deliver the outcome to the handle.
//!
//! ## Synchronization
//!
//! One mutex guards the scheduler, the pending count, the active and target worker
//! counts, the sequence counter and the shutdown flag. It is never held while a task
//! runs or while a thread is joined, so tasks may call back into the pool. The
//! worker registry (live and retired thread handles) has its own mutex and the
//! condition `shutdown` waits on.
//!
//! Submission broadcasts the work condition rather than waking a single worker:
//! the same wakeup lets idle workers notice that the pool shrank.
//!
//! ## Resizing and shutdown
//!
//! Growing spawns threads immediately. Shrinking only lowers the target; idle workers
//! retire as soon as they see the queue empty and more workers than wanted, busy
//! workers once they finish their current task. `shutdown` lowers the target to zero,
//! discards whatever is still queued (those handles resolve to
//! [`TaskError::NotExecuted`]), waits for every worker to retire and joins them.

use std::sync::{
    Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use taskpool_common::{
    Result,
    error::{Error, StdErrorBoxed, TaskError},
    verify_arg,
};

use crate::{
    config::{PoolConfig, default_worker_count},
    envelope::{TaskEnvelope, TaskOutcome},
    handle::TaskHandle,
    scheduler::{Scheduler, SchedulingPolicy},
    worker::{self, WorkerSet},
};

/// A pool of worker threads executing submitted tasks in scheduler order.
///
/// Dropping the pool shuts it down: queued tasks are discarded, running tasks are
/// allowed to finish and every worker thread is joined.
///
/// `TaskPool` is `Send + Sync`; share it through an `Arc` when tasks need to submit
/// more work.
pub struct TaskPool {
    shared: Arc<PoolShared>,
}

/// A point-in-time view of the pool's counters.
///
/// Each field is read consistently, but the fields are not a single transaction
/// with respect to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Envelopes waiting in the scheduler.
    pub pending: usize,
    /// Tasks currently executing.
    pub active_tasks: usize,
    /// Workers holding a slot (running or waiting).
    pub active_workers: usize,
    /// Worker count the pool is converging to.
    pub target_workers: usize,
    /// Workers that retired and wait to be joined.
    pub retired_workers: usize,
    /// Tasks that returned normally.
    pub completed: u64,
    /// Tasks that panicked or returned an error.
    pub failed: u64,
    /// Tasks discarded by shutdown without running.
    pub discarded: u64,
}

impl TaskPool {
    /// Creates a pool with `workers` threads and the given admission order.
    ///
    /// Zero workers is valid: submitted work stays queued until [`resize`](Self::resize).
    ///
    /// # Arguments
    ///
    /// * `workers` - The number of worker threads to spawn. At most
    ///   [`DEFAULT_MAX_WORKERS`](crate::config::DEFAULT_MAX_WORKERS).
    /// * `policy` - The order in which queued tasks are withdrawn.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`] if `workers` exceeds the limit, or
    /// [`ErrorKind::WorkerSpawn`] if a worker thread could not be started.
    ///
    /// [`ErrorKind::InvalidArgument`]: taskpool_common::error::ErrorKind::InvalidArgument
    /// [`ErrorKind::WorkerSpawn`]: taskpool_common::error::ErrorKind::WorkerSpawn
    pub fn new(workers: usize, policy: SchedulingPolicy) -> Result<TaskPool> {
        Self::with_config(PoolConfig::new(workers, policy))
    }

    /// Creates a pool from a full configuration.
    ///
    /// Fails if the configuration is invalid or if a worker thread cannot be
    /// spawned; in the latter case the workers that did start are shut down again.
    pub fn with_config(config: PoolConfig) -> Result<TaskPool> {
        config.validate()?;
        let workers = config.workers;
        let pool = TaskPool::unstarted(config);
        pool.resize(workers)?;
        Ok(pool)
    }

    fn unstarted(config: PoolConfig) -> TaskPool {
        log::debug!(
            "creating task pool: policy={}, workers={}",
            config.policy,
            config.workers
        );
        let state = PoolState {
            scheduler: config.policy.create_scheduler(),
            pending: 0,
            active_workers: 0,
            target_workers: 0,
            next_sequence: 0,
            next_worker_id: 0,
            shut_down: false,
        };
        TaskPool {
            shared: Arc::new(PoolShared {
                state: Mutex::new(state),
                work_available: Condvar::new(),
                workers: WorkerSet::default(),
                active_tasks: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
                config,
            }),
        }
    }

    /// Configures the size of the global pool.
    ///
    /// Only effective before the first call to [`global()`](Self::global). Values
    /// less than 1 are clamped to 1.
    pub fn configure_global_pool_size(pool_size: usize) {
        GLOBAL_POOL_SIZE.store(pool_size.max(1), Ordering::SeqCst);
    }

    /// Returns the lazily initialized, process-wide FIFO pool.
    ///
    /// Its size is the value passed to
    /// [`configure_global_pool_size()`](Self::configure_global_pool_size), or
    /// `ceil(1.5 × available_parallelism)` (8 if unknown).
    pub fn global() -> &'static TaskPool {
        static POOL: OnceLock<TaskPool> = OnceLock::new();
        POOL.get_or_init(|| {
            let size = match GLOBAL_POOL_SIZE.load(Ordering::SeqCst) {
                0 => default_worker_count(),
                size => size,
            };
            let config = PoolConfig::new(size, SchedulingPolicy::Fifo)
                .with_thread_name_prefix("taskpool-global")
                .with_max_workers(size.max(crate::config::DEFAULT_MAX_WORKERS));
            let pool = TaskPool::unstarted(config);
            if let Err(e) = pool.resize(size) {
                log::error!("global task pool started short of {size} workers: {e}");
            }
            pool
        })
    }

    /// Submits `f` with priority 0 and returns the handle observing its result.
    ///
    /// The returned handle resolves to the closure's return value, to
    /// [`TaskError::Panicked`] if it panics, or to [`TaskError::NotExecuted`] if
    /// the pool shuts down before a worker picks it up.
    pub fn submit<F, R>(&self, f: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit_with_priority(f, 0)
    }

    /// Submits `f` with an ordering key.
    ///
    /// `priority` only matters for [`SchedulingPolicy::Priority`]: higher runs first,
    /// and among equal priorities the later submission runs first.
    pub fn submit_with_priority<F, R>(&self, f: F, priority: i64) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.shared.enqueue(|sequence| {
            TaskEnvelope::with_handle(priority, sequence, move || Ok(f()))
        })
    }

    /// Submits a fallible callable. An `Err` resolves the handle to
    /// [`TaskError::Failed`] carrying the original error as its source.
    pub fn submit_fallible<F, R, E>(&self, f: F) -> TaskHandle<R>
    where
        F: FnOnce() -> std::result::Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<StdErrorBoxed>,
    {
        self.submit_fallible_with_priority(f, 0)
    }

    /// Submits a fallible callable with an ordering key.
    ///
    /// Combines [`submit_fallible`](Self::submit_fallible) with the priority rules of
    /// [`submit_with_priority`](Self::submit_with_priority).
    pub fn submit_fallible_with_priority<F, R, E>(&self, f: F, priority: i64) -> TaskHandle<R>
    where
        F: FnOnce() -> std::result::Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<StdErrorBoxed>,
    {
        self.shared.enqueue(|sequence| {
            TaskEnvelope::with_handle(priority, sequence, move || {
                f().map_err(TaskError::failed)
            })
        })
    }

    /// Submits a fire-and-forget task. Panics are contained and counted as failures.
    pub fn submit_detached<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared
            .enqueue(|sequence| (TaskEnvelope::detached(0, sequence, f), ()));
    }

    /// Changes the number of worker threads.
    ///
    /// # Arguments
    ///
    /// * `target` - The desired worker count, at most the configured `max_workers`.
    ///
    /// Growing spawns the missing workers right away. If a thread cannot be
    /// spawned, the workers started so far are kept, the target is lowered to the
    /// count actually reached and [`ErrorKind::WorkerSpawn`] is returned.
    /// Shrinking never interrupts a running task: excess workers retire once they
    /// find the queue empty. Workers that already retired are joined before this
    /// returns.
    ///
    /// [`ErrorKind::WorkerSpawn`]: taskpool_common::error::ErrorKind::WorkerSpawn
    pub fn resize(&self, target: usize) -> Result<()> {
        verify_arg!(target, target <= self.shared.config.max_workers);
        let res = self.shared.resize(target);
        self.shared.workers.join_retired();
        res
    }

    /// Stops the pool and joins every worker.
    ///
    /// Queued tasks are discarded and their handles resolve to
    /// [`TaskError::NotExecuted`]; running tasks finish normally. Tasks submitted
    /// afterwards are discarded the same way. Calling this again returns
    /// immediately.
    ///
    /// When called from one of this pool's own workers, the pool is still stopped
    /// but the call cannot wait for itself: it returns
    /// [`ErrorKind::InvalidOperation`](taskpool_common::error::ErrorKind::InvalidOperation)
    /// and the remaining workers retire on their own.
    pub fn shutdown(&self) -> Result<()> {
        self.shared.shutdown()
    }

    /// Number of tasks waiting in the scheduler.
    pub fn pending_count(&self) -> usize {
        self.shared.lock_state().pending
    }

    /// Number of tasks currently executing.
    pub fn active_task_count(&self) -> usize {
        self.shared.active_tasks.load(Ordering::SeqCst)
    }

    /// Number of workers currently holding a slot.
    pub fn active_worker_count(&self) -> usize {
        self.shared.lock_state().active_workers
    }

    /// The worker count the pool is converging to, as set by the last resize.
    pub fn target_worker_count(&self) -> usize {
        self.shared.lock_state().target_workers
    }

    /// Returns `true` if no task is waiting in the scheduler.
    pub fn is_empty(&self) -> bool {
        self.shared.lock_state().scheduler.is_empty()
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shared.lock_state().shut_down
    }

    /// The admission order this pool was created with.
    pub fn policy(&self) -> SchedulingPolicy {
        self.shared.config.policy
    }

    /// Takes a snapshot of the pool's counters. See [`PoolStats`].
    pub fn stats(&self) -> PoolStats {
        let (pending, active_workers, target_workers) = {
            let state = self.shared.lock_state();
            (state.pending, state.active_workers, state.target_workers)
        };
        PoolStats {
            pending,
            active_tasks: self.shared.active_tasks.load(Ordering::SeqCst),
            active_workers,
            target_workers,
            retired_workers: self.shared.workers.retired_count(),
            completed: self.shared.completed.load(Ordering::SeqCst),
            failed: self.shared.failed.load(Ordering::SeqCst),
            discarded: self.shared.discarded.load(Ordering::SeqCst),
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        if let Err(e) = self.shared.shutdown() {
            log::debug!("task pool dropped without joining its workers: {e}");
        }
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("policy", &self.shared.config.policy)
            .field("stats", &self.stats())
            .finish()
    }
}

/// What a worker should do after one pass of [`PoolShared::execute_one`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerStep {
    Executed,
    Retire,
}

struct PoolState {
    scheduler: Box<dyn Scheduler<TaskEnvelope> + Send>,
    pending: usize,
    active_workers: usize,
    target_workers: usize,
    next_sequence: u64,
    next_worker_id: usize,
    shut_down: bool,
}

/// State shared between the pool handle and its workers.
pub(crate) struct PoolShared {
    state: Mutex<PoolState>,
    work_available: Condvar,
    workers: WorkerSet,
    active_tasks: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
    config: PoolConfig,
}

impl PoolShared {
    // No user code runs under this lock, so a poisoned guard still holds consistent state.
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub(crate) fn workers(&self) -> &WorkerSet {
        &self.workers
    }

    fn enqueue<H>(&self, make: impl FnOnce(u64) -> (TaskEnvelope, H)) -> H {
        let mut state = self.lock_state();
        state.next_sequence += 1;
        let (envelope, handle) = make(state.next_sequence);

        if state.shut_down {
            drop(state);
            log::debug!(
                "discarding task #{} submitted after shutdown",
                envelope.sequence()
            );
            self.discarded.fetch_add(1, Ordering::SeqCst);
            drop(envelope);
            return handle;
        }

        log::trace!(
            "queued task #{} (priority {})",
            envelope.sequence(),
            envelope.priority()
        );
        state.scheduler.push(envelope);
        state.pending += 1;
        drop(state);
        self.work_available.notify_all();
        handle
    }

    /// One iteration of a worker's loop: waits for work, runs one task outside the
    /// lock, or gives up the worker's slot when the pool has shrunk and no work is
    /// left.
    pub(crate) fn execute_one(&self) -> WorkerStep {
        let envelope = {
            let mut state = self.lock_state();
            loop {
                // Withdrawal only ever happens here, under the lock.
                if let Some(envelope) = state.scheduler.withdraw() {
                    state.pending -= 1;
                    break envelope;
                }
                if state.active_workers > state.target_workers {
                    state.active_workers -= 1;
                    return WorkerStep::Retire;
                }
                state = self
                    .work_available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        let sequence = envelope.sequence();
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        let outcome = envelope.run();
        self.active_tasks.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            TaskOutcome::Completed => {
                self.completed.fetch_add(1, Ordering::SeqCst);
            }
            TaskOutcome::Failed | TaskOutcome::Panicked => {
                log::trace!("task #{sequence} finished with {outcome:?}");
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
        WorkerStep::Executed
    }

    fn resize(self: &Arc<Self>, target: usize) -> Result<()> {
        let mut state = self.lock_state();
        if state.shut_down {
            return Err(Error::invalid_operation("resize of a shut down pool"));
        }

        log::debug!(
            "resizing pool: target {} -> {target}, active {}",
            state.target_workers,
            state.active_workers
        );
        state.target_workers = target;

        let mut res = Ok(());
        if target > state.active_workers {
            let requested = target - state.active_workers;
            for spawned in 0..requested {
                let id = state.next_worker_id;
                state.next_worker_id += 1;
                // The slot is taken before the thread exists, so a concurrent resize
                // never spawns for the same slot.
                state.active_workers += 1;
                match worker::spawn(self.clone(), id) {
                    Ok(handle) => self.workers.register(id, handle),
                    Err(e) => {
                        state.active_workers -= 1;
                        state.target_workers = state.active_workers;
                        log::warn!("failed to spawn worker {id}: {e}");
                        res = Err(Error::worker_spawn(spawned, requested, e));
                        break;
                    }
                }
            }
        }
        drop(state);
        self.work_available.notify_all();
        res
    }

    fn shutdown(self: &Arc<Self>) -> Result<()> {
        let discarded = {
            let mut state = self.lock_state();
            if state.shut_down {
                Vec::new()
            } else {
                state.shut_down = true;
                state.target_workers = 0;
                state.pending = 0;
                let discarded = state.scheduler.drain();
                drop(state);
                self.work_available.notify_all();
                discarded
            }
        };

        if !discarded.is_empty() {
            log::warn!(
                "shutdown discarded {} queued tasks without running them",
                discarded.len()
            );
            self.discarded
                .fetch_add(discarded.len() as u64, Ordering::SeqCst);
        }
        // Dropping the envelopes resolves their handles to `NotExecuted`.
        drop(discarded);

        if worker::is_current_worker(self) {
            return Err(Error::invalid_operation(
                "shutdown from one of the pool's own workers",
            ));
        }

        self.workers.wait_all_retired();
        let joined = self.workers.join_retired();
        if joined > 0 {
            log::info!("task pool shut down, joined {joined} workers");
        }
        Ok(())
    }
}

/// Configured size of the global pool; 0 means derive it from the CPU count.
static GLOBAL_POOL_SIZE: AtomicUsize = AtomicUsize::new(0);
