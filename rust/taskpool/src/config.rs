//! Pool construction settings.

use serde::{Deserialize, Serialize};
use taskpool_common::{Result, error::Error, verify_arg};

use crate::scheduler::SchedulingPolicy;

/// Upper bound on the worker count when none is configured.
pub const DEFAULT_MAX_WORKERS: usize = 1024;

/// Settings for a [`TaskPool`](crate::pool::TaskPool).
///
/// Missing fields fall back to [`PoolConfig::default`] when deserialized, so a
/// configuration file only needs to name what it changes:
///
/// ```json
/// { "workers": 4, "policy": "priority" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Workers spawned at construction. Zero is allowed: work queues until a resize.
    pub workers: usize,
    pub policy: SchedulingPolicy,
    /// Worker threads are named `{prefix}-{id}`. Empty leaves threads unnamed.
    pub thread_name_prefix: String,
    /// Stack size in bytes for worker threads; `None` uses the platform default.
    pub stack_size: Option<usize>,
    /// Largest worker count accepted by construction and `resize`.
    pub max_workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            workers: default_worker_count(),
            policy: SchedulingPolicy::Fifo,
            thread_name_prefix: "taskpool".to_string(),
            stack_size: None,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl PoolConfig {
    /// Creates a configuration with the given worker count and policy and default
    /// values for everything else.
    pub fn new(workers: usize, policy: SchedulingPolicy) -> Self {
        PoolConfig {
            workers,
            policy,
            ..Default::default()
        }
    }

    /// Sets the number of workers spawned at construction.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the admission order.
    pub fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the worker thread name prefix. An empty prefix leaves threads unnamed.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Sets the stack size, in bytes, of worker threads.
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Sets the largest worker count construction and `resize` accept.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Checks the settings for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](taskpool_common::error::ErrorKind::InvalidArgument)
    /// if `max_workers` is zero, `workers` exceeds `max_workers`, or `stack_size`
    /// is zero.
    pub fn validate(&self) -> Result<()> {
        verify_arg!(max_workers, self.max_workers > 0);
        verify_arg!(workers, self.workers <= self.max_workers);
        if let Some(stack_size) = self.stack_size {
            verify_arg!(stack_size, stack_size > 0);
        }
        Ok(())
    }

    /// Parses a JSON configuration and validates it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PoolConfig =
            serde_json::from_str(json).map_err(|e| Error::config("pool config", e))?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn thread_name(&self, id: usize) -> Option<String> {
        (!self.thread_name_prefix.is_empty()).then(|| format!("{}-{id}", self.thread_name_prefix))
    }
}

/// `ceil(1.5 × available_parallelism)`, or 8 if parallelism is unknown.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() * 3).div_ceil(2))
        .unwrap_or(8)
}
