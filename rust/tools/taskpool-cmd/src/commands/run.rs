//! Run command implementation

use anyhow::Result;
use serde::Serialize;
use std::{
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::{Duration, Instant},
};
use taskpool::{SchedulingPolicy, TaskError, TaskHandle, TaskPool};

pub struct RunArgs {
    pub config: Option<String>,
    pub workers: Option<usize>,
    pub policy: Option<SchedulingPolicy>,
    pub tasks: usize,
    pub task_ms: u64,
    pub fail_every: usize,
    pub resize_to: Option<usize>,
    pub shutdown_after_ms: Option<u64>,
    pub seed: u64,
}

#[derive(Debug, Default, Serialize)]
struct RunSummary {
    policy: String,
    initial_workers: usize,
    final_target_workers: usize,
    submitted: usize,
    succeeded: usize,
    failed: usize,
    not_executed: usize,
    elapsed_ms: u128,
    /// Task indices in the order the workers started them (first 32).
    execution_order: Vec<usize>,
}

pub fn run(args: RunArgs) -> Result<()> {
    let summary = execute(args)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn execute(args: RunArgs) -> Result<RunSummary> {
    let config = super::load_config(args.config.as_deref(), args.workers, args.policy)?;
    let policy = config.policy;
    let initial_workers = config.workers;
    let pool = TaskPool::with_config(config)?;
    log::info!("started pool: policy={policy}, workers={initial_workers}");

    fastrand::seed(args.seed);
    let started = Arc::new(Mutex::new(Vec::with_capacity(args.tasks)));
    let begin = Instant::now();

    let handles: Vec<TaskHandle<usize>> = (0..args.tasks)
        .map(|index| {
            let priority = match policy {
                SchedulingPolicy::Priority => fastrand::i64(0..10),
                _ => 0,
            };
            let started = started.clone();
            let task_ms = args.task_ms;
            let fails = args.fail_every > 0 && (index + 1) % args.fail_every == 0;
            pool.submit_fallible_with_priority(
                move || {
                    started
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(index);
                    thread::sleep(Duration::from_millis(task_ms));
                    if fails {
                        Err(format!("synthetic failure in task {index}"))
                    } else {
                        Ok(index)
                    }
                },
                priority,
            )
        })
        .collect();

    if let Some(target) = args.resize_to {
        log::info!("resizing pool to {target} workers");
        pool.resize(target)?;
    }

    if let Some(delay) = args.shutdown_after_ms {
        thread::sleep(Duration::from_millis(delay));
        log::info!("shutting down with {} tasks pending", pool.pending_count());
        pool.shutdown()?;
    }

    let mut summary = RunSummary {
        policy: policy.to_string(),
        initial_workers,
        final_target_workers: pool.target_worker_count(),
        submitted: args.tasks,
        ..Default::default()
    };

    for res in TaskHandle::get_all(handles) {
        match res {
            Ok(_) => summary.succeeded += 1,
            Err(TaskError::NotExecuted) => summary.not_executed += 1,
            Err(e) => {
                log::debug!("{e}");
                summary.failed += 1;
            }
        }
    }
    summary.elapsed_ms = begin.elapsed().as_millis();
    pool.shutdown()?;

    summary.execution_order = started
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .take(32)
        .copied()
        .collect();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tasks: usize) -> RunArgs {
        RunArgs {
            config: None,
            workers: Some(2),
            policy: Some(SchedulingPolicy::Priority),
            tasks,
            task_ms: 1,
            fail_every: 3,
            resize_to: Some(3),
            shutdown_after_ms: None,
            seed: 7,
        }
    }

    #[test]
    fn test_every_task_is_accounted_for() {
        let summary = execute(args(30)).unwrap();
        assert_eq!(summary.policy, "priority");
        assert_eq!(summary.initial_workers, 2);
        assert_eq!(summary.final_target_workers, 3);
        assert_eq!(summary.succeeded, 20);
        assert_eq!(summary.failed, 10);
        assert_eq!(summary.not_executed, 0);
        assert_eq!(summary.execution_order.len(), 30);
    }

    #[test]
    fn test_early_shutdown_reports_not_executed() {
        let summary = execute(RunArgs {
            workers: Some(1),
            resize_to: None,
            task_ms: 20,
            shutdown_after_ms: Some(10),
            ..args(20)
        })
        .unwrap();
        assert_eq!(
            summary.succeeded + summary.failed + summary.not_executed,
            summary.submitted
        );
        assert!(summary.not_executed > 0);
    }
}
