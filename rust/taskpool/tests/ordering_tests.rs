use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    thread,
};

use taskpool::{SchedulingPolicy, TaskHandle, TaskPool};

/// Submits `tasks` (label, priority) to a pool with no workers, then starts a single
/// worker and returns the order in which the tasks ran.
fn run_single_worker(policy: SchedulingPolicy, tasks: &[(&'static str, i64)]) -> Vec<&'static str> {
    let pool = TaskPool::new(0, policy).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = tasks
        .iter()
        .map(|&(label, priority)| {
            let log = log.clone();
            pool.submit_with_priority(move || log.lock().unwrap().push(label), priority)
        })
        .collect();
    assert_eq!(pool.pending_count(), tasks.len());

    pool.resize(1).unwrap();
    for res in TaskHandle::get_all(handles) {
        res.unwrap();
    }
    pool.shutdown().unwrap();

    let order = log.lock().unwrap().clone();
    order
}

#[test]
fn test_fifo_runs_in_submission_order() {
    let tasks: Vec<_> = ["a", "b", "c", "d", "e", "f"]
        .into_iter()
        .map(|l| (l, 0))
        .collect();
    assert_eq!(
        run_single_worker(SchedulingPolicy::Fifo, &tasks),
        vec!["a", "b", "c", "d", "e", "f"]
    );
}

#[test]
fn test_fifo_with_live_worker() {
    let pool = TaskPool::new(1, SchedulingPolicy::Fifo).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let handles: Vec<_> = (0..200)
        .map(|i| {
            let log = log.clone();
            pool.submit(move || log.lock().unwrap().push(i))
        })
        .collect();
    for res in TaskHandle::get_all(handles) {
        res.unwrap();
    }
    assert_eq!(*log.lock().unwrap(), (0..200).collect::<Vec<_>>());
}

#[test]
fn test_lifo_runs_in_reverse_order() {
    let tasks = [("A", 0), ("B", 0), ("C", 0)];
    assert_eq!(
        run_single_worker(SchedulingPolicy::Lifo, &tasks),
        vec!["C", "B", "A"]
    );
}

#[test]
fn test_priority_prefers_later_submission_on_ties() {
    let tasks = [("p1", 1), ("p5-early", 5), ("p5-late", 5), ("p3", 3)];
    assert_eq!(
        run_single_worker(SchedulingPolicy::Priority, &tasks),
        vec!["p5-late", "p5-early", "p3", "p1"]
    );
}

#[test]
fn test_priority_random_keys() {
    fastrand::seed(0x5eed_1234);
    let pool = TaskPool::new(0, SchedulingPolicy::Priority).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut expected = Vec::new();
    let handles: Vec<_> = (0..300)
        .map(|_| {
            let priority = fastrand::i64(-5..5);
            let log = log.clone();
            let handle = pool.submit_with_priority(
                move || log.lock().unwrap().push(priority),
                priority,
            );
            expected.push((priority, handle.sequence()));
            handle
        })
        .collect();

    pool.resize(1).unwrap();
    for res in TaskHandle::get_all(handles) {
        res.unwrap();
    }

    expected.sort_by(|a, b| b.cmp(a));
    let expected_priorities: Vec<_> = expected.into_iter().map(|(p, _)| p).collect();
    assert_eq!(*log.lock().unwrap(), expected_priorities);
}

#[test]
fn test_concurrent_submitters_get_distinct_sequences() {
    const SUBMITTERS: usize = 8;
    const TASKS: usize = 250;

    let pool = Arc::new(TaskPool::new(0, SchedulingPolicy::Fifo).unwrap());
    let executed = Arc::new(Mutex::new(Vec::new()));

    let submitters: Vec<_> = (0..SUBMITTERS)
        .map(|s| {
            let pool = pool.clone();
            let executed = executed.clone();
            thread::spawn(move || {
                (0..TASKS)
                    .map(|t| {
                        let executed = executed.clone();
                        pool.submit(move || executed.lock().unwrap().push((s, t)))
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut sequence_of = HashMap::new();
    let mut handles = Vec::new();
    for (s, submitter) in submitters.into_iter().enumerate() {
        for (t, handle) in submitter.join().unwrap().into_iter().enumerate() {
            sequence_of.insert((s, t), handle.sequence());
            handles.push(handle);
        }
    }

    let mut sequences: Vec<u64> = sequence_of.values().copied().collect();
    sequences.sort_unstable();
    let expected: Vec<u64> = (1..=(SUBMITTERS * TASKS) as u64).collect();
    assert_eq!(sequences, expected);

    pool.resize(1).unwrap();
    for res in TaskHandle::get_all(handles) {
        res.unwrap();
    }

    let executed = executed.lock().unwrap();
    assert_eq!(executed.len(), SUBMITTERS * TASKS);
    let run_sequences: Vec<u64> = executed.iter().map(|id| sequence_of[id]).collect();
    assert!(run_sequences.windows(2).all(|w| w[0] < w[1]));

    // Per-submitter order is admission order as well.
    for s in 0..SUBMITTERS {
        let mine: Vec<usize> = executed
            .iter()
            .filter(|(owner, _)| *owner == s)
            .map(|&(_, t)| t)
            .collect();
        assert_eq!(mine, (0..TASKS).collect::<Vec<_>>());
    }
}
