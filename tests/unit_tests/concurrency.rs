use eidolon::concurrency::{
    check_result_map, list_results, partition, sum_result_map, Future, Progress, ShareScope, TaskQueue, WorkerPool,
};
use eidolon::matrix::{RealMatrix, Shareable};
use eidolon::proptest::partition_args;
use eidolon::Error;
use matrixcompare::assert_scalar_eq;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn partition_splits_evenly_with_remainder_last() {
    assert_eq!(partition(10, 0, 3), 0..3);
    assert_eq!(partition(10, 1, 3), 3..6);
    assert_eq!(partition(10, 2, 3), 6..10);
    assert_eq!(partition(5, 0, 0), 0..5);
}

#[test]
fn concurrent_sum_matches_serial_sum() {
    let rows = 1_000_000;
    let values: Vec<f64> = (0..rows)
        .map(|i| ((i * 7919) % 1000) as f64 / 1000.0 - 0.5)
        .collect();
    let serial: f64 = values.iter().sum();
    let matrix = RealMatrix::from_vec("values", 1, values).unwrap();

    let pool = WorkerPool::new(4);
    let scope = ShareScope::new(&[&matrix as &dyn Shareable]);
    let job_matrix = matrix.handle();
    let results = pool
        .run(rows, 4, None, move |worker| {
            let data = job_matrix.read();
            Ok(data[worker.range()].iter().sum::<f64>())
        })
        .unwrap();
    scope.finish().unwrap();

    assert_eq!(results.len(), 4);
    let total: f64 = list_results(results).unwrap().iter().sum();
    assert_scalar_eq!(total, serial, comp = abs, tol = 1e-6);
    assert!(!matrix.is_shared());
}

#[test]
fn results_are_concatenated_in_worker_order() {
    let pool = WorkerPool::new(3);
    let progress = Progress::new();
    let results = pool
        .run(100, 0, Some(Arc::clone(&progress)), |worker| {
            Ok(worker.progress_range().collect::<Vec<_>>())
        })
        .unwrap();
    assert_eq!(sum_result_map(results).unwrap(), (0..100).collect::<Vec<_>>());
    assert_eq!(progress.max(), 100);
}

#[test]
fn one_failure_fails_every_part() {
    let pool = WorkerPool::new(4);
    let results = pool
        .run(40, 0, None, |worker| {
            if worker.index() == 0 {
                Err(Error::Worker {
                    worker: 0,
                    message: "bad row".to_string(),
                })
            } else {
                worker.sync()?;
                Ok(worker.index())
            }
        })
        .unwrap();

    assert_eq!(results.len(), 4);
    assert!(results.values().all(|r| r.is_err()));
    match check_result_map(&results) {
        Err(Error::Worker { message, .. }) => assert_eq!(message, "bad row"),
        other => panic!("Expected the worker's own error, got {:?}", other),
    }
}

#[test]
fn panics_become_worker_errors() {
    let pool = WorkerPool::new(2);
    let results = pool.run(2, 0, None, |_| -> eidolon::Result<()> { panic!("boom") }).unwrap();
    match check_result_map(&results) {
        Err(Error::Worker { message, .. }) => assert_eq!(message, "boom"),
        other => panic!("Expected a worker error, got {:?}", other),
    }
}

#[test]
fn workers_exchange_shared_objects() {
    let pool = WorkerPool::new(4);
    let results = pool
        .run(8, 0, None, |worker| {
            let others = worker.share("start", worker.start(), true)?;
            worker.sync()?;
            Ok(others.len() + 1)
        })
        .unwrap();
    assert_eq!(results.len(), 4);
    for count in list_results(results).unwrap() {
        assert_eq!(count, 4);
    }
}

#[test]
fn pool_keeps_the_requested_worker_count() {
    let pool = WorkerPool::new(4);
    assert_eq!(pool.num_workers(), 4);
    let results = pool
        .run(40, 4, None, |worker| {
            worker.sync()?;
            Ok(worker.index())
        })
        .unwrap();
    assert_eq!(list_results(results).unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn workers_waiting_at_the_barrier_see_peer_failure() {
    let pool = WorkerPool::new(4);
    let observed = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&observed);
    let results = pool
        .run(40, 4, None, move |worker| {
            if worker.index() == 0 {
                // Let the others reach the barrier first
                std::thread::sleep(Duration::from_millis(50));
                return Err(Error::Worker {
                    worker: 0,
                    message: "bad row".to_string(),
                });
            }
            let waited = worker.sync();
            seen.lock().push((worker.index(), waited.clone()));
            waited.map(|_| worker.index())
        })
        .unwrap();

    assert_eq!(results.len(), 4);
    let mut observed = observed.lock().clone();
    observed.sort_by_key(|(index, _)| *index);
    assert_eq!(observed.len(), 3);
    for (index, waited) in observed {
        assert_eq!(waited, Err(Error::PeerFailed { worker: index }));
    }
    assert!(matches!(check_result_map(&results), Err(Error::Worker { worker: 0, .. })));
}

#[test]
fn jobs_submitted_from_workers_run_inline() {
    let pool = Arc::new(WorkerPool::new(2));
    let inner = Arc::clone(&pool);
    let results = pool
        .run(2, 0, None, move |_| {
            let nested = inner.run(10, 0, None, |w| Ok(w.range().len()))?;
            assert_eq!(nested.len(), 1);
            list_results(nested).map(|totals| totals.into_iter().sum::<usize>())
        })
        .unwrap();
    for total in list_results(results).unwrap() {
        assert_eq!(total, 10);
    }
}

#[test]
fn choose_proc_count_is_serial_below_threshold() {
    let pool = WorkerPool::new(2);
    assert_eq!(pool.choose_proc_count(10, 0, 100), 1);
    assert_eq!(pool.choose_proc_count(1000, 0, 100), 0);
    assert_eq!(pool.effective_parts(1, 0), 1);
    assert_eq!(pool.effective_parts(100, 0), 2);
    assert_eq!(pool.effective_parts(100, 8), 2);
}

#[test]
fn share_scope_reports_busy_matrices() {
    let matrix = RealMatrix::new("pixels", 4, 4);
    let scope = ShareScope::new(&[&matrix as &dyn Shareable]);
    assert!(matrix.is_shared());
    let held = matrix.handle();
    assert!(matches!(scope.finish(), Err(Error::ResourceBusy { references: 1, .. })));
    drop(held);
    matrix.unshare().unwrap();
}

#[test]
fn task_queue_processes_in_order_and_cancels_after_failure() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let queue = TaskQueue::new("test-queue", move |value: i64| {
        counter.fetch_add(1, Ordering::SeqCst);
        if value < 0 {
            Err(Error::Worker {
                worker: 0,
                message: "negative".to_string(),
            })
        } else {
            Ok(value * 2)
        }
    });

    let first = queue.submit(1);
    let second = queue.submit(2);
    assert_eq!(first.wait().unwrap(), 2);
    assert_eq!(second.wait().unwrap(), 4);
    assert!(queue.submit(-1).wait().is_err());
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[test]
fn future_guard_sets_error_when_dropped_unset() {
    let future: Future<i32> = Future::new();
    assert_eq!(future.wait_timeout(Duration::from_millis(1)), None);
    {
        let _guard = future.guard();
    }
    assert!(future.is_set());
    assert!(future.wait().is_err());

    let future = Future::new();
    future.guard().set(7);
    assert_eq!(future.wait(), Ok(7));
}

#[cfg(unix)]
mod subprocess {
    use eidolon::concurrency::{exec_batch_program, BatchProgram};
    use eidolon::Error;
    use std::time::{Duration, Instant};

    #[test]
    fn exit_codes_and_output_are_collected() {
        let output = BatchProgram::new("sh")
            .args(["-c", "echo tracked; exit 3"])
            .run()
            .unwrap();
        assert_eq!(output.code, 3);
        assert!(output.output.contains("tracked"));
        assert!(!output.timed_out);
        assert!(matches!(
            output.into_result("sh"),
            Err(Error::ExternalTool { code: 3, .. })
        ));
    }

    #[test]
    fn slow_programs_time_out() {
        let output = exec_batch_program("sleep", ["5"], Some(Duration::from_millis(100))).unwrap();
        assert!(output.timed_out);
        assert!(matches!(output.into_result("sleep"), Err(Error::Timeout { .. })));
    }

    #[test]
    fn multibyte_output_survives_read_boundaries() {
        // The leading byte puts every two-byte character off the pipe's chunk alignment
        let script = "printf a; i=0; while [ $i -lt 2000 ]; do printf '\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}'; i=$((i+1)); done";
        let output = BatchProgram::new("sh").args(["-c", script]).run().unwrap();
        assert_eq!(output.code, 0);
        assert!(!output.output.contains(char::REPLACEMENT_CHARACTER));
        assert_eq!(output.output, format!("a{}", "\u{e9}".repeat(20_000)));
    }

    #[test]
    fn timed_out_programs_return_while_a_child_holds_the_pipes() {
        let start = Instant::now();
        let output = exec_batch_program("sh", ["-c", "sleep 20 & sleep 20"], Some(Duration::from_millis(100))).unwrap();
        assert!(output.timed_out);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn missing_programs_fail_to_launch() {
        assert!(BatchProgram::new("/nonexistent/eidolon-tool").run().is_err());
    }
}

proptest! {
    #[test]
    fn partitions_cover_the_range_without_overlap((total, nparts) in partition_args(200)) {
        let mut expected_start = 0;
        for part in 0..nparts {
            let range = partition(total, part, nparts);
            prop_assert_eq!(range.start, expected_start);
            prop_assert!(range.end >= range.start);
            expected_start = range.end;
        }
        prop_assert_eq!(expected_start, total);
    }
}
