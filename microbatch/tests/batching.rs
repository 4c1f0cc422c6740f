// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::thread;
use std::time::Duration;

use microbatch::{Batcher, BatcherConfig, BatcherError, Concurrency, EngineState, Job};

// Long enough that the timer never fires during a test.
const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);

// Short enough that the timer fires right away.
const ONE_MILLISECOND: Duration = Duration::from_millis(1);

fn uppercase(input: String) -> String {
    input.to_uppercase()
}

fn job(id: u64, data: &str) -> Job<String> {
    Job::new(id, data.to_string())
}

#[test]
fn test_batcher_lifecycle() {
    let batcher = Batcher::new(uppercase, FIVE_MINUTES, 10);
    let scheduler = batcher.spawn().unwrap();

    batcher.shutdown();
    scheduler.join().unwrap();
    assert_eq!(batcher.state(), EngineState::Stopped);
}

#[test]
fn test_batch_size_one_processes_each_job() {
    let batcher = Batcher::new(uppercase, FIVE_MINUTES, 1);

    let mut a = batcher.add_job(job(1, "hello world")).unwrap();
    let mut b = batcher.add_job(job(2, "foobar")).unwrap();

    let scheduler = batcher.spawn().unwrap();

    assert_eq!(a.get(), "HELLO WORLD");
    assert_eq!(b.get(), "FOOBAR");
    assert_eq!(a.job_id(), 1);
    assert_eq!(b.job_id(), 2);
    assert_eq!(batcher.queued_len(), 0);

    batcher.shutdown();
    scheduler.join().unwrap();
}

#[test]
fn test_size_trigger_flushes_exactly_batch_size() {
    let batcher = Batcher::new(uppercase, FIVE_MINUTES, 2);
    let scheduler = batcher.spawn().unwrap();

    let mut results = Vec::new();
    for (id, data) in [(1, "hello world"), (2, "foobar"), (3, "baz")] {
        results.push(batcher.add_job(job(id, data)).unwrap());
    }

    // Allow time for processing to occur.
    thread::sleep(Duration::from_millis(50));

    assert_eq!(batcher.queued_len(), 1);
    assert_eq!(results[0].get(), "HELLO WORLD");
    assert_eq!(results[1].get(), "FOOBAR");
    assert!(results[2].try_get().is_none());

    batcher.shutdown();
    scheduler.join().unwrap();
    assert_eq!(results[2].get(), "BAZ");
}

#[test]
fn test_timer_flushes_partial_batch() {
    let batcher = Batcher::new(uppercase, ONE_MILLISECOND, 10);
    let scheduler = batcher.spawn().unwrap();

    let mut a = batcher.add_job(job(1, "hello world")).unwrap();
    let mut b = batcher.add_job(job(2, "foobar")).unwrap();

    assert_eq!(a.get(), "HELLO WORLD");
    assert_eq!(b.get(), "FOOBAR");
    assert_eq!(batcher.queued_len(), 0);

    batcher.shutdown();
    scheduler.join().unwrap();
}

#[test]
fn test_timer_clears_queue_before_next_job() {
    let batcher = Batcher::new(uppercase, Duration::from_millis(100), 10);

    batcher.add_job(job(1, "hello world")).unwrap();
    batcher.add_job(job(2, "foobar")).unwrap();

    let scheduler = batcher.spawn().unwrap();

    // Wait to allow the timer to fire.
    thread::sleep(Duration::from_millis(150));

    batcher.add_job(job(3, "baz")).unwrap();
    assert_eq!(batcher.queued_len(), 1);

    batcher.shutdown();
    scheduler.join().unwrap();
}

#[test]
fn test_cannot_add_job_when_shutting_down() {
    let batcher = Batcher::new(uppercase, FIVE_MINUTES, 10);
    let scheduler = batcher.spawn().unwrap();
    batcher.shutdown();

    let err = batcher.add_job(job(1, "hello world")).unwrap_err();
    assert_eq!(err, BatcherError::SubmissionRejected);
    assert_eq!(
        err.to_string(),
        "failed to add job; batcher is shutting down"
    );

    let err = batcher.add_jobs(vec![job(2, "a"), job(3, "b")]).unwrap_err();
    assert_eq!(err, BatcherError::SubmissionRejected);

    scheduler.join().unwrap();
    assert_eq!(batcher.queued_len(), 0);
}

#[test]
fn test_shutdown_drains_queue() {
    let batcher = Batcher::new(uppercase, FIVE_MINUTES, 3);
    let scheduler = batcher.spawn().unwrap();

    for (id, data) in [(1, "hello world"), (2, "foobar"), (3, "baz"), (4, "qux")] {
        batcher.add_job(job(id, data)).unwrap();
    }

    // Allow time for processing to occur.
    thread::sleep(Duration::from_millis(50));

    // Add another job before shutting down.
    let mut e = batcher.add_job(job(5, "job 5")).unwrap();
    assert_eq!(batcher.queued_len(), 2);

    batcher.shutdown();
    assert_eq!(e.get(), "JOB 5");

    scheduler.join().unwrap();
    assert_eq!(batcher.queued_len(), 0);
}

#[test]
fn test_result_can_be_read_again() {
    let batcher = Batcher::new(uppercase, FIVE_MINUTES, 1);
    let scheduler = batcher.spawn().unwrap();

    let mut a = batcher.add_job(job(4, "hello world")).unwrap();

    let first = a.get().clone();
    let again = a.get().clone();
    assert_eq!(first, again);
    assert_eq!(a.try_get(), Some(&first));

    batcher.shutdown();
    scheduler.join().unwrap();
}

#[test]
fn test_every_admitted_job_gets_its_own_output() {
    let batcher = Batcher::new(|n: u64| n * n, Duration::from_millis(5), 7);
    let scheduler = batcher.spawn().unwrap();

    let submitters: Vec<_> = (0..4u64)
        .map(|t| {
            let batcher = batcher.clone();
            thread::spawn(move || {
                (0..50u64)
                    .map(|i| {
                        let n = t * 1000 + i;
                        (n, batcher.add_job(Job::new(n, n)).unwrap())
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for submitter in submitters {
        for (n, result) in submitter.join().unwrap() {
            assert_eq!(result.job_id(), n);
            assert_eq!(result.into_inner(), n * n);
        }
    }

    batcher.shutdown();
    scheduler.join().unwrap();
    assert_eq!(batcher.queued_len(), 0);
}

#[test]
fn test_async_get_with_worker_pool() {
    let config: BatcherConfig = serde_json::from_str(
        r#"{ "frequency_ms": 20, "batch_size": 4, "concurrency": { "bounded": 3 } }"#,
    )
    .unwrap();
    let batcher = Batcher::builder(|s: String| s.len())
        .config(config)
        .build()
        .unwrap();
    assert_eq!(batcher.config().concurrency, Concurrency::Bounded(3));
    let scheduler = batcher.spawn().unwrap();

    let mut results = batcher
        .add_jobs(["a", "bb", "ccc"].into_iter().enumerate().map(|(i, s)| {
            Job::new(i as u64, s.to_string())
        }))
        .unwrap();

    let lengths = futures::executor::block_on(async {
        let mut lengths = Vec::new();
        for result in results.iter_mut() {
            lengths.push(*result.get_async().await);
        }
        lengths
    });
    assert_eq!(lengths, vec![1, 2, 3]);

    batcher.shutdown();
    scheduler.join().unwrap();
    batcher.wait_until_finished();
    assert_eq!(batcher.in_flight(), 0);
}

#[test]
fn test_add_jobs_iterator_may_use_batcher() {
    let batcher = Batcher::new(|n: u64| n + 1, FIVE_MINUTES, 10);
    let scheduler = batcher.spawn().unwrap();

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let submitter = batcher.clone();
    thread::spawn(move || {
        let results = submitter.add_jobs((0..3u64).map(|n| {
            // the iterator is consumed before the queue is locked
            let _ = submitter.queued_len();
            Job::new(n, n)
        }));
        let _ = done_tx.send(results);
    });

    let results = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("add_jobs did not return")
        .unwrap();
    assert_eq!(batcher.queued_len(), 3);

    batcher.shutdown();
    scheduler.join().unwrap();
    let outputs: Vec<u64> = results.into_iter().map(|r| r.into_inner()).collect();
    assert_eq!(outputs, vec![1, 2, 3]);
}

#[test]
fn test_job_racing_shutdown_is_rejected_or_processed() {
    for _round in 0..20 {
        let batcher = Batcher::new(|n: u64| n * 3, Duration::from_millis(2), 5);
        let scheduler = batcher.spawn().unwrap();
        let start = std::sync::Arc::new(std::sync::Barrier::new(5));

        let submitters: Vec<_> = (0..4u64)
            .map(|t| {
                let batcher = batcher.clone();
                let start = start.clone();
                thread::spawn(move || {
                    start.wait();
                    (0..200u64)
                        .map(|i| {
                            let n = t * 1000 + i;
                            (n, batcher.add_job(Job::new(n, n)))
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        start.wait();
        thread::sleep(Duration::from_micros(200));
        batcher.shutdown();

        let mut admitted = 0;
        for submitter in submitters {
            for (n, outcome) in submitter.join().unwrap() {
                match outcome {
                    Ok(result) => {
                        admitted += 1;
                        assert_eq!(result.into_inner(), n * 3);
                    }
                    Err(err) => assert_eq!(err, BatcherError::SubmissionRejected),
                }
            }
        }

        scheduler.join().unwrap();
        assert_eq!(batcher.queued_len(), 0);
        assert!(admitted <= 800);
        assert!(batcher.add_job(Job::new(0, 0)).is_err());
    }
}
