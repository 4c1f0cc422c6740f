// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use async_channel::{Receiver, Sender};
use log::{debug, error, warn};

use crate::batch_engine::state::{InFlightGuard, Tracker};
use crate::config::Concurrency;
use crate::job::QueuedJob;

pub(crate) type Processor<A, B> = Arc<dyn Fn(A) -> B + Send + Sync + 'static>;

/// One job handed to a processor invocation.
struct Work<A, B> {
    queued: QueuedJob<A, B>,
    _in_flight: InFlightGuard,
}

enum Mode<A, B> {
    /// A fresh thread per job.
    PerJob,
    /// Fixed set of workers pulling from a shared channel.
    Pool {
        work_tx: Mutex<Option<Sender<Work<A, B>>>>,
        workers: Mutex<Vec<JoinHandle<()>>>,
    },
}

/// Fans a batch out to concurrent processor invocations and routes each
/// output to the result handle of its job.
pub(crate) struct Dispatcher<A, B> {
    processor: Processor<A, B>,
    tracker: Tracker,
    mode: Mode<A, B>,
}

impl<A, B> std::fmt::Debug for Dispatcher<A, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.mode {
            Mode::PerJob => "per-job",
            Mode::Pool { .. } => "pool",
        };
        f.debug_struct("Dispatcher").field("mode", &mode).finish()
    }
}

impl<A, B> std::fmt::Debug for Work<A, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.queued, f)
    }
}

impl<A, B> Dispatcher<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    pub(crate) fn new(processor: Processor<A, B>, concurrency: Concurrency, tracker: Tracker) -> Self {
        let mode = match concurrency {
            Concurrency::Unbounded => Mode::PerJob,
            Concurrency::Bounded(worker_count) => {
                let (tx, rx) = async_channel::unbounded();
                let workers: Vec<JoinHandle<()>> = (0..worker_count)
                    .filter_map(|n| spawn_worker(n, processor.clone(), rx.clone()))
                    .collect();
                if workers.is_empty() {
                    warn!("No pool worker could be started, falling back to a thread per job");
                    Mode::PerJob
                } else {
                    debug!("Started {} pool workers", workers.len());
                    Mode::Pool {
                        work_tx: Mutex::new(Some(tx)),
                        workers: Mutex::new(workers),
                    }
                }
            }
        };

        Self {
            processor,
            tracker,
            mode,
        }
    }

    /// Start one invocation per job. Does not wait for any of them.
    pub(crate) fn dispatch(&self, batch: Vec<QueuedJob<A, B>>) {
        for queued in batch {
            let work = Work {
                queued,
                _in_flight: self.tracker.begin_invocation(),
            };
            match &self.mode {
                Mode::PerJob => self.spawn_per_job(work),
                Mode::Pool { work_tx, .. } => {
                    let work_tx = work_tx.lock().unwrap_or_else(PoisonError::into_inner);
                    match work_tx.as_ref() {
                        Some(tx) => {
                            if let Err(e) = tx.try_send(work) {
                                error!("Worker pool is gone, dropping {:?}", e.into_inner());
                            }
                        }
                        None => error!("Dispatch after close, dropping {:?}", work),
                    }
                }
            }
        }
    }

    fn spawn_per_job(&self, work: Work<A, B>) {
        self.spawn_per_job_with(work, |builder, task| builder.spawn(task).map(drop));
    }

    /// Hand `work` to a new thread created by `spawn`. If no thread can be
    /// created, the job is processed on the calling thread instead.
    fn spawn_per_job_with<S>(&self, work: Work<A, B>, spawn: S)
    where
        S: FnOnce(thread::Builder, Box<dyn FnOnce() + Send>) -> io::Result<()>,
    {
        let processor = self.processor.clone();
        let job_id = work.queued.id();
        let slot = Arc::new(Mutex::new(Some(work)));
        let thread_slot = slot.clone();

        let builder = thread::Builder::new().name(format!("microbatch-job-{job_id}"));
        let task: Box<dyn FnOnce() + Send> = Box::new(move || {
            let work = thread_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(work) = work {
                process(&processor, work);
            }
        });
        let spawned = spawn(builder, task);

        if let Err(e) = spawned {
            warn!("Failed to spawn thread for job {job_id}, processing it inline: {e}");
            let work = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(work) = work {
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| process(&self.processor, work)));
                if outcome.is_err() {
                    error!("Processor panicked on job {job_id}; its result will never be delivered");
                }
            }
        }
    }

    /// Stop accepting work. Pool workers finish what is queued and exit.
    pub(crate) fn close(&self) {
        if let Mode::Pool { work_tx, .. } = &self.mode {
            work_tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        }
    }

    /// Join the pool workers. Only returns after [`Dispatcher::close`].
    pub(crate) fn join_workers(&self) {
        if let Mode::Pool { workers, .. } = &self.mode {
            let handles: Vec<_> = workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain(..)
                .collect();
            for handle in handles {
                let _ = handle.join();
            }
        }
    }
}

fn spawn_worker<A, B>(
    n: usize,
    processor: Processor<A, B>,
    rx: Receiver<Work<A, B>>,
) -> Option<JoinHandle<()>>
where
    A: Send + 'static,
    B: Send + 'static,
{
    thread::Builder::new()
        .name(format!("microbatch-worker-{n}"))
        .spawn(move || worker_loop(n, processor, rx))
        .inspect_err(|e| error!("Failed to spawn pool worker {n}: {e}"))
        .ok()
}

fn worker_loop<A, B>(n: usize, processor: Processor<A, B>, rx: Receiver<Work<A, B>>) {
    // recv keeps yielding queued work after the sender is gone
    while let Ok(work) = rx.recv_blocking() {
        let job_id = work.queued.id();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| process(&processor, work)));
        if outcome.is_err() {
            error!("Processor panicked on job {job_id}; its result will never be delivered");
        }
    }
    debug!("Pool worker {n} ended, channel closed");
}

fn process<A, B>(processor: &Processor<A, B>, work: Work<A, B>) {
    let Work { queued, _in_flight } = work;
    let job_id = queued.id();
    let output = processor(queued.job.data);
    if queued.result_tx.try_send(output).is_err() {
        debug!("Result of job {job_id} was dropped by its submitter");
    }
}
