// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Design: Micro-Batching Engine
//!
//! ## Overview
//! Submitters push jobs into one FIFO queue. A single scheduler loop takes
//! batches out of the queue and hands them to the dispatcher.
//!
//! - Size trigger: as soon as `batch_size` jobs are queued, exactly that many
//!   are flushed and the flush timer restarts.
//! - Timer trigger: every `frequency` the whole queue is flushed, even if it
//!   is empty.
//! - Shutdown: admission stops, the remaining queue is flushed once and the
//!   loop exits. Already dispatched jobs keep running.
//!
//! ## Wakeups
//! The loop never polls. It sleeps in a biased select over a closed-on-shutdown
//! channel, an `async_io` interval timer and a coalescing submission signal.
//!
//! ```text
//!         +------------+    add_job    +-------------------+
//!         | submitters +-------------->+  queue (Mutex)    |
//!         +-----^------+               +---------+---------+
//!               |                                |
//!               |                   size / tick / shutdown
//!               |                                v
//!               |                      +---------+---------+
//!               |                      |  scheduler loop   |
//!               |                      +---------+---------+
//!               |                                | batch
//!               |                                v
//!               |                      +---------+---------+
//!               +----- JobResult <-----+    dispatcher     |
//!                                      | (thread per job   |
//!                                      |  or worker pool)  |
//!                                      +-------------------+
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_channel::{Receiver, Sender};
use log::{debug, info, warn};

use crate::batch_engine::dispatcher::{Dispatcher, Processor};
use crate::batch_engine::state::Tracker;
use crate::config::BatcherConfig;
use crate::error::BatcherError;
use crate::job::{Job, QueuedJob};
use crate::job_result::JobResult;

pub mod builder;
mod dispatcher;
mod scheduler;
pub mod state;

pub use builder::BatcherBuilder;
pub use state::EngineState;

pub(crate) struct Inner<A, B> {
    config: BatcherConfig,
    shutting_down: AtomicBool,
    started: AtomicBool,
    queue: Mutex<VecDeque<QueuedJob<A, B>>>,
    submitted_tx: Sender<()>,
    submitted_rx: Receiver<()>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
    dispatcher: Dispatcher<A, B>,
    tracker: Tracker,
}

impl<A, B> Inner<A, B> {
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<QueuedJob<A, B>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the whole queue.
    fn take_all(&self) -> Vec<QueuedJob<A, B>> {
        self.lock_queue().drain(..).collect()
    }

    /// Take exactly `batch_size` jobs from the head, if that many are queued.
    fn take_batch(&self, batch_size: usize) -> Option<Vec<QueuedJob<A, B>>> {
        let mut queue = self.lock_queue();
        if queue.len() < batch_size {
            return None;
        }
        let batch = queue.drain(..batch_size).collect();
        Some(batch)
    }
}

/// Groups submitted jobs into batches and runs each job through the
/// processor.
///
/// The handle is cheap to clone; all clones drive the same engine.
pub struct Batcher<A, B> {
    inner: Arc<Inner<A, B>>,
}

impl<A, B> Clone for Batcher<A, B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A, B> std::fmt::Debug for Batcher<A, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batcher")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .field("queued", &self.queued_len())
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}

impl<A, B> Batcher<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    /// Create a batcher with one thread per processed job.
    ///
    /// Panics if `batch_size` or `frequency` is zero. Use
    /// [`Batcher::builder`] to get an error instead.
    pub fn new<F>(processor: F, frequency: Duration, batch_size: usize) -> Self
    where
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        let config = BatcherConfig {
            frequency,
            batch_size,
            ..Default::default()
        };
        if let Err(e) = config.validate() {
            panic!("{e}");
        }
        Self::from_parts(Arc::new(processor), config)
    }

    pub fn builder<F>(processor: F) -> BatcherBuilder<A, B>
    where
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        BatcherBuilder::new(Arc::new(processor))
    }

    /// `config` must already be validated.
    pub(crate) fn from_parts(processor: Processor<A, B>, config: BatcherConfig) -> Self {
        let (submitted_tx, submitted_rx) = async_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = async_channel::bounded(1);
        let tracker = Tracker::new();
        let dispatcher = Dispatcher::new(processor, config.concurrency, tracker.clone());

        Self {
            inner: Arc::new(Inner {
                config,
                shutting_down: AtomicBool::new(false),
                started: AtomicBool::new(false),
                queue: Mutex::new(VecDeque::new()),
                submitted_tx,
                submitted_rx,
                shutdown_tx,
                shutdown_rx,
                dispatcher,
                tracker,
            }),
        }
    }

    /// Queue a job. The returned handle yields the processor output once the
    /// job's batch has been processed.
    pub fn add_job(&self, job: Job<A>) -> Result<JobResult<B>, BatcherError> {
        let result = {
            let mut queue = self.inner.lock_queue();
            // checked under the queue lock so the drain cannot miss this job
            if self.inner.shutting_down.load(Ordering::Acquire) {
                return Err(BatcherError::SubmissionRejected);
            }
            let (result, result_tx) = JobResult::new(job.id);
            queue.push_back(QueuedJob { job, result_tx });
            result
        };
        self.notify_submitted();
        Ok(result)
    }

    /// Queue several jobs at once, preserving their order. Either all jobs
    /// are admitted or none.
    pub fn add_jobs<I>(&self, jobs: I) -> Result<Vec<JobResult<B>>, BatcherError>
    where
        I: IntoIterator<Item = Job<A>>,
    {
        // caller code must not run under the queue lock
        let jobs: Vec<Job<A>> = jobs.into_iter().collect();
        let results = {
            let mut queue = self.inner.lock_queue();
            if self.inner.shutting_down.load(Ordering::Acquire) {
                return Err(BatcherError::SubmissionRejected);
            }
            let results: Vec<JobResult<B>> = jobs
                .into_iter()
                .map(|job| {
                    let (result, result_tx) = JobResult::new(job.id);
                    queue.push_back(QueuedJob { job, result_tx });
                    result
                })
                .collect();
            results
        };
        self.notify_submitted();
        Ok(results)
    }

    fn notify_submitted(&self) {
        // a full slot means the scheduler has a wakeup pending already
        let _ = self.inner.submitted_tx.try_send(());
    }

    /// Run the scheduler loop on the current thread until the shutdown
    /// drain is done.
    ///
    /// Only the first call runs the loop. Later calls log a warning and
    /// return immediately.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            warn!("Scheduler loop already started, ignoring start()");
            return;
        }
        self.inner.tracker.set_state(EngineState::Running);
        futures::executor::block_on(scheduler::scheduler_loop(&self.inner));
    }

    /// Run [`Batcher::start`] on a dedicated thread.
    pub fn spawn(&self) -> std::io::Result<JoinHandle<()>> {
        let batcher = self.clone();
        thread::Builder::new()
            .name("microbatch-scheduler".into())
            .spawn(move || batcher.start())
    }

    /// Stop admitting jobs and let the scheduler drain the queue. Does not
    /// wait for the drain. Calling it again has no effect.
    pub fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::AcqRel) {
            debug!("Shutdown already requested");
            return;
        }
        info!("Shutting down batcher");
        self.inner.shutdown_tx.close();
    }

    /// Block until the scheduler has drained and every dispatched job has
    /// finished. Never returns if the scheduler was not started.
    pub fn wait_until_finished(&self) {
        self.inner.tracker.wait_until_finished();
        self.inner.dispatcher.join_workers();
    }
}

impl<A, B> Batcher<A, B> {
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }

    pub fn state(&self) -> EngineState {
        self.inner.tracker.state()
    }

    /// Number of jobs waiting to be flushed.
    pub fn queued_len(&self) -> usize {
        self.inner.lock_queue().len()
    }

    /// Number of processor invocations dispatched but not finished.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.in_flight()
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.inner.config
    }
}
