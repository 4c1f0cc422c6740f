// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Micro-batching engine.
//!
//! Jobs submitted through [`Batcher::add_job`] are collected in a queue and
//! flushed in batches, either as soon as `batch_size` jobs are waiting or
//! every `frequency`, whichever comes first. Every job of a batch is run
//! through the processor concurrently and its output is delivered through
//! the [`JobResult`] returned at submission.
//!
//! ```no_run
//! use std::time::Duration;
//! use microbatch::{Batcher, Job};
//!
//! let batcher = Batcher::new(|s: String| s.to_uppercase(), Duration::from_secs(5), 2);
//! let scheduler = batcher.spawn().unwrap();
//!
//! let mut result = batcher.add_job(Job::new(1, "input".to_string())).unwrap();
//! assert_eq!(result.get(), "INPUT");
//!
//! batcher.shutdown();
//! scheduler.join().unwrap();
//! ```

pub mod batch_engine;
pub mod config;
pub mod error;
pub mod job;
pub mod job_result;

pub use batch_engine::{Batcher, BatcherBuilder, EngineState};
pub use config::{BatcherConfig, Concurrency};
pub use error::BatcherError;
pub use job::{Job, JobId};
pub use job_result::JobResult;
