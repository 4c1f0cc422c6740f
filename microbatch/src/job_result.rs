// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! Single assignment handle that carries the output of one job back to its
//! submitter.

use async_channel::{Receiver, Sender, TryRecvError};

use crate::job::JobId;

/// Returned by [`crate::Batcher::add_job`]. Written once by the invocation
/// processing the job, read any number of times by the submitter.
#[derive(Debug)]
pub struct JobResult<B> {
    job_id: JobId,
    cached: Option<B>,
    rx: Receiver<B>,
}

impl<B> JobResult<B> {
    /// Create an unresolved handle and the sender that resolves it.
    pub(crate) fn new(job_id: JobId) -> (Self, Sender<B>) {
        let (tx, rx) = async_channel::bounded(1);
        (
            Self {
                job_id,
                cached: None,
                rx,
            },
            tx,
        )
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn is_resolved(&self) -> bool {
        self.cached.is_some() || !self.rx.is_empty()
    }

    /// Block the current thread until the output is available.
    ///
    /// If the processor panicked while handling this job, the output never
    /// arrives and this call does not return.
    ///
    /// This drives its own executor and must not be called from async
    /// code; use [`JobResult::get_async`] there.
    pub fn get(&mut self) -> &B {
        futures::executor::block_on(self.get_async())
    }

    /// Async version of [`JobResult::get`].
    pub async fn get_async(&mut self) -> &B {
        if self.cached.is_none() {
            match self.rx.recv().await {
                Ok(value) => self.cached = Some(value),
                Err(_) => {
                    log::debug!("result of job {} was abandoned", self.job_id);
                    futures::future::pending::<()>().await;
                }
            }
        }
        self.cached
            .as_ref()
            .unwrap_or_else(|| unreachable!("result cached above"))
    }

    /// Return the output if it has arrived, without blocking.
    pub fn try_get(&mut self) -> Option<&B> {
        if self.cached.is_none() {
            match self.rx.try_recv() {
                Ok(value) => self.cached = Some(value),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
        self.cached.as_ref()
    }

    /// Consume the handle, blocking until the output is available. Same
    /// restriction as [`JobResult::get`] regarding async code.
    pub fn into_inner(mut self) -> B {
        self.get();
        match self.cached {
            Some(value) => value,
            None => unreachable!("get returns only after caching"),
        }
    }
}
