// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use async_channel::Sender;

/// Caller assigned identifier of a job. The engine does not check uniqueness.
pub type JobId = u64;

/// A unit of work submitted to a [`crate::Batcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job<A> {
    pub id: JobId,
    pub data: A,
}

impl<A> Job<A> {
    pub fn new(id: JobId, data: A) -> Self {
        Self { id, data }
    }
}

/// A job waiting in the queue together with the slot its output goes to.
pub(crate) struct QueuedJob<A, B> {
    pub(crate) job: Job<A>,
    pub(crate) result_tx: Sender<B>,
}

impl<A, B> QueuedJob<A, B> {
    pub(crate) fn id(&self) -> JobId {
        self.job.id
    }
}

impl<A, B> std::fmt::Debug for QueuedJob<A, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedJob").field("id", &self.id()).finish()
    }
}
