// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::time::Duration;

use crate::batch_engine::dispatcher::Processor;
use crate::batch_engine::Batcher;
use crate::config::{BatcherConfig, Concurrency};
use crate::error::BatcherError;

/// Builds a [`Batcher`] and reports invalid settings as errors.
pub struct BatcherBuilder<A, B> {
    processor: Processor<A, B>,
    config: BatcherConfig,
}

impl<A, B> BatcherBuilder<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    pub(crate) fn new(processor: Processor<A, B>) -> Self {
        Self {
            processor,
            config: BatcherConfig::default(),
        }
    }

    /// Replace all settings at once, e.g. with a config loaded from a file.
    pub fn config(mut self, config: BatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn frequency(mut self, frequency: Duration) -> Self {
        self.config.frequency = frequency;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn concurrency(mut self, concurrency: Concurrency) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Shorthand for `concurrency(Concurrency::Bounded(workers))`.
    pub fn workers(self, workers: usize) -> Self {
        self.concurrency(Concurrency::Bounded(workers))
    }

    pub fn build(self) -> Result<Batcher<A, B>, BatcherError> {
        self.config.validate()?;
        Ok(Batcher::from_parts(self.processor, self.config))
    }
}
