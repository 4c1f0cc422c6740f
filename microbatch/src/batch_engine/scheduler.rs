// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::atomic::Ordering;

use async_io::Timer;
use futures::{FutureExt, StreamExt};
use log::{debug, info};

use crate::batch_engine::state::EngineState;
use crate::batch_engine::Inner;

/// What woke the scheduler up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wakeup {
    Shutdown,
    Tick,
    Submitted,
}

/// The control loop of a batcher. Returns after the shutdown drain.
///
/// Sleeps until one of three things happens: shutdown was requested, the
/// flush timer fired, or a job was submitted. Shutdown wins when several
/// are ready at once.
pub(crate) async fn scheduler_loop<A, B>(inner: &Inner<A, B>)
where
    A: Send + 'static,
    B: Send + 'static,
{
    let frequency = inner.config.frequency;
    let batch_size = inner.config.batch_size;
    let mut timer = Timer::interval(frequency);
    info!(
        "Starting scheduler loop (batch size {}, frequency {:?})",
        batch_size, frequency
    );

    loop {
        let wakeup = futures::select_biased! {
            _ = inner.shutdown_rx.recv().fuse() => Wakeup::Shutdown,
            _ = timer.next().fuse() => Wakeup::Tick,
            _ = inner.submitted_rx.recv().fuse() => Wakeup::Submitted,
        };

        if wakeup == Wakeup::Tick && !inner.shutting_down.load(Ordering::Acquire) {
            let batch = inner.take_all();
            if !batch.is_empty() {
                debug!("Timer flush of {} jobs", batch.len());
            }
            inner.dispatcher.dispatch(batch);
        }

        if inner.shutting_down.load(Ordering::Acquire) {
            let batch = inner.take_all();
            info!("Shutdown requested, draining {} queued jobs", batch.len());
            inner.dispatcher.dispatch(batch);
            break;
        }

        while let Some(batch) = inner.take_batch(batch_size) {
            debug!("Size flush of {} jobs", batch.len());
            inner.dispatcher.dispatch(batch);
            timer.set_interval(frequency);
        }
    }

    drop(timer);
    inner.dispatcher.close();
    inner.tracker.set_state(EngineState::Stopped);
    info!("Scheduler loop ended");
}
