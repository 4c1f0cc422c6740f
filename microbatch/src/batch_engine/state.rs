// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Lifecycle of a batcher. It only moves forward.
#[derive(Clone, Debug, Copy, PartialOrd, Ord, PartialEq, Eq)]
pub enum EngineState {
    /// Built, scheduler loop not started yet
    Created,
    /// Scheduler loop is running
    Running,
    /// Final drain dispatched, scheduler loop has exited
    Stopped,
}

#[derive(Debug)]
struct Progress {
    state: EngineState,
    in_flight: usize,
}

/// Shared lifecycle state plus the number of processor invocations that
/// have been dispatched but not finished.
#[derive(Debug, Clone)]
pub(crate) struct Tracker {
    sync_state: Arc<(Mutex<Progress>, Condvar)>,
}

impl Tracker {
    pub(crate) fn new() -> Self {
        Self {
            sync_state: Arc::new((
                Mutex::new(Progress {
                    state: EngineState::Created,
                    in_flight: 0,
                }),
                Condvar::new(),
            )),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.sync_state
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> EngineState {
        self.lock().state
    }

    pub(crate) fn set_state(&self, new_state: EngineState) {
        let (_, cvar) = &*self.sync_state;
        let mut progress = self.lock();
        if new_state > progress.state {
            progress.state = new_state;
        }
        cvar.notify_all();
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Count one invocation as running until the returned guard is dropped.
    pub(crate) fn begin_invocation(&self) -> InFlightGuard {
        self.lock().in_flight += 1;
        InFlightGuard {
            tracker: self.clone(),
        }
    }

    /// Block until the state is `Stopped` and no invocation is running.
    pub(crate) fn wait_until_finished(&self) {
        // pattern is described on https://doc.rust-lang.org/stable/std/sync/struct.Condvar.html
        let (_, cvar) = &*self.sync_state;
        let mut progress = self.lock();
        while progress.state < EngineState::Stopped || progress.in_flight > 0 {
            progress = cvar
                .wait(progress)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Decrements the in-flight count on drop, also when the processor panics.
#[derive(Debug)]
pub(crate) struct InFlightGuard {
    tracker: Tracker,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let (_, cvar) = &*self.tracker.sync_state;
        let mut progress = self.tracker.lock();
        progress.in_flight -= 1;
        if progress.in_flight == 0 {
            cvar.notify_all();
        }
    }
}
