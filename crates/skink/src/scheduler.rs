//! Run scheduler: at most one run executes against an engine at a time.
//!
//! The async mutex is the engine's only lock. A run acquires it, installs its
//! per-run context (overlay globals, features, governor), and the guard
//! removes the context on every exit path, so per-run state never leaks into
//! the next run even on failure. Synchronous runs refuse to wait: submitting
//! one while an async run holds the gate is an immediate error.

use std::{cell::RefCell, rc::Rc};

use futures::lock::{Mutex, MutexGuard};

use crate::{
    interp::{EngineState, RunCtx},
    resource::RunStats,
};

/// The engine's serialization gate. FIFO by acquisition order: overlapping
/// async runs commit in the order they reached the mutex.
pub(crate) struct RunGate {
    mutex: Mutex<()>,
}

impl RunGate {
    pub(crate) fn new() -> Self {
        Self { mutex: Mutex::new(()) }
    }

    pub(crate) async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock().await
    }

    /// Non-blocking acquisition for synchronous runs.
    pub(crate) fn try_acquire(&self) -> Option<MutexGuard<'_, ()>> {
        self.mutex.try_lock()
    }
}

/// Removes the per-run context when the run ends, however it ends, and
/// carries the final counters back into the engine totals.
pub(crate) struct RunCtxGuard {
    state: Rc<RefCell<EngineState>>,
    stats: Option<RunStats>,
}

impl RunCtxGuard {
    pub(crate) fn new(state: Rc<RefCell<EngineState>>, ctx: RunCtx) -> Self {
        state.borrow_mut().run = Some(ctx);
        Self { state, stats: None }
    }

    /// Tears down the run context early and reports this run's counters.
    pub(crate) fn finish(&mut self) -> RunStats {
        if let Some(stats) = self.stats {
            return stats;
        }
        let mut st = self.state.borrow_mut();
        let stats = match st.run.take() {
            Some(run) => {
                st.totals = run.governor.totals;
                run.governor.stats()
            }
            None => RunStats::default(),
        };
        self.stats = Some(stats);
        stats
    }
}

impl Drop for RunCtxGuard {
    fn drop(&mut self) {
        self.finish();
    }
}
