//! Resource governor: per-run counters, deadline timeout, abort plumbing.
//!
//! The evaluator consults the governor at every statement boundary, every
//! loop back-edge, every function entry, and every coroutine resumption.
//! Counter breaches surface as catchable runtime errors with fixed messages;
//! deadline and abort breaches are uncatchable, since code that can catch its
//! own cancellation can outlive it.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorCategory, JsErrorKind, RunError, codes};

/// Default per-run call-depth cap applied when no limit is configured; deep
/// walker recursion maps onto the host stack, so an unbounded default is not
/// safe.
///
/// Lower in debug mode, where poll frames are substantially larger.
#[cfg(debug_assertions)]
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Default per-run call-depth cap applied when no limit is configured; deep
/// walker recursion maps onto the host stack, so an unbounded default is not
/// safe.
#[cfg(not(debug_assertions))]
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// One set of counter limits. All fields optional; `None` disables the limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Maximum function-call nesting depth.
    pub max_call_depth: Option<usize>,
    /// Maximum loop back-edges taken.
    pub max_loop_iterations: Option<usize>,
    /// Maximum evaluation steps. Policy: one step is counted per statement
    /// evaluated (not per AST node walked).
    pub max_evaluations: Option<usize>,
}

impl RunLimits {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_call_depth(mut self, limit: usize) -> Self {
        self.max_call_depth = Some(limit);
        self
    }

    #[must_use]
    pub fn max_loop_iterations(mut self, limit: usize) -> Self {
        self.max_loop_iterations = Some(limit);
        self
    }

    #[must_use]
    pub fn max_evaluations(mut self, limit: usize) -> Self {
        self.max_evaluations = Some(limit);
        self
    }
}

/// Engine configuration: per-run limits plus engine-lifetime totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub per_run: RunLimits,
    /// Mirrors of the per-run counters accumulated across every run of the
    /// engine (call entries rather than instantaneous depth).
    pub total: RunLimits,
}

/// Cumulative engine-lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TotalCounters {
    pub loop_iterations: usize,
    pub evaluations: usize,
    pub calls: usize,
}

/// Per-run counter snapshot returned by `result: Full` runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub loop_iterations: usize,
    pub evaluations: usize,
    pub max_call_depth_seen: usize,
}

/// Cooperative cancellation flag shared with the host.
///
/// The host may set it from any thread; the run observes it at the next
/// statement boundary or suspension point.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A breached limit.
#[derive(Debug, Clone)]
pub(crate) enum LimitBreach {
    CallDepth { limit: usize },
    LoopIterations { limit: usize },
    Evaluations { limit: usize },
    Timeout { limit: Duration },
    Aborted,
}

impl fmt::Display for LimitBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CallDepth { .. } => f.write_str("Maximum call depth exceeded"),
            Self::LoopIterations { .. } => f.write_str("Maximum loop iterations exceeded"),
            Self::Evaluations { .. } => f.write_str("Maximum evaluations exceeded"),
            Self::Timeout { limit } => write!(f, "Execution timed out after {limit:?}"),
            Self::Aborted => f.write_str("Execution aborted"),
        }
    }
}

impl From<LimitBreach> for RunError {
    fn from(breach: LimitBreach) -> Self {
        match breach {
            LimitBreach::Timeout { .. } => {
                Self::fatal(Error::runtime(codes::RUNTIME_TIMEOUT, breach.to_string()))
            }
            LimitBreach::Aborted => Self::fatal(Error::runtime(codes::RUNTIME_ABORTED, breach.to_string())),
            _ => Self::raised(JsErrorKind::Limit, breach.to_string(), None),
        }
    }
}

/// Per-run governor over the configured limits, the deadline, and the abort
/// signal, feeding the engine-total mirrors as it counts.
#[derive(Debug)]
pub(crate) struct Governor {
    per_run: RunLimits,
    total: RunLimits,
    stats: RunStats,
    call_depth: usize,
    totals_start: TotalCounters,
    pub totals: TotalCounters,
    deadline: Option<(Instant, Duration)>,
    abort: AbortSignal,
}

impl Governor {
    pub(crate) fn new(per_run: RunLimits, total: RunLimits, totals: TotalCounters, abort: AbortSignal) -> Self {
        let per_run = RunLimits {
            max_call_depth: per_run.max_call_depth.or(Some(DEFAULT_MAX_CALL_DEPTH)),
            ..per_run
        };
        Self {
            per_run,
            total,
            stats: RunStats::default(),
            call_depth: 0,
            totals_start: totals,
            totals,
            deadline: None,
            abort,
        }
    }

    pub(crate) fn set_deadline(&mut self, timeout: Duration) {
        self.deadline = Some((Instant::now() + timeout, timeout));
    }

    pub(crate) fn stats(&self) -> RunStats {
        self.stats
    }

    /// Statement-boundary check: evaluation counters, deadline, abort.
    pub(crate) fn on_statement(&mut self) -> Result<(), LimitBreach> {
        self.stats.evaluations += 1;
        self.totals.evaluations += 1;
        if let Some(limit) = self.per_run.max_evaluations
            && self.stats.evaluations > limit
        {
            return Err(LimitBreach::Evaluations { limit });
        }
        if let Some(limit) = self.total.max_evaluations
            && self.totals.evaluations > limit
        {
            return Err(LimitBreach::Evaluations { limit });
        }
        self.check_interrupt()
    }

    /// Loop back-edge check.
    pub(crate) fn on_loop_back_edge(&mut self) -> Result<(), LimitBreach> {
        self.stats.loop_iterations += 1;
        self.totals.loop_iterations += 1;
        if let Some(limit) = self.per_run.max_loop_iterations
            && self.stats.loop_iterations > limit
        {
            return Err(LimitBreach::LoopIterations { limit });
        }
        if let Some(limit) = self.total.max_loop_iterations
            && self.totals.loop_iterations > limit
        {
            return Err(LimitBreach::LoopIterations { limit });
        }
        self.check_interrupt()
    }

    /// Function-entry check; pair with [`Self::exit_call`].
    pub(crate) fn enter_call(&mut self) -> Result<(), LimitBreach> {
        self.totals.calls += 1;
        if let Some(limit) = self.total.max_call_depth
            && self.totals.calls > limit
        {
            return Err(LimitBreach::CallDepth { limit });
        }
        if let Some(limit) = self.per_run.max_call_depth
            && self.call_depth >= limit
        {
            return Err(LimitBreach::CallDepth { limit });
        }
        self.call_depth += 1;
        self.stats.max_call_depth_seen = self.stats.max_call_depth_seen.max(self.call_depth);
        Ok(())
    }

    pub(crate) fn exit_call(&mut self) {
        self.call_depth = self.call_depth.saturating_sub(1);
    }

    /// Deadline and abort check, also run on every coroutine resumption.
    pub(crate) fn check_interrupt(&self) -> Result<(), LimitBreach> {
        if self.abort.is_aborted() {
            return Err(LimitBreach::Aborted);
        }
        if let Some((deadline, limit)) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(LimitBreach::Timeout { limit });
        }
        Ok(())
    }

    /// Totals accumulated by this run alone (for reporting).
    pub(crate) fn run_delta(&self) -> TotalCounters {
        TotalCounters {
            loop_iterations: self.totals.loop_iterations - self.totals_start.loop_iterations,
            evaluations: self.totals.evaluations - self.totals_start.evaluations,
            calls: self.totals.calls - self.totals_start.calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor(per_run: RunLimits) -> Governor {
        Governor::new(per_run, RunLimits::default(), TotalCounters::default(), AbortSignal::new())
    }

    #[test]
    fn loop_limit_trips_on_excess_back_edges() {
        let mut gov = governor(RunLimits::new().max_loop_iterations(2));
        assert!(gov.on_loop_back_edge().is_ok());
        assert!(gov.on_loop_back_edge().is_ok());
        let err = gov.on_loop_back_edge().unwrap_err();
        assert_eq!(err.to_string(), "Maximum loop iterations exceeded");
    }

    #[test]
    fn call_depth_is_instantaneous() {
        let mut gov = governor(RunLimits::new().max_call_depth(2));
        gov.enter_call().unwrap();
        gov.enter_call().unwrap();
        assert!(gov.enter_call().is_err());
        gov.exit_call();
        assert!(gov.enter_call().is_ok());
    }

    #[test]
    fn abort_signal_is_observed_at_checks() {
        let abort = AbortSignal::new();
        let mut gov = Governor::new(RunLimits::default(), RunLimits::default(), TotalCounters::default(), abort.clone());
        assert!(gov.on_statement().is_ok());
        abort.abort();
        assert!(matches!(gov.on_statement(), Err(LimitBreach::Aborted)));
    }

    #[test]
    fn total_counters_accumulate_across_runs() {
        let mut totals = TotalCounters::default();
        for _ in 0..2 {
            let mut gov = Governor::new(
                RunLimits::default(),
                RunLimits::new().max_evaluations(5),
                totals,
                AbortSignal::new(),
            );
            for _ in 0..2 {
                gov.on_statement().unwrap();
            }
            totals = gov.totals;
        }
        assert_eq!(totals.evaluations, 4);
    }
}
