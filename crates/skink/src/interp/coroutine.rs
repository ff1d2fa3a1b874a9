//! Coroutine plumbing: the resume cell shared between a suspended generator
//! body and its driver, plus the suspension future `yield` compiles down to.
//!
//! A generator body is an ordinary walker future. `yield` parks a value in
//! the cell and returns `Poll::Pending` once; the driver notices the parked
//! value, hands it to the caller, and on the next `next`/`return`/`throw`
//! writes a [`ResumeMode`] into the cell and polls the body again. Forced
//! returns travel through the evaluator as an uncatchable-by-catch error so
//! intervening `finally` blocks still unwind.

use std::{
    cell::RefCell,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use crate::{
    error::{RunError, RunResult},
    value::Value,
};

/// How a suspended generator is being resumed.
#[derive(Debug)]
pub(crate) enum ResumeMode {
    /// `next(v)`: `v` becomes the value of the suspended `yield` expression.
    Next(Value),
    /// `throw(e)`: the `yield` completes by throwing `e`.
    Throw(Value),
    /// `return(v)`: force-complete, unwinding `finally` blocks.
    Return(Value),
}

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Idle,
    /// Body → driver: a `yield` surfaced with this value.
    Yielded(Value),
    /// Driver → body: resume instruction.
    Resume(ResumeMode),
}

/// The cell a generator body and its driver communicate through.
#[derive(Debug, Default)]
pub(crate) struct CoroutineChannel {
    slot: RefCell<Slot>,
}

impl CoroutineChannel {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Driver side: collects a value parked by `yield`, if any.
    pub(crate) fn take_yielded(&self) -> Option<Value> {
        let mut slot = self.slot.borrow_mut();
        if matches!(*slot, Slot::Yielded(_)) {
            match std::mem::take(&mut *slot) {
                Slot::Yielded(value) => Some(value),
                _ => unreachable!(),
            }
        } else {
            None
        }
    }

    /// Driver side: stores the resume instruction for the parked body.
    pub(crate) fn set_resume(&self, mode: ResumeMode) {
        *self.slot.borrow_mut() = Slot::Resume(mode);
    }
}

/// The future a `yield` expression awaits: parks the value, suspends once,
/// and resolves to the driver's resume instruction.
pub(crate) struct YieldPoint {
    channel: Rc<CoroutineChannel>,
    to_park: Option<Value>,
}

impl YieldPoint {
    pub(crate) fn new(channel: Rc<CoroutineChannel>, value: Value) -> Self {
        Self {
            channel,
            to_park: Some(value),
        }
    }
}

impl Future for YieldPoint {
    type Output = ResumeMode;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(value) = self.to_park.take() {
            *self.channel.slot.borrow_mut() = Slot::Yielded(value);
            return Poll::Pending;
        }
        let mut slot = self.channel.slot.borrow_mut();
        match std::mem::take(&mut *slot) {
            Slot::Resume(mode) => Poll::Ready(mode),
            other => {
                // Spurious poll (the body future was polled by an outer
                // runtime before the driver resumed us): park the state back.
                *slot = other;
                Poll::Pending
            }
        }
    }
}

/// Converts a resume instruction into the completion of a plain `yield`.
pub(crate) fn resume_to_result(mode: ResumeMode) -> RunResult<Value> {
    match mode {
        ResumeMode::Next(value) => Ok(value),
        ResumeMode::Throw(value) => Err(RunError::throw(value, None)),
        ResumeMode::Return(value) => Err(RunError::ForcedReturn(value)),
    }
}
