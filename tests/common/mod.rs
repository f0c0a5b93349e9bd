//! Shared test fixtures: a generator-shaped `Program`/`SuspendedComputation`
//! built from a plain `FnMut`, standing in for the coroutine front end this
//! crate doesn't provide.

#![allow(dead_code)]

use aeffect::{Effect, Handler, Program, StepOutcome, SuspendedComputation, Value, Yielded};

/// What the closure is resumed with, mirroring a generator's
/// `start`/`send`/`throw` protocol.
pub enum Resume {
    Start,
    Value(Value),
    Error(Value),
}

/// A `Program`/`SuspendedComputation` driven entirely by a closure. Each
/// call advances the closure's own captured state (typically a small
/// `step` counter) and returns the next `StepOutcome`.
pub struct ClosureProgram<F>(F)
where
    F: FnMut(Resume) -> StepOutcome + 'static;

impl<F> ClosureProgram<F>
where
    F: FnMut(Resume) -> StepOutcome + 'static,
{
    pub fn new(f: F) -> Self {
        ClosureProgram(f)
    }
}

impl<F> Program for ClosureProgram<F>
where
    F: FnMut(Resume) -> StepOutcome + 'static,
{
    fn to_suspended(self: Box<Self>) -> Box<dyn SuspendedComputation> {
        Box::new(ClosureSuspended(self.0))
    }
}

struct ClosureSuspended<F>(F)
where
    F: FnMut(Resume) -> StepOutcome;

impl<F> SuspendedComputation for ClosureSuspended<F>
where
    F: FnMut(Resume) -> StepOutcome,
{
    fn start(&mut self) -> StepOutcome {
        (self.0)(Resume::Start)
    }

    fn send(&mut self, value: Value) -> StepOutcome {
        (self.0)(Resume::Value(value))
    }

    fn throw(&mut self, error: Value) -> StepOutcome {
        (self.0)(Resume::Error(error))
    }
}

/// A `Program` that immediately yields the given effect and, once sent a
/// value, returns `value + 1` (every scenario's "user code").
pub fn yields_effect_then_increments(tag: &'static str) -> Box<dyn Program> {
    Box::new(ClosureProgram::new(move |r| match r {
        Resume::Start => StepOutcome::Yield(Yielded::Effect(Effect::new(tag, Value::Unit))),
        Resume::Value(v) => StepOutcome::Return(Value::Int(v.as_int().expect("expected an int") + 1)),
        Resume::Error(e) => StepOutcome::Error(e),
    }))
}

/// A `Handler` driven by a closure, one `invoke` per dispatch.
pub struct ClosureHandler<F>(F)
where
    F: Fn(&Effect) -> Box<dyn Program> + 'static;

impl<F> ClosureHandler<F>
where
    F: Fn(&Effect) -> Box<dyn Program> + 'static,
{
    pub fn new(f: F) -> Self {
        ClosureHandler(f)
    }
}

impl<F> Handler for ClosureHandler<F>
where
    F: Fn(&Effect) -> Box<dyn Program> + 'static,
{
    fn invoke(&self, effect: &Effect) -> Box<dyn Program> {
        (self.0)(effect)
    }
}
