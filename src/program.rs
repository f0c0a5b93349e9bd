//! The program contract the core consumes.
//!
//! The surface syntax that lets user code express programs as
//! coroutine-like sequences of yields is out of scope; the core only
//! sees this trait. A concrete front end would implement it with native
//! coroutines/fibers, a stackless CPS transform, or an interpreted ANF
//! representation — the machine treats it opaquely.

use crate::value::{Effect, Value};
use std::fmt;

/// A program: an opaque object that can be turned into a suspended
/// computation. Cheap to construct; all the real work happens once
/// `to_suspended` is called.
pub trait Program {
    fn to_suspended(self: Box<Self>) -> Box<dyn SuspendedComputation>;
}

/// The outcome of advancing a suspended computation by one
/// `start`/`send`/`throw` call.
pub enum StepOutcome {
    Yield(Yielded),
    Return(Value),
    Error(Value),
}

/// A suspended user or handler computation, paused at a yield point.
/// Mirrors a host language's generator `start`/`send`/`throw`/`close`
/// protocol.
pub trait SuspendedComputation {
    fn start(&mut self) -> StepOutcome;
    fn send(&mut self, value: Value) -> StepOutcome;
    fn throw(&mut self, error: Value) -> StepOutcome;

    /// Best-effort finalization; no side effects are guaranteed and any
    /// panic/error from it must be absorbed by the caller.
    fn close(&mut self) {}
}

/// Classification of a yielded value.
pub enum Yielded {
    /// One of the control primitives understood natively by Level 2.
    Primitive(crate::primitives::ControlPrimitive),
    /// A nested program: monadic bind into the enclosing `Return` frame.
    Program(Box<dyn Program>),
    /// An effect object: starts a new dispatch.
    Effect(Effect),
}

impl fmt::Debug for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Yield(_) => write!(f, "Yield(..)"),
            StepOutcome::Return(v) => write!(f, "Return({v:?})"),
            StepOutcome::Error(v) => write!(f, "Error({v:?})"),
        }
    }
}

/// A program built from a single `FnOnce` closure producing an
/// immediate value with no yields. Handy for tests and for trivial
/// handler return clauses.
pub struct PureProgram(Option<Value>);

impl PureProgram {
    pub fn new(value: Value) -> Self {
        PureProgram(Some(value))
    }
}

impl Program for PureProgram {
    fn to_suspended(self: Box<Self>) -> Box<dyn SuspendedComputation> {
        self
    }
}

impl SuspendedComputation for PureProgram {
    fn start(&mut self) -> StepOutcome {
        StepOutcome::Return(self.0.take().unwrap_or(Value::Unit))
    }

    fn send(&mut self, _value: Value) -> StepOutcome {
        StepOutcome::Error(Value::str("PureProgram has no yield points to resume"))
    }

    fn throw(&mut self, error: Value) -> StepOutcome {
        StepOutcome::Error(error)
    }
}
