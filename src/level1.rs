//! Level 1 — the pure CESK stepper.
//!
//! Total relative to its precondition: never inspects effect payloads,
//! handlers, or dispatch frames. `level2_step` delegates here whenever
//! the top of K is a `Return` frame (or empty).

use crate::error::MachineError;
use crate::frame::Frame;
use crate::program::StepOutcome;
use crate::state::{Control, State};
use crate::step::Step;

/// Precondition: `state.control` is `Program`, `Value`, or `Error`, and
/// if K is non-empty, `K[0]` is a `Return` frame. Violating the
/// frame-kind half of the precondition is an `InvariantViolation`;
/// `level2_step` is responsible for routing so that never happens in
/// practice.
pub fn cesk_step(state: State) -> Step {
    match state.control {
        Control::Program(_) => step_program(state),
        Control::Value(_) => step_into_return(state, Incoming::Value),
        Control::Error(_) => step_into_return(state, Incoming::Error),
        Control::EffectYield(_) => {
            // Level 2 consumes this within the same overall step; Level 1
            // leaves the state untouched.
            Step::Continue(state)
        }
    }
}

fn step_program(mut state: State) -> Step {
    let program = match std::mem::replace(&mut state.control, Control::Value(crate::value::Value::Unit)) {
        Control::Program(p) => p,
        _ => unreachable!("step_program only called for Control::Program"),
    };
    let mut suspended = program.to_suspended();
    let outcome = suspended.start();
    apply_outcome(state, outcome, suspended)
}

/// Discriminates which half of `step_into_return` produced the final
/// value, so `Control::Value`/`Control::Error` can share the "pop a
/// `Return` frame and send/throw into it" logic.
enum Incoming {
    Value,
    Error,
}

fn step_into_return(mut state: State, kind: Incoming) -> Step {
    let control = std::mem::replace(&mut state.control, Control::Value(crate::value::Value::Unit));

    match state.k.pop() {
        None => {
            state.control = control;
            finish(state)
        }
        Some(Frame::Return(mut suspended)) => {
            let outcome = match (kind, control) {
                (Incoming::Value, Control::Value(v)) => suspended.send(v),
                (Incoming::Error, Control::Error(e)) => suspended.throw(error_to_value(e)),
                _ => unreachable!("control kind matches the Incoming discriminant"),
            };
            apply_outcome(state, outcome, suspended)
        }
        Some(other) => {
            // Level 2 should have handled this frame kind before it got here.
            state.k.push(other);
            state.control = control;
            Step::Failed(MachineError::invariant(
                "cesk_step: K[0] was not a Return frame",
            ))
        }
    }
}

/// Applies a `start`/`send`/`throw` outcome, pushing, replacing, or
/// popping the `Return` frame depending on whether the computation
/// yielded, returned, or errored.
fn apply_outcome(
    mut state: State,
    outcome: StepOutcome,
    suspended: Box<dyn crate::program::SuspendedComputation>,
) -> Step {
    match outcome {
        StepOutcome::Yield(y) => {
            state.k.push(Frame::Return(suspended));
            state.control = Control::EffectYield(y);
            Step::Continue(state)
        }
        StepOutcome::Return(v) => {
            // No Return frame pushed/kept for a completed computation.
            state.control = Control::Value(v);
            Step::Continue(state)
        }
        StepOutcome::Error(e) => {
            state.control = Control::Error(MachineError::HandlerUserError(e));
            Step::Continue(state)
        }
    }
}

fn finish(state: State) -> Step {
    match state.control {
        Control::Value(v) => Step::Done(v),
        Control::Error(e) => Step::Failed(e),
        _ => unreachable!("finish only called for Value/Error"),
    }
}

fn error_to_value(e: MachineError) -> crate::value::Value {
    match e {
        MachineError::HandlerUserError(v) => v,
        other => crate::value::Value::str(other.to_string()),
    }
}
