//! Level 2 — the effect dispatcher.
//!
//! Sits above the pure Level 1 stepper: it owns everything `cesk_step`
//! refuses to look at — `WithHandler`/`Dispatching` frames and
//! `EffectYield` control values. Every rule below does exactly one
//! elementary transition, same granularity as `cesk_step`, so the driver
//! loop can keep calling `level2_step` until it gets `Done`/`Failed`.

use crate::dispatch::start_dispatch;
use crate::error::MachineError;
use crate::frame::{Frame, HandlerRef};
use crate::level1::cesk_step;
use crate::primitives::{self, find_owning_with_handler, ControlPrimitive, PrimitiveOutcome};
use crate::program::Yielded;
use crate::state::{Control, State};
use crate::step::Step;

/// `level2_step(state)`. Applies the four rules in order; falls
/// through to `cesk_step` when none apply.
pub fn level2_step(state: State) -> Step {
    match &state.control {
        Control::Value(_) => match classify_top(&state) {
            TopKind::WithHandler => exit_handler_scope(state),
            TopKind::DispatchingFresh => invoke_current_handler(state),
            TopKind::DispatchingUnhandled => unhandled(state),
            TopKind::DispatchingAbandoned => abandon(state),
            TopKind::Other => cesk_step(state),
        },
        Control::EffectYield(_) => dispatch_yielded(state),
        _ => cesk_step(state),
    }
}

enum TopKind {
    WithHandler,
    DispatchingFresh,
    DispatchingUnhandled,
    DispatchingAbandoned,
    Other,
}

fn classify_top(state: &State) -> TopKind {
    match state.k.top() {
        Some(Frame::WithHandler(_)) => TopKind::WithHandler,
        Some(Frame::Dispatching(d)) => {
            if d.started {
                TopKind::DispatchingAbandoned
            } else if d.idx < 0 {
                TopKind::DispatchingUnhandled
            } else {
                TopKind::DispatchingFresh
            }
        }
        _ => TopKind::Other,
    }
}

/// Rule 1: a value flowing past a handler scope boundary just pops it.
fn exit_handler_scope(mut state: State) -> Step {
    state.k.pop();
    Step::Continue(state)
}

/// Rule 2a: a fresh dispatch frame invokes its current handler.
fn invoke_current_handler(mut state: State) -> Step {
    let (effect, handler) = match state.k.top_mut() {
        Some(Frame::Dispatching(d)) => {
            let handler = match d.current_handler() {
                Some(h) => h.handler.clone(),
                None => {
                    return Step::Failed(MachineError::invariant(
                        "level2_step: fresh Dispatching frame has no current handler",
                    ))
                }
            };
            d.started = true;
            (d.effect.clone(), handler)
        }
        _ => {
            return Step::Failed(MachineError::invariant(
                "level2_step: expected a Dispatching frame on top",
            ))
        }
    };
    state.control = Control::Program(handler.invoke(&effect));
    Step::Continue(state)
}

/// Rule 2b: no handler was visible at all. `start_dispatch` normally
/// reports this without ever pushing a frame; this path only exists to
/// keep a literal `idx == -1` Dispatching frame well-defined.
fn unhandled(mut state: State) -> Step {
    let tag = match state.k.pop() {
        Some(Frame::Dispatching(d)) => d.effect.tag,
        _ => return Step::Failed(MachineError::invariant("level2_step: expected a Dispatching frame on top")),
    };
    state.control = Control::Error(MachineError::UnhandledEffect { tag });
    Step::Continue(state)
}

/// Rule 2c: implicit abandonment. A started dispatch's own `Return`
/// frame vanished (the handler returned normally) while `Dispatching`
/// is still on top — the handler never resumed the captured
/// continuation. Every frame between `D` and its owning `WithHandler`
/// is closed and dropped, along with the `WithHandler` itself; the
/// handler's return value becomes the result of the whole handled
/// region.
fn abandon(mut state: State) -> Step {
    let target: HandlerRef = match state.k.top() {
        Some(Frame::Dispatching(d)) => match d.current_handler() {
            Some(h) => h.clone(),
            None => {
                return Step::Failed(MachineError::invariant(
                    "abandonment: started Dispatching frame has no current handler",
                ))
            }
        },
        _ => return Step::Failed(MachineError::invariant("abandonment: expected a Dispatching frame on top")),
    };

    let j = match find_owning_with_handler(&state.k, 0, target.id) {
        Some(j) => j,
        None => return Step::Failed(MachineError::invariant("abandonment: no matching WithHandler frame")),
    };

    tracing::debug!(handler_idx = target.id.0, "abandon");

    state.k.pop(); // D
    for _ in 0..j.saturating_sub(1) {
        if let Some(mut frame) = state.k.pop() {
            frame.close();
        }
    }
    state.k.pop(); // the owning WithHandler, scope now exited

    Step::Continue(state)
}

/// Rule 3: classify a yielded value and dispatch it.
fn dispatch_yielded(mut state: State) -> Step {
    let yielded = match std::mem::replace(&mut state.control, Control::Value(crate::value::Value::Unit)) {
        Control::EffectYield(y) => y,
        _ => unreachable!("dispatch_yielded only called for Control::EffectYield"),
    };

    match yielded {
        Yielded::Primitive(prim) => dispatch_primitive(prim, state),
        Yielded::Program(p) => {
            // Monadic bind: the enclosing Return frame is already on top
            // of K (apply_outcome pushed it before yielding). Just run
            // the nested program next; its result flows into that frame.
            state.control = Control::Program(p);
            Step::Continue(state)
        }
        Yielded::Effect(effect) => Step::Continue(start_dispatch(effect, state)),
    }
}

fn dispatch_primitive(prim: ControlPrimitive, state: State) -> Step {
    match primitives::apply(prim, state) {
        Ok(PrimitiveOutcome::Continue(state)) => Step::Continue(state),
        Ok(PrimitiveOutcome::AsyncEscape(action)) => Step::AsyncEscape(action),
        Err(e) => Step::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Kontinuation, WithHandlerFrame};
    use crate::program::{PureProgram, SuspendedComputation};
    use crate::value::{Env, Store, Value};

    struct NoopHandler;
    impl crate::frame::Handler for NoopHandler {
        fn invoke(&self, _effect: &crate::value::Effect) -> Box<dyn crate::program::Program> {
            Box::new(PureProgram::new(Value::Int(0)))
        }
    }

    fn fresh_state(control: Control) -> State {
        State {
            control,
            env: Env::new(),
            store: Store::new(),
            k: Kontinuation::new(),
        }
    }

    #[test]
    fn test_value_past_empty_k_is_not_level2_business() {
        let state = fresh_state(Control::Value(Value::Int(1)));
        match level2_step(state) {
            Step::Done(Value::Int(1)) => {}
            other => panic!("expected Done(1), got {other:?}"),
        }
    }

    #[test]
    fn test_value_pops_with_handler_frame() {
        let mut state = fresh_state(Control::Value(Value::Int(7)));
        let id = state.store.alloc_handler_id();
        state.k.push(Frame::WithHandler(WithHandlerFrame {
            handler: HandlerRef::new(id, std::rc::Rc::new(NoopHandler)),
        }));
        match level2_step(state) {
            Step::Continue(s) => {
                assert!(s.k.is_empty());
                match s.control {
                    Control::Value(Value::Int(7)) => {}
                    other => panic!("value should pass through unchanged: {other:?}"),
                }
            }
            other => panic!("expected Continue, got {other:?}"),
        }
    }

    #[test]
    fn test_effect_yield_with_no_handlers_is_unhandled() {
        let mut program = PureProgram::new(Value::Unit);
        let _ = program.start();
        let state = fresh_state(Control::EffectYield(Yielded::Effect(crate::value::Effect::new(
            "Ping",
            Value::Unit,
        ))));
        match level2_step(state) {
            Step::Continue(s) => match s.control {
                Control::Error(MachineError::UnhandledEffect { ref tag }) => assert_eq!(tag.0, "Ping"),
                other => panic!("expected UnhandledEffect, got {other:?}"),
            },
            other => panic!("expected Continue, got {other:?}"),
        }
    }
}
