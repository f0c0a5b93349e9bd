//! Property tests for determinism and for bounded frame-popping. Kept as
//! an internal test module (rather than an integration test) since both
//! properties need direct access to `Kontinuation`/`Frame`, which are
//! not part of the public surface.

use crate::frame::{Frame, HandlerRef, Kontinuation, WithHandlerFrame};
use crate::level2::level2_step;
use crate::program::Program;
use crate::state::{Control, State};
use crate::step::Step;
use crate::value::{Effect, Env, Store, Value};
use proptest::prelude::*;
use std::rc::Rc;

struct NoopHandler;
impl crate::frame::Handler for NoopHandler {
    fn invoke(&self, _effect: &Effect) -> Box<dyn Program> {
        unreachable!("NoopHandler is never invoked by these properties")
    }
}

fn state_with_handler_stack(depth: usize, value: i64) -> State {
    let mut state = State {
        control: Control::Value(Value::Int(value)),
        env: Env::new(),
        store: Store::new(),
        k: Kontinuation::new(),
    };
    for _ in 0..depth {
        let id = state.store.alloc_handler_id();
        state.k.push(Frame::WithHandler(WithHandlerFrame {
            handler: HandlerRef::new(id, Rc::new(NoopHandler)),
        }));
    }
    state
}

fn describe_step(step: Step) -> String {
    match step {
        Step::Continue(s) => format!("Continue(control={:?}, k={:?})", s.control, s.k),
        Step::Done(v) => format!("Done({v:?})"),
        Step::Failed(e) => format!("Failed({e})"),
        Step::AsyncEscape(_) => "AsyncEscape".to_string(),
    }
}

proptest! {
    /// `level2_step` is pure — two states built identically from the
    /// same parameters step to structurally identical outcomes.
    #[test]
    fn test_step_is_deterministic(depth in 0usize..8, value in any::<i64>()) {
        let a = state_with_handler_stack(depth, value);
        let b = state_with_handler_stack(depth, value);
        prop_assert_eq!(describe_step(level2_step(a)), describe_step(level2_step(b)));
    }

    /// A single step never drops more than one frame off K outside of
    /// natural completion. Here the only applicable rule is "value exits
    /// a handler scope", which pops exactly one `WithHandler` frame.
    #[test]
    fn test_step_drops_at_most_one_frame(depth in 1usize..8, value in any::<i64>()) {
        let before = depth;
        let state = state_with_handler_stack(depth, value);
        match level2_step(state) {
            Step::Continue(s) => prop_assert_eq!(s.k.len(), before - 1),
            other => prop_assert!(false, "expected Continue, got {}", describe_step(other)),
        }
    }
}
