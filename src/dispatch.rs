//! The dispatch engine: handler lookup and dispatch startup.

use crate::error::MachineError;
use crate::frame::{DispatchingFrame, Frame, HandlerRef};
use crate::state::{Control, State};
use crate::value::{Effect, Value};
use std::rc::Rc;

/// `visibleHandlers(K)`.
///
/// Walks K from top to bottom collecting handlers from every
/// `WithHandler` frame. Stops at the first `Dispatching` frame `D`
/// encountered: the result is then `D.handlers[0..D.idx) ++ buffer`,
/// i.e. the handlers visible to the enclosing dispatch below its own
/// (and any more-inner) handler, plus whatever was installed above it.
/// If no `Dispatching` frame is found, the result is just `buffer`.
///
/// Order convention: index 0 = outermost, `len - 1` = innermost.
pub fn visible_handlers(k: &crate::frame::Kontinuation) -> Vec<HandlerRef> {
    let mut buffer: Vec<HandlerRef> = Vec::new();
    for frame in k.iter_top_down() {
        match frame {
            Frame::WithHandler(wh) => buffer.push(wh.handler.clone()),
            Frame::Dispatching(d) => {
                let outer = &d.handlers[0..busy_boundary(d)];
                // `buffer` was collected top-to-bottom (innermost-first);
                // reverse it so the combined order is outermost-first.
                buffer.reverse();
                let mut result = outer.to_vec();
                result.extend(buffer);
                return result;
            }
            Frame::Return(_) => {}
        }
    }
    buffer.reverse();
    buffer
}

/// The busy-boundary index: handlers at `D.idx` and beyond are excluded
/// from nested dispatch, since `D.idx`'s handler is currently executing.
fn busy_boundary(d: &DispatchingFrame) -> usize {
    if d.idx < 0 {
        0
    } else {
        d.idx as usize
    }
}

/// `start_dispatch(effect, state)`.
pub fn start_dispatch(effect: Effect, mut state: State) -> State {
    let handlers = visible_handlers(&state.k);
    if handlers.is_empty() {
        state.control = Control::Error(MachineError::UnhandledEffect { tag: effect.tag });
        return state;
    }
    let idx = handlers.len() as isize - 1;
    tracing::debug!(tag = %effect.tag, handler_idx = idx, "dispatch start");
    state.k.push(Frame::Dispatching(DispatchingFrame {
        effect,
        idx,
        handlers: Rc::new(handlers),
        started: false,
        captured: false,
    }));
    state.control = Control::Value(Value::Unit);
    state
}
