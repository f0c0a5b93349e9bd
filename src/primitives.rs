//! Control primitives.
//!
//! Each primitive is a pure transition on `(C, E, S, K)`. None of them
//! call user code directly — they only rearrange frames and set
//! `Control`.

use crate::error::MachineError;
use crate::frame::{from_top, DispatchingFrame, Frame, HandlerRef, WithHandlerFrame};
use crate::handler::{Continuation, ResumedPayload};
use crate::program::Program;
use crate::state::{Control, State};
use crate::step::AsyncAction;
use crate::value::{Effect, Value};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

/// An opaque, value-producing async thunk handed to `AsyncEscape`.
pub struct AsyncThunk(pub Pin<Box<dyn Future<Output = Value>>>);

/// The handler-primitive surface a yielded value may carry.
pub enum ControlPrimitive {
    WithHandler(Rc<dyn Handler>, Box<dyn Program>),
    Resume(Value),
    Forward(Option<Effect>),
    Delegate(Option<Effect>),
    GetContinuation,
    CreateContinuation(Box<dyn Program>, Vec<Rc<dyn Handler>>),
    ResumeContinuation(Continuation, Value),
    GetHandlers,
    AsyncEscape(AsyncThunk),
}

pub use crate::frame::Handler;

/// What applying a primitive yields: either the machine keeps stepping
/// (with `Control` already set appropriately), or it escapes to the
/// async driver.
pub enum PrimitiveOutcome {
    Continue(State),
    AsyncEscape(AsyncAction),
}

pub fn apply(prim: ControlPrimitive, state: State) -> Result<PrimitiveOutcome, MachineError> {
    match prim {
        ControlPrimitive::WithHandler(h, p) => Ok(PrimitiveOutcome::Continue(with_handler(h, p, state))),
        ControlPrimitive::Resume(v) => resume(v, state).map(PrimitiveOutcome::Continue),
        ControlPrimitive::Forward(e) => forward(e, state, false).map(PrimitiveOutcome::Continue),
        ControlPrimitive::Delegate(e) => forward(e, state, true).map(PrimitiveOutcome::Continue),
        ControlPrimitive::GetContinuation => get_continuation(state).map(PrimitiveOutcome::Continue),
        ControlPrimitive::CreateContinuation(p, hs) => {
            Ok(PrimitiveOutcome::Continue(create_continuation(p, hs, state)))
        }
        ControlPrimitive::ResumeContinuation(k, v) => {
            resume_continuation(k, v, state).map(PrimitiveOutcome::Continue)
        }
        ControlPrimitive::GetHandlers => get_handlers(state).map(PrimitiveOutcome::Continue),
        ControlPrimitive::AsyncEscape(thunk) => Ok(PrimitiveOutcome::AsyncEscape(async_escape(thunk, state))),
    }
}

/// `WithHandler(h, p)`.
fn with_handler(h: Rc<dyn Handler>, p: Box<dyn Program>, mut state: State) -> State {
    let id = state.store.alloc_handler_id();
    state.k.push(Frame::WithHandler(WithHandlerFrame {
        handler: HandlerRef::new(id, h),
    }));
    state.control = Control::Program(p);
    state
}

/// Locates the nearest `Dispatching` frame in `k`, returning its
/// distance from the top.
pub(crate) fn nearest_dispatching(k: &crate::frame::Kontinuation) -> Option<usize> {
    k.iter_top_down()
        .position(|f| matches!(f, Frame::Dispatching(_)))
}

/// Searches strictly below `below_idx_from_top` for the nearest
/// `WithHandler` frame whose handler id matches `target`. Returns its
/// distance from the top.
pub(crate) fn find_owning_with_handler(
    k: &crate::frame::Kontinuation,
    below_idx_from_top: usize,
    target: crate::error::HandlerId,
) -> Option<usize> {
    k.iter_top_down()
        .enumerate()
        .skip(below_idx_from_top + 1)
        .find(|(_, f)| matches!(f, Frame::WithHandler(wh) if wh.handler.id == target))
        .map(|(idx, _)| idx)
}

/// `Resume(v)`.
fn resume(v: Value, mut state: State) -> Result<State, MachineError> {
    let r = match state.k.pop() {
        Some(Frame::Return(g)) => g,
        Some(other) => {
            state.k.push(other);
            return Err(MachineError::invariant("Resume: K[0] was not the handler's Return frame"));
        }
        None => return Err(MachineError::invariant("Resume: K is empty, no handler Return frame")),
    };

    let d_idx =
        nearest_dispatching(&state.k).ok_or_else(|| MachineError::invariant("Resume: no enclosing Dispatching frame"))?;
    let target = match state.k.get(d_idx) {
        Some(Frame::Dispatching(d)) => {
            if d.captured {
                return Err(MachineError::invariant(
                    "Resume: this dispatch's continuation was already taken by GetContinuation; use ResumeContinuation",
                ));
            }
            d.current_handler()
                .cloned()
                .ok_or_else(|| MachineError::invariant("Resume: Dispatching has no current handler"))?
        }
        _ => return Err(MachineError::invariant("Resume: expected a Dispatching frame")),
    };

    let j = find_owning_with_handler(&state.k, d_idx, target.id)
        .ok_or_else(|| MachineError::invariant("Resume: no WithHandler frame matches the running handler"))?;

    // Remove D (it is dropped) and splice R back in directly above the
    // owning WithHandler frame.
    let raw = state.k.raw_mut();
    let len = raw.len();
    raw.remove(from_top(len, d_idx));
    // `j` was computed against the pre-removal stack; removing D shifts
    // everything below it up by one position-from-top.
    let insert_at_from_top = j - 1;
    let len = raw.len();
    raw.insert(from_top(len, insert_at_from_top) + 1, Frame::Return(r));

    tracing::debug!(handler_idx = target.id.0, "resume");
    state.control = Control::Value(v);
    Ok(state)
}

/// `Forward(effect)` / `Delegate(effect)`.
/// `tail` selects the `Delegate` flavor, which also clears the frames
/// between `D` and the next `WithHandler` so the inner handler's result
/// flows directly to the outer caller.
fn forward(effect: Option<Effect>, mut state: State, tail: bool) -> Result<State, MachineError> {
    let d_idx =
        nearest_dispatching(&state.k).ok_or_else(|| MachineError::invariant("Forward: no enclosing Dispatching frame"))?;
    let d = match state.k.get(d_idx) {
        Some(Frame::Dispatching(d)) => d.clone(),
        _ => return Err(MachineError::invariant("Forward: expected a Dispatching frame")),
    };

    let boundary = if d.idx < 0 { 0 } else { d.idx as usize };
    let outer: Rc<Vec<HandlerRef>> = Rc::new(d.handlers[0..boundary].to_vec());
    if outer.is_empty() {
        state.control = Control::Error(MachineError::UnhandledEffect { tag: d.effect.tag.clone() });
        return Ok(state);
    }

    let effect = effect.unwrap_or_else(|| d.effect.clone());
    let new_idx = outer.len() as isize - 1;
    tracing::debug!(tag = %effect.tag, handler_idx = new_idx, tail, "forward");

    if tail {
        // Clear the current handler's own Return frame and anything
        // between D and the next WithHandler, so the forwarded dispatch's
        // result flows straight to the outer caller (tail semantics).
        let r = match state.k.pop() {
            Some(Frame::Return(mut g)) => {
                g.close();
                Some(g)
            }
            Some(other) => {
                state.k.push(other);
                None
            }
            None => None,
        };
        if r.is_none() {
            return Err(MachineError::invariant("Delegate: expected the handler's Return frame above D"));
        }
        // D itself is still on top now; drop it too.
        match state.k.pop() {
            Some(Frame::Dispatching(_)) => {}
            Some(other) => {
                state.k.push(other);
                return Err(MachineError::invariant("Delegate: expected the Dispatching frame"));
            }
            None => return Err(MachineError::invariant("Delegate: K unexpectedly empty")),
        }
    }

    state.k.push(Frame::Dispatching(DispatchingFrame {
        effect,
        idx: new_idx,
        handlers: outer,
        started: false,
        captured: false,
    }));
    state.control = Control::Value(Value::Unit);
    Ok(state)
}

/// `GetContinuation()`. Does not modify K.
fn get_continuation(mut state: State) -> Result<State, MachineError> {
    let d_idx = nearest_dispatching(&state.k)
        .ok_or_else(|| MachineError::invariant("GetContinuation: no enclosing Dispatching frame"))?;
    let target = match state.k.get(d_idx) {
        Some(Frame::Dispatching(d)) => d
            .current_handler()
            .cloned()
            .ok_or_else(|| MachineError::invariant("GetContinuation: Dispatching has no current handler"))?,
        _ => return Err(MachineError::invariant("GetContinuation: expected a Dispatching frame")),
    };
    let j = find_owning_with_handler(&state.k, d_idx, target.id)
        .ok_or_else(|| MachineError::invariant("GetContinuation: no matching WithHandler frame"))?;

    // Capture the frames strictly between D (exclusive) and the WHF
    // (exclusive), i.e. the positions d_idx+1 .. j, top-first. Empty when
    // WHF sits directly below D (nothing to capture). This does mutate K,
    // unlike the one-shot `Value`-returning primitives above it — see
    // DESIGN.md for why a plain `Resume` is refused afterward instead of
    // silently dropping the captured frames.
    let captured: Vec<Frame> = if j == d_idx + 1 {
        Vec::new()
    } else {
        let len = state.k.raw_mut().len();
        let raw = state.k.raw_mut();
        let lo = from_top(len, j - 1);
        let hi = from_top(len, d_idx + 1);
        raw.drain(lo..=hi).rev().collect()
    };

    if let Some(Frame::Dispatching(d)) = state.k.get_mut(d_idx) {
        d.captured = true;
    }

    let id = state.store.alloc_continuation_id();
    let k_value = Continuation::captured(id, captured);
    state.control = Control::Value(Value::Continuation(k_value));
    Ok(state)
}

/// `CreateContinuation(program, handlers)`. K is unchanged.
fn create_continuation(program: Box<dyn Program>, handlers: Vec<Rc<dyn Handler>>, mut state: State) -> State {
    let handler_refs = handlers
        .into_iter()
        .map(|h| HandlerRef::new(state.store.alloc_handler_id(), h))
        .collect();
    let id = state.store.alloc_continuation_id();
    let k_value = Continuation::unstarted(id, program, handler_refs);
    state.control = Control::Value(Value::Continuation(k_value));
    state
}

/// `ResumeContinuation(k, v)`.
fn resume_continuation(k: Continuation, v: Value, mut state: State) -> Result<State, MachineError> {
    if state.store.is_consumed(k.id()) {
        state.control = Control::Error(MachineError::OneShotViolation { id: k.id() });
        return Ok(state);
    }
    if !state.store.try_consume(k.id()) {
        state.control = Control::Error(MachineError::OneShotViolation { id: k.id() });
        return Ok(state);
    }

    // Pop R first, then locate D/the owning WithHandler against the
    // *remaining* stack — matching `resume`'s order. Computing `d_idx`/`j`
    // before the pop would make both stale by one position once R (which
    // always sits above D) is removed.
    let r = match state.k.pop() {
        Some(Frame::Return(g)) => g,
        Some(other) => {
            state.k.push(other);
            return Err(MachineError::invariant(
                "ResumeContinuation: K[0] was not the handler's Return frame",
            ));
        }
        None => return Err(MachineError::invariant("ResumeContinuation: K is empty")),
    };

    let d_idx = nearest_dispatching(&state.k)
        .ok_or_else(|| MachineError::invariant("ResumeContinuation: no enclosing Dispatching frame"))?;
    let target = match state.k.get(d_idx) {
        Some(Frame::Dispatching(d)) => d
            .current_handler()
            .cloned()
            .ok_or_else(|| MachineError::invariant("ResumeContinuation: Dispatching has no current handler"))?,
        _ => return Err(MachineError::invariant("ResumeContinuation: expected a Dispatching frame")),
    };
    let j = find_owning_with_handler(&state.k, d_idx, target.id)
        .ok_or_else(|| MachineError::invariant("ResumeContinuation: no matching WithHandler frame"))?;

    tracing::debug!(handler_idx = target.id.0, continuation_id = %k.id(), "resume continuation");

    // Drop D, same as Resume.
    let raw = state.k.raw_mut();
    let len = raw.len();
    raw.remove(from_top(len, d_idx));
    let insert_at_from_top = j - 1;

    match k.take().ok_or_else(|| MachineError::invariant("ResumeContinuation: continuation payload already gone"))? {
        ResumedPayload::Frames(frames) => {
            // Splice the captured frames in directly above the owning
            // WithHandler, preserving R just above them so the handler
            // still gets the eventual result.
            let raw = state.k.raw_mut();
            let len = raw.len();
            let at = from_top(len, insert_at_from_top) + 1;
            let mut to_insert = frames;
            to_insert.push(Frame::Return(r));
            // `to_insert` is currently top-first (captured frames, then R
            // last); reverse so `splice` inserts them bottom-first at `at`.
            to_insert.reverse();
            raw.splice(at..at, to_insert);
            state.control = Control::Value(v);
        }
        ResumedPayload::Unstarted { program, handlers } => {
            let raw = state.k.raw_mut();
            let len = raw.len();
            let at = from_top(len, insert_at_from_top) + 1;
            let mut to_insert: Vec<Frame> = handlers
                .into_iter()
                .map(|h| Frame::WithHandler(WithHandlerFrame { handler: h }))
                .collect();
            to_insert.push(Frame::Return(r));
            to_insert.reverse();
            raw.splice(at..at, to_insert);
            state.control = Control::Program(program);
        }
    }

    Ok(state)
}

/// `GetHandlers()`: the snapshot from the *user's* perspective, i.e.
/// the current dispatch's own handlers tuple, not the handler's outer
/// scope.
fn get_handlers(mut state: State) -> Result<State, MachineError> {
    let d_idx = nearest_dispatching(&state.k)
        .ok_or_else(|| MachineError::invariant("GetHandlers: no enclosing Dispatching frame"))?;
    let handlers = match state.k.get(d_idx) {
        Some(Frame::Dispatching(d)) => d.handlers.clone(),
        _ => return Err(MachineError::invariant("GetHandlers: expected a Dispatching frame")),
    };
    state.control = Control::Value(Value::Tuple(
        handlers
            .iter()
            .map(|h| Value::Opaque(Rc::new(h.clone())))
            .collect(),
    ));
    Ok(state)
}

/// Hands `action` to the async driver and suspends synchronous stepping
/// until it resolves.
fn async_escape(thunk: AsyncThunk, state: State) -> AsyncAction {
    Box::pin(async move {
        let value = thunk.0.await;
        let mut state = state;
        state.control = Control::Value(value);
        state
    })
}
