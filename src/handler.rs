//! First-class continuation values.

use crate::error::ContinuationId;
use crate::frame::{Frame, HandlerRef};
use crate::program::Program;
use std::cell::RefCell;
use std::rc::Rc;

enum Payload {
    /// Captured from a running dispatch via `GetContinuation`: the
    /// frames strictly between the `Dispatching` frame and its owning
    /// `WithHandler` frame, top-first.
    Captured(Vec<Frame>),
    /// Built via `CreateContinuation`: a program that hasn't run yet,
    /// plus the handler scopes it should run under.
    Unstarted {
        program: Box<dyn Program>,
        handlers: Vec<HandlerRef>,
    },
}

/// A first-class, one-shot continuation.
///
/// Consuming it (via `ResumeContinuation`) takes the payload out of the
/// shared cell, leaving the cell empty — a second attempt observes
/// `None` and is also guarded independently by the store's
/// consumed-id set.
#[derive(Clone)]
pub struct Continuation {
    id: ContinuationId,
    started: bool,
    payload: Rc<RefCell<Option<Payload>>>,
}

impl Continuation {
    pub fn captured(id: ContinuationId, frames: Vec<Frame>) -> Self {
        Continuation {
            id,
            started: true,
            payload: Rc::new(RefCell::new(Some(Payload::Captured(frames)))),
        }
    }

    pub fn unstarted(id: ContinuationId, program: Box<dyn Program>, handlers: Vec<HandlerRef>) -> Self {
        Continuation {
            id,
            started: false,
            payload: Rc::new(RefCell::new(Some(Payload::Unstarted { program, handlers }))),
        }
    }

    pub fn id(&self) -> ContinuationId {
        self.id
    }

    pub fn started(&self) -> bool {
        self.started
    }

    /// Takes the payload, leaving the continuation empty. Returns
    /// `None` if it had already been taken.
    pub fn take(&self) -> Option<ResumedPayload> {
        match self.payload.borrow_mut().take()? {
            Payload::Captured(frames) => Some(ResumedPayload::Frames(frames)),
            Payload::Unstarted { program, handlers } => {
                Some(ResumedPayload::Unstarted { program, handlers })
            }
        }
    }
}

/// What `ResumeContinuation` gets back from a consumed continuation.
pub enum ResumedPayload {
    /// A mid-execution snapshot: splice directly, then `C = Value(v)`.
    Frames(Vec<Frame>),
    /// Never run: splice the `WithHandler` scopes, then
    /// `C = Program(program)` — there is no paused `Return` frame to
    /// feed `v` into, so `v` is accepted for API symmetry with the
    /// captured case but has no effect (see DESIGN.md's "Open
    /// questions — resolutions", entry 5).
    Unstarted {
        program: Box<dyn Program>,
        handlers: Vec<HandlerRef>,
    },
}
