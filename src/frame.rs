//! Frames and the continuation stack K.

use crate::error::HandlerId;
use crate::program::{Program, SuspendedComputation};
use crate::value::Effect;
use std::rc::Rc;

/// A handler: conceptually `Effect -> Program`.
/// Invoked by the machine, never by user code directly.
pub trait Handler {
    fn invoke(&self, effect: &Effect) -> Box<dyn Program>;
}

/// A handler together with the stable id assigned to it at `WithHandler`
/// installation time. The id, not pointer identity, is what dispatch
/// checks to recognize "the handler currently running".
#[derive(Clone)]
pub struct HandlerRef {
    pub id: HandlerId,
    pub handler: Rc<dyn Handler>,
}

impl HandlerRef {
    pub fn new(id: HandlerId, handler: Rc<dyn Handler>) -> Self {
        HandlerRef { id, handler }
    }
}

impl std::fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HandlerRef({})", self.id)
    }
}

/// Marks a handler scope boundary (owned by Level 2).
#[derive(Clone)]
pub struct WithHandlerFrame {
    pub handler: HandlerRef,
}

/// In-progress dispatch state (owned by Level 2).
///
/// `handlers` is a snapshot of the visible handler list taken when the
/// dispatch started; it is never recomputed.
#[derive(Clone)]
pub struct DispatchingFrame {
    pub effect: Effect,
    /// Index of the handler currently being tried. `-1` means no
    /// handler was visible at all (unhandled effect).
    pub idx: isize,
    pub handlers: Rc<Vec<HandlerRef>>,
    pub started: bool,
    /// Set once `GetContinuation` has drained this dispatch's captured
    /// frames out of K. A plain `Resume` after that point would splice
    /// back a `Return` frame with no captured frames beneath it, silently
    /// discarding the continuation the handler already holds — `resume`
    /// checks this and refuses instead.
    pub captured: bool,
}

impl DispatchingFrame {
    pub fn current_handler(&self) -> Option<&HandlerRef> {
        if self.idx < 0 {
            None
        } else {
            self.handlers.get(self.idx as usize)
        }
    }
}

/// An element of K. Top of stack is index 0.
pub enum Frame {
    /// Owned by Level 1: a suspended user/handler computation.
    Return(Box<dyn SuspendedComputation>),
    /// Owned by Level 2: a handler scope boundary.
    WithHandler(WithHandlerFrame),
    /// Owned by Level 2: in-progress dispatch.
    Dispatching(DispatchingFrame),
}

impl Frame {
    pub fn is_return(&self) -> bool {
        matches!(self, Frame::Return(_))
    }

    /// Best-effort finalization of a `Return` frame being dropped by
    /// abandonment or error propagation. A no-op for the other frame
    /// kinds.
    pub fn close(&mut self) {
        if let Frame::Return(g) = self {
            g.close();
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frame::Return(_) => write!(f, "Return(..)"),
            Frame::WithHandler(wh) => write!(f, "WithHandler({})", wh.handler.id),
            Frame::Dispatching(d) => write!(
                f,
                "Dispatching({}, idx={}, started={})",
                d.effect.tag, d.idx, d.started
            ),
        }
    }
}

/// The continuation stack. A thin `Vec` wrapper kept so call sites read
/// in terms of `K[0]` / `K = f::rest`, top of stack first.
#[derive(Default)]
pub struct Kontinuation(Vec<Frame>);

impl Kontinuation {
    pub fn new() -> Self {
        Kontinuation(Vec::new())
    }

    pub fn push(&mut self, frame: Frame) {
        self.0.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.0.pop()
    }

    pub fn top(&self) -> Option<&Frame> {
        self.0.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.0.last_mut()
    }

    /// `Vec`-style mutable indexing counted from the top of the stack.
    pub fn get_mut(&mut self, idx_from_top: usize) -> Option<&mut Frame> {
        if idx_from_top >= self.0.len() {
            return None;
        }
        let i = self.0.len() - 1 - idx_from_top;
        self.0.get_mut(i)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Position (from the top, 0 = top) of the nearest `Dispatching`
    /// frame, if any.
    pub fn find_dispatching(&self) -> Option<usize> {
        self.0.iter().rev().position(|f| matches!(f, Frame::Dispatching(_)))
    }

    /// `Vec`-style indexing counted from the top of the stack, i.e.
    /// `K[0]` is the top frame.
    pub fn get(&self, idx_from_top: usize) -> Option<&Frame> {
        if idx_from_top >= self.0.len() {
            return None;
        }
        self.0.get(self.0.len() - 1 - idx_from_top)
    }

    /// Splits off everything above (and including) the frame at
    /// `idx_from_top`, returning it top-first (index 0 = former K[0]).
    pub fn split_above(&mut self, idx_from_top: usize) -> Vec<Frame> {
        let len = self.0.len();
        let split_at = len - idx_from_top;
        let mut tail = self.0.split_off(split_at);
        tail.reverse();
        tail
    }

    /// Pushes frames given top-first (index 0 becomes the new top).
    pub fn extend_top_first(&mut self, mut frames: Vec<Frame>) {
        frames.reverse();
        self.0.extend(frames);
    }

    pub fn iter_top_down(&self) -> impl Iterator<Item = &Frame> {
        self.0.iter().rev()
    }

    /// Raw access for the dispatch primitives' stack surgery (Resume,
    /// Forward/Delegate, ResumeContinuation). Index 0 is the bottom of
    /// the stack, `len() - 1` is the top.
    pub(crate) fn raw_mut(&mut self) -> &mut Vec<Frame> {
        &mut self.0
    }
}

/// Converts a "distance from the top" index into a raw `Vec` index,
/// where index 0 is the bottom of the stack.
pub(crate) fn from_top(len: usize, idx_from_top: usize) -> usize {
    len - 1 - idx_from_top
}

impl std::fmt::Debug for Kontinuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.iter().rev()).finish()
    }
}
