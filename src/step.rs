//! The step contract.

use crate::error::MachineError;
use crate::state::State;
use crate::value::Value;
use std::future::Future;
use std::pin::Pin;

/// An opaque awaitable that resolves to the state the machine should
/// resume with. Not `Send`: the machine is single-threaded and
/// cooperative, so the async driver runs these on
/// a single-threaded/local executor rather than requiring thread
/// mobility.
pub type AsyncAction = Pin<Box<dyn Future<Output = State>>>;

/// The result of a single `step` call.
pub enum Step {
    Continue(State),
    Done(Value),
    Failed(MachineError),
    /// The action must be awaited by an async-aware driver; the
    /// synchronous driver treats this as `AsyncEscapeInSyncDriver`.
    AsyncEscape(AsyncAction),
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Continue(_) => write!(f, "Continue(..)"),
            Step::Done(v) => write!(f, "Done({v:?})"),
            Step::Failed(e) => write!(f, "Failed({e})"),
            Step::AsyncEscape(_) => write!(f, "AsyncEscape(..)"),
        }
    }
}
