//! Error kinds for the machine.
//!
//! Every fallible core operation produces one of these kinds.
//! `InvariantViolation` and `AsyncEscapeInSyncDriver` are never carried
//! as a `Control::Error` value — they always short-circuit a `step`
//! call directly into `Step::Failed`. The remaining kinds also flow as
//! ordinary `Control::Error` values so that user code observes them
//! through normal error propagation.

use crate::value::Value;
use std::fmt;

/// A continuation identifier, unique for the lifetime of a machine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContinuationId(pub u64);

impl fmt::Display for ContinuationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k{}", self.0)
    }
}

/// An opaque handler identity, allocated when a `WithHandler` frame is
/// pushed. Used to match a `Dispatching` frame's target handler back to
/// the `WithHandler` frame that installed it, without relying on
/// reference equality between trait objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// An effect tag: the identity half of an `Effect` value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EffectTag(pub String);

impl fmt::Display for EffectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EffectTag {
    fn from(s: &str) -> Self {
        EffectTag(s.to_string())
    }
}

impl From<String> for EffectTag {
    fn from(s: String) -> Self {
        EffectTag(s)
    }
}

/// The machine's error surface.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MachineError {
    /// Dispatch found no visible handler for an effect.
    #[error("unhandled effect: {tag}")]
    UnhandledEffect { tag: EffectTag },

    /// A continuation was resumed a second time.
    #[error("one-shot violation: continuation {id} was already resumed")]
    OneShotViolation { id: ContinuationId },

    /// A rule observed K in a shape it must never see. Always a core bug;
    /// never caused by user code. Aborts the run immediately.
    #[error("invariant violation: {message}")]
    InvariantViolation { message: String },

    /// An error raised by user or handler code.
    #[error("handler error: {0:?}")]
    HandlerUserError(Value),

    /// The synchronous driver received an `AsyncEscape` terminal.
    #[error("async escape reached the synchronous driver")]
    AsyncEscapeInSyncDriver,
}

impl MachineError {
    pub fn invariant(message: impl Into<String>) -> Self {
        MachineError::InvariantViolation {
            message: message.into(),
        }
    }

    /// Whether this error kind is permitted to appear as a `Control::Error`
    /// value flowing through K. `InvariantViolation` and
    /// `AsyncEscapeInSyncDriver` are not — they are raised directly as a
    /// terminal `Step::Failed` outcome.
    pub fn is_propagatable(&self) -> bool {
        !matches!(
            self,
            MachineError::InvariantViolation { .. } | MachineError::AsyncEscapeInSyncDriver
        )
    }
}

pub type MachineResult<T> = Result<T, MachineError>;
