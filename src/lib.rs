//! A small-step abstract machine for algebraic effects and one-shot
//! delimited continuations.
//!
//! The machine is organized in two layers. Level 1 ([`level1`]) is a
//! pure CESK stepper that knows nothing about effects or handlers; it
//! only ever sees `Program`/`Value`/`Error` control values and `Return`
//! frames. Level 2 ([`level2`]) sits on top and owns everything
//! effect-related: starting a dispatch, invoking handlers, and the
//! seven control primitives a handler can yield ([`primitives`]).
//!
//! [`driver`] wires a program and an outermost-to-innermost handler
//! stack into an initial state and runs the combined stepper to
//! completion, either synchronously or (for programs that escape to
//! async code) on the current async runtime.

mod dispatch;
mod driver;
mod error;
mod frame;
mod handler;
mod level1;
mod level2;
mod primitives;
mod program;
#[cfg(test)]
mod proptests;
mod state;
mod step;
mod value;

pub use driver::{run_async, run_sync, DriverConfig};
pub use error::{ContinuationId, EffectTag, HandlerId, MachineError, MachineResult};
pub use frame::Handler;
pub use handler::Continuation;
pub use level2::level2_step as step;
pub use primitives::{AsyncThunk, ControlPrimitive};
pub use program::{Program, StepOutcome, SuspendedComputation, Yielded};
pub use state::{Control, State};
pub use step::{AsyncAction, Step};
pub use value::{Effect, Env, Store, Value};
