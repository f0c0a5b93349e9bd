//! The driver: wires a program and a handler stack into an initial
//! `State` and runs `level2_step` to completion.

use crate::error::{MachineError, MachineResult};
use crate::frame::{Frame, Handler, HandlerRef, WithHandlerFrame};
use crate::level2::level2_step;
use crate::program::Program;
use crate::state::State;
use crate::step::Step;
use crate::value::{Env, Store, Value};
use std::rc::Rc;

/// Driver configuration.
///
/// `max_steps` is a coarse runaway guard, not a semantic part of the
/// machine: a real deployment should set it to whatever bound makes
/// sense for its workload.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    max_steps: Option<u64>,
    trace: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            max_steps: None,
            trace: false,
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aborts the run with `MachineError::InvariantViolation` once this
    /// many steps have been taken without reaching `Done`/`Failed`.
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Emits a `tracing::trace!` event for every elementary transition.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}

/// Builds the initial `State` for a program running under `handlers`
/// (outermost first), per the driver contract: each handler installs a
/// `WithHandler` frame, nested so `handlers[0]` is outermost.
fn initial_state(
    program: Box<dyn Program>,
    handlers: Vec<Rc<dyn Handler>>,
    env: Option<Env>,
    store: Option<Store>,
) -> State {
    let mut state = State::new(program, env.unwrap_or_default(), store.unwrap_or_default());
    // `handlers` is given outermost-first; pushing them in that order
    // onto K leaves the innermost one closest to the user program,
    // matching `visibleHandlers`' "innermost collected first, then
    // reversed" walk.
    for handler in handlers {
        let id = state.store.alloc_handler_id();
        state.k.push(Frame::WithHandler(WithHandlerFrame {
            handler: HandlerRef::new(id, handler),
        }));
    }
    state
}

fn run_one_step(state: State, trace: bool) -> Step {
    if trace {
        tracing::trace!(control = ?state.control, k = ?state.k, "step");
    }
    let step = level2_step(state);
    if let Step::Failed(ref e) = step {
        log_failure(e);
    }
    step
}

/// Logs a terminal `MachineError` right before it leaves the driver loop.
/// `InvariantViolation` is a core-bug signal, so it goes out at `error!`;
/// everything else reaching this point (a propagatable error that ran out
/// of enclosing `Return` frames to catch it) goes out at `warn!`.
fn log_failure(e: &MachineError) {
    match e {
        MachineError::InvariantViolation { message } => {
            tracing::error!(message = %message, "invariant violation");
        }
        MachineError::UnhandledEffect { tag } => {
            tracing::warn!(tag = %tag, "unhandled effect");
        }
        MachineError::OneShotViolation { id } => {
            tracing::warn!(id = %id, "one-shot violation");
        }
        MachineError::HandlerUserError(v) => {
            tracing::warn!(value = ?v, "handler error");
        }
        MachineError::AsyncEscapeInSyncDriver => {
            tracing::warn!("async escape reached the synchronous driver");
        }
    }
}

/// Runs a program to completion synchronously. Rejects `AsyncEscape` —
/// use [`run_async`] if the program may escape to async code.
pub fn run_sync(
    program: Box<dyn Program>,
    handlers: Vec<Rc<dyn Handler>>,
    env: Option<Env>,
    store: Option<Store>,
    config: &DriverConfig,
) -> MachineResult<Value> {
    let mut state = initial_state(program, handlers, env, store);
    let mut steps: u64 = 0;
    loop {
        if let Some(max) = config.max_steps {
            if steps >= max {
                return Err(MachineError::invariant(format!(
                    "driver: exceeded max_steps ({max})"
                )));
            }
        }
        steps += 1;
        match run_one_step(state, config.trace) {
            Step::Continue(next) => state = next,
            Step::Done(v) => return Ok(v),
            Step::Failed(e) => return Err(e),
            Step::AsyncEscape(_) => return Err(MachineError::AsyncEscapeInSyncDriver),
        }
    }
}

/// Runs a program to completion, awaiting any `AsyncEscape` terminals on
/// the current (single-threaded) async runtime before resuming.
pub async fn run_async(
    program: Box<dyn Program>,
    handlers: Vec<Rc<dyn Handler>>,
    env: Option<Env>,
    store: Option<Store>,
    config: &DriverConfig,
) -> MachineResult<Value> {
    let mut state = initial_state(program, handlers, env, store);
    let mut steps: u64 = 0;
    loop {
        if let Some(max) = config.max_steps {
            if steps >= max {
                return Err(MachineError::invariant(format!(
                    "driver: exceeded max_steps ({max})"
                )));
            }
        }
        steps += 1;
        match run_one_step(state, config.trace) {
            Step::Continue(next) => state = next,
            Step::Done(v) => return Ok(v),
            Step::Failed(e) => return Err(e),
            Step::AsyncEscape(action) => state = action.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Handler;
    use crate::primitives::ControlPrimitive;
    use crate::program::{PureProgram, StepOutcome, SuspendedComputation};
    use crate::value::Effect;

    struct ReturnsProgram(Value);
    impl Program for ReturnsProgram {
        fn to_suspended(self: Box<Self>) -> Box<dyn SuspendedComputation> {
            Box::new(PureProgram::new(self.0))
        }
    }

    #[test]
    fn test_run_sync_with_no_handlers_returns_value() {
        let program = Box::new(ReturnsProgram(Value::Int(42)));
        let result = run_sync(program, Vec::new(), None, None, &DriverConfig::new());
        match result {
            Ok(Value::Int(42)) => {}
            other => panic!("expected Ok(42), got {other:?}"),
        }
    }

    #[test]
    fn test_run_sync_with_trace_enabled_does_not_panic() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let program = Box::new(ReturnsProgram(Value::Int(1)));
        let config = DriverConfig::new().with_trace(true);
        let result = run_sync(program, Vec::new(), None, None, &config);
        match result {
            Ok(Value::Int(1)) => {}
            other => panic!("expected Ok(1), got {other:?}"),
        }
    }

    struct YieldsThenDone;
    impl Program for YieldsThenDone {
        fn to_suspended(self: Box<Self>) -> Box<dyn SuspendedComputation> {
            Box::new(YieldsThenDoneSuspended { yielded: false })
        }
    }
    struct YieldsThenDoneSuspended {
        yielded: bool,
    }
    impl SuspendedComputation for YieldsThenDoneSuspended {
        fn start(&mut self) -> StepOutcome {
            self.yielded = true;
            StepOutcome::Yield(crate::program::Yielded::Effect(Effect::new("Ping", Value::Unit)))
        }
        fn send(&mut self, value: Value) -> StepOutcome {
            StepOutcome::Return(value)
        }
        fn throw(&mut self, error: Value) -> StepOutcome {
            StepOutcome::Error(error)
        }
    }

    struct EchoHandler;
    impl Handler for EchoHandler {
        fn invoke(&self, effect: &Effect) -> Box<dyn Program> {
            let _ = effect;
            Box::new(ResumesWith(Value::Int(99)))
        }
    }
    struct ResumesWith(Value);
    impl Program for ResumesWith {
        fn to_suspended(self: Box<Self>) -> Box<dyn SuspendedComputation> {
            Box::new(ResumesWithSuspended(Some(self.0)))
        }
    }
    struct ResumesWithSuspended(Option<Value>);
    impl SuspendedComputation for ResumesWithSuspended {
        fn start(&mut self) -> StepOutcome {
            StepOutcome::Yield(crate::program::Yielded::Primitive(ControlPrimitive::Resume(
                self.0.take().unwrap(),
            )))
        }
        fn send(&mut self, value: Value) -> StepOutcome {
            StepOutcome::Return(value)
        }
        fn throw(&mut self, error: Value) -> StepOutcome {
            StepOutcome::Error(error)
        }
    }

    #[test]
    fn test_run_sync_handles_an_effect_end_to_end() {
        let program: Box<dyn Program> = Box::new(YieldsThenDone);
        let handlers: Vec<Rc<dyn Handler>> = vec![Rc::new(EchoHandler)];
        let result = run_sync(program, handlers, None, None, &DriverConfig::new());
        match result {
            Ok(Value::Int(99)) => {}
            other => panic!("expected Ok(99), got {other:?}"),
        }
    }

    struct AsyncEscapes;
    impl Program for AsyncEscapes {
        fn to_suspended(self: Box<Self>) -> Box<dyn SuspendedComputation> {
            Box::new(AsyncEscapesSuspended)
        }
    }
    struct AsyncEscapesSuspended;
    impl SuspendedComputation for AsyncEscapesSuspended {
        fn start(&mut self) -> StepOutcome {
            let thunk = crate::primitives::AsyncThunk(Box::pin(async { Value::Int(7) }));
            StepOutcome::Yield(crate::program::Yielded::Primitive(ControlPrimitive::AsyncEscape(thunk)))
        }
        fn send(&mut self, value: Value) -> StepOutcome {
            StepOutcome::Return(value)
        }
        fn throw(&mut self, error: Value) -> StepOutcome {
            StepOutcome::Error(error)
        }
    }

    #[tokio::test]
    async fn test_run_async_awaits_an_async_escape() {
        let result = run_async(Box::new(AsyncEscapes), Vec::new(), None, None, &DriverConfig::new()).await;
        match result {
            Ok(Value::Int(7)) => {}
            other => panic!("expected Ok(7), got {other:?}"),
        }
    }

    #[test]
    fn test_run_sync_rejects_an_async_escape() {
        let result = run_sync(Box::new(AsyncEscapes), Vec::new(), None, None, &DriverConfig::new());
        assert!(matches!(result, Err(MachineError::AsyncEscapeInSyncDriver)));
    }

    #[test]
    fn test_run_sync_enforces_max_steps() {
        struct Loops;
        impl Program for Loops {
            fn to_suspended(self: Box<Self>) -> Box<dyn SuspendedComputation> {
                Box::new(LoopsSuspended)
            }
        }
        struct LoopsSuspended;
        impl SuspendedComputation for LoopsSuspended {
            fn start(&mut self) -> StepOutcome {
                StepOutcome::Yield(crate::program::Yielded::Program(Box::new(Loops)))
            }
            fn send(&mut self, _value: Value) -> StepOutcome {
                StepOutcome::Yield(crate::program::Yielded::Program(Box::new(Loops)))
            }
            fn throw(&mut self, error: Value) -> StepOutcome {
                StepOutcome::Error(error)
            }
        }

        let config = DriverConfig::new().with_max_steps(10);
        let result = run_sync(Box::new(Loops), Vec::new(), None, None, &config);
        assert!(matches!(result, Err(MachineError::InvariantViolation { .. })));
    }
}
