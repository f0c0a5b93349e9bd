//! The machine state `(C, E, S, K)`.

use crate::error::MachineError;
use crate::frame::Kontinuation;
use crate::program::{Program, Yielded};
use crate::value::{Env, Store, Value};

/// Control: exactly one variant at any instant.
pub enum Control {
    Program(Box<dyn Program>),
    Value(Value),
    Error(MachineError),
    EffectYield(Yielded),
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Control::Program(_) => write!(f, "Program(..)"),
            Control::Value(v) => write!(f, "Value({v:?})"),
            Control::Error(e) => write!(f, "Error({e})"),
            Control::EffectYield(_) => write!(f, "EffectYield(..)"),
        }
    }
}

/// The full machine state.
pub struct State {
    pub control: Control,
    pub env: Env,
    pub store: Store,
    pub k: Kontinuation,
}

impl State {
    pub fn new(program: Box<dyn Program>, env: Env, store: Store) -> Self {
        State {
            control: Control::Program(program),
            env,
            store,
            k: Kontinuation::new(),
        }
    }
}
