//! Value, environment and effect representations.

use crate::error::{ContinuationId, EffectTag};
use crate::handler::Continuation;
use std::fmt;
use std::rc::Rc;

/// A runtime value. Kept deliberately small: the core machine never
/// inspects payloads beyond routing them, so one open-ended variant
/// (`Opaque`) carries whatever a host embedding wants to thread through
/// without the core needing to know its shape.
#[derive(Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    Tuple(Vec<Value>),
    Effect(Effect),
    Continuation(Continuation),
    /// Host-defined payload, opaque to the machine.
    Opaque(Rc<dyn std::any::Any>),
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Tuple(xs) => f.debug_list().entries(xs.iter()).finish(),
            Value::Effect(e) => write!(f, "{e:?}"),
            Value::Continuation(k) => write!(f, "Continuation({})", k.id()),
            Value::Opaque(_) => write!(f, "Opaque(..)"),
        }
    }
}

/// An effect: an opaque value produced by user code, carrying a tag
/// (identity) and a payload.
#[derive(Clone)]
pub struct Effect {
    pub tag: EffectTag,
    pub payload: Value,
}

impl Effect {
    pub fn new(tag: impl Into<EffectTag>, payload: Value) -> Self {
        Effect {
            tag: tag.into(),
            payload,
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Effect({}, {:?})", self.tag, self.payload)
    }
}

/// An immutable lexical environment. Cloning is O(1) (`Rc`); extending
/// with a new binding allocates a fresh map rather than mutating a
/// shared one.
#[derive(Clone, Default)]
pub struct Env(Rc<rustc_hash::FxHashMap<Rc<str>, Value>>);

impl Env {
    pub fn new() -> Self {
        Env::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns a new environment with `name` bound to `value`, leaving
    /// `self` untouched.
    pub fn bind(&self, name: impl Into<Rc<str>>, value: Value) -> Env {
        let mut map = (*self.0).clone();
        map.insert(name.into(), value);
        Env(Rc::new(map))
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

/// The store `S`: a mutable mapping from opaque keys to values. The core
/// owns exactly one datum in it — the consumed-continuation id set
/// — plus the monotonic id counters needed to
/// keep that set meaningful across a run. Everything else is free for
/// handlers to use under their own keys.
#[derive(Debug, Default)]
pub struct Store {
    consumed: rustc_hash::FxHashSet<ContinuationId>,
    next_continuation_id: u64,
    next_handler_id: u64,
    extra: rustc_hash::FxHashMap<String, Value>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    pub fn alloc_continuation_id(&mut self) -> ContinuationId {
        let id = ContinuationId(self.next_continuation_id);
        self.next_continuation_id += 1;
        id
    }

    pub fn alloc_handler_id(&mut self) -> crate::error::HandlerId {
        let id = crate::error::HandlerId(self.next_handler_id);
        self.next_handler_id += 1;
        id
    }

    /// Records `id` as consumed. Returns `false` if it was already
    /// consumed (the caller should raise `OneShotViolation`).
    pub fn try_consume(&mut self, id: ContinuationId) -> bool {
        self.consumed.insert(id)
    }

    pub fn is_consumed(&self, id: ContinuationId) -> bool {
        self.consumed.contains(&id)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.extra.insert(key.into(), value);
    }
}
