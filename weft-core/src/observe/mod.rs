//! Observable Wrappers
//!
//! Reads and writes become reactive by going through a wrapper handle bound
//! to a [`Runtime`]: reads track, writes trigger. The underlying storage is
//! the shared [`Raw`] container, so any number of wrappers over the same
//! allocation observe and disturb the same dependency target.
//!
//! # Wrapper flavors
//!
//! A wrapper carries a [`Mode`] that decides how deep observation goes and
//! whether writes are allowed:
//!
//! - `Deep` tracks reads, triggers writes, and wraps nested containers in
//!   `Deep` wrappers of their own.
//! - `Shallow` tracks and triggers at the first level only; nested
//!   containers come back as plain handles.
//! - `Readonly` rejects writes with a logged warning and does not track
//!   reads, since nothing reachable through it can change it. Nested
//!   containers come back readonly.
//! - `ShallowReadonly` rejects first-level writes; nested containers come
//!   back plain.
//!
//! Scalars pass through every flavor untouched.

mod list;
mod map;
mod record;
mod set;

pub use list::ObsList;
pub use map::ObsMap;
pub use record::ObsRecord;
pub use set::ObsSet;

use std::sync::Arc;

use crate::reactive::runtime::{Runtime, RuntimeInner};
use crate::value::{Key, Raw};

/// Observation depth and write policy of a wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No tracking, no triggering. What a shallow wrapper hands out for
    /// nested containers.
    Plain,
    Deep,
    Shallow,
    Readonly,
    ShallowReadonly,
}

impl Mode {
    /// The mode nested containers are handed out with.
    pub(crate) fn child(self) -> Mode {
        match self {
            Mode::Deep => Mode::Deep,
            Mode::Readonly => Mode::Readonly,
            Mode::Plain | Mode::Shallow | Mode::ShallowReadonly => Mode::Plain,
        }
    }

    pub(crate) fn is_readonly(self) -> bool {
        matches!(self, Mode::Readonly | Mode::ShallowReadonly)
    }

    /// Whether reads through this mode subscribe the running effect.
    pub(crate) fn tracks(self) -> bool {
        matches!(self, Mode::Deep | Mode::Shallow)
    }

    /// Whether writes through this mode notify subscribers.
    pub(crate) fn triggers(self) -> bool {
        matches!(self, Mode::Deep | Mode::Shallow)
    }
}

/// An observed dynamic value: a scalar, or a wrapper over shared container
/// storage.
#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Record(ObsRecord),
    List(ObsList),
    Map(ObsMap),
    Set(ObsSet),
}

impl Value {
    pub(crate) fn wrap(rt: &Arc<RuntimeInner>, raw: Raw, mode: Mode) -> Value {
        match raw {
            Raw::Unit => Value::Unit,
            Raw::Bool(b) => Value::Bool(b),
            Raw::Int(i) => Value::Int(i),
            Raw::Float(x) => Value::Float(x),
            Raw::Str(s) => Value::Str(s),
            Raw::Record(data) => Value::Record(ObsRecord::new(Arc::clone(rt), data, mode)),
            Raw::List(data) => Value::List(ObsList::new(Arc::clone(rt), data, mode)),
            Raw::Map(data) => Value::Map(ObsMap::new(Arc::clone(rt), data, mode)),
            Raw::Set(data) => Value::Set(ObsSet::new(Arc::clone(rt), data, mode)),
        }
    }

    /// The unobserved value underneath. Container wrappers unwrap to a
    /// handle on the same shared storage.
    pub fn raw(&self) -> Raw {
        match self {
            Value::Unit => Raw::Unit,
            Value::Bool(b) => Raw::Bool(*b),
            Value::Int(i) => Raw::Int(*i),
            Value::Float(x) => Raw::Float(*x),
            Value::Str(s) => Raw::Str(Arc::clone(s)),
            Value::Record(r) => Raw::Record(r.data()),
            Value::List(l) => Raw::List(l.data()),
            Value::Map(m) => Raw::Map(m.data()),
            Value::Set(s) => Raw::Set(s.data()),
        }
    }

    pub fn as_record(&self) -> Option<ObsRecord> {
        match self {
            Value::Record(r) => Some(r.clone()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<ObsList> {
        match self {
            Value::List(l) => Some(l.clone()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<ObsMap> {
        match self {
            Value::Map(m) => Some(m.clone()),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<ObsSet> {
        match self {
            Value::Set(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    /// Scalars compare by value (NaN equal to NaN); container wrappers
    /// compare by storage identity and mode.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Value> for Raw {
    fn from(value: Value) -> Raw {
        value.raw()
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Value {
        match key {
            Key::Bool(b) => Value::Bool(b),
            Key::Int(i) => Value::Int(i),
            Key::Str(s) => Value::Str(s),
        }
    }
}

impl Runtime {
    /// Wrap a value for deep observation. Nested containers read through
    /// the result are observed too.
    pub fn reactive(&self, value: Raw) -> Value {
        Value::wrap(&self.inner, value, Mode::Deep)
    }

    /// Wrap a value for first-level observation only.
    pub fn shallow_reactive(&self, value: Raw) -> Value {
        Value::wrap(&self.inner, value, Mode::Shallow)
    }

    /// Wrap a value as a deep read-only view. Writes anywhere under it are
    /// rejected with a warning.
    pub fn readonly(&self, value: Raw) -> Value {
        Value::wrap(&self.inner, value, Mode::Readonly)
    }

    /// Wrap a value as a first-level read-only view.
    pub fn shallow_readonly(&self, value: Raw) -> Value {
        Value::wrap(&self.inner, value, Mode::ShallowReadonly)
    }
}
