//! Dependency Addressing
//!
//! Every trackable read in the engine is addressed by a `(target, key)`
//! pair: the container being read and the aspect of it that was observed.
//! Most keys name a field, index, or entry directly; the rest are sentinels
//! standing for whole-container aspects such as iteration order or length.
//!
//! IDs here are process-global monotonic counters. They are never reused,
//! so a dead container's bucket can linger briefly without ever colliding
//! with a live one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::value::Key;

static SERIAL: AtomicU64 = AtomicU64::new(1);

/// Next value from the shared serial counter. Targets and effects draw from
/// the same sequence.
pub(crate) fn next_serial() -> u64 {
    SERIAL.fetch_add(1, Ordering::Relaxed)
}

/// Stable identity of a dependency target (one container allocation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub(crate) u64);

impl TargetId {
    pub(crate) fn next() -> Self {
        TargetId(next_serial())
    }
}

/// What flavor of container a trigger originated from. Gather rules differ
/// by flavor, so triggers carry this alongside the target ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Record,
    List,
    Map,
    Set,
    /// A synthetic target with no backing container, used by derived values
    /// to publish their own invalidation key.
    Node,
}

/// The observed aspect of a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A record field.
    Prop(Arc<str>),
    /// A list slot.
    Index(usize),
    /// A map or set entry.
    Entry(Key),
    /// The length of a list.
    Length,
    /// Iteration over values or entries of the container.
    Iterate,
    /// Iteration over a map's keys only. Value-only updates to existing
    /// entries do not disturb this key set.
    KeyIterate,
}

/// How a mutation changed its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// An existing field, slot, or entry changed value.
    Set,
    /// A key that did not exist before was created.
    Add,
    /// An existing key was removed.
    Delete,
    /// The whole container was emptied.
    Clear,
}
