//! Observed Sets
//!
//! Membership collections over scalar keys. Membership probes track the
//! element key; size and iteration track the iteration sentinel. Adding an
//! element that is already present, or removing one that is not, is silent.

use std::sync::Arc;

use crate::reactive::dep::{DepKey, TargetKind, TriggerOp};
use crate::reactive::runtime::RuntimeInner;
use crate::value::{Key, Raw, SetData};

use super::Mode;

/// Observed handle on shared set storage.
#[derive(Clone)]
pub struct ObsSet {
    rt: Arc<RuntimeInner>,
    data: Arc<SetData>,
    mode: Mode,
}

impl ObsSet {
    pub(crate) fn new(rt: Arc<RuntimeInner>, data: Arc<SetData>, mode: Mode) -> Self {
        Self { rt, data, mode }
    }

    pub(crate) fn data(&self) -> Arc<SetData> {
        Arc::clone(&self.data)
    }

    pub(crate) fn target_id(&self) -> crate::reactive::dep::TargetId {
        self.data.id
    }

    /// Whether two handles observe the same storage.
    pub fn ptr_eq(&self, other: &ObsSet) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// The unobserved storage handle.
    pub fn raw(&self) -> Raw {
        Raw::Set(self.data())
    }

    fn track(&self, key: DepKey) {
        if self.mode.tracks() {
            self.rt.track(self.data.id, key);
        }
    }

    fn trigger(&self, key: DepKey, op: TriggerOp) {
        if self.mode.triggers() {
            self.rt
                .trigger(self.data.id, TargetKind::Set, key, op, None);
        }
    }

    /// Membership probe. Absent elements still track, so a later add wakes
    /// the prober.
    pub fn contains(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        self.track(DepKey::Entry(key.clone()));
        self.data.items.read().contains(&key)
    }

    /// Add an element. Returns whether it was newly added.
    pub fn add(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        if self.mode.is_readonly() {
            tracing::warn!(%key, "add rejected on readonly set");
            return false;
        }
        let added = self.data.items.write().insert(key.clone());
        if added {
            self.trigger(DepKey::Entry(key), TriggerOp::Add);
        }
        added
    }

    /// Remove an element. Returns whether it was present.
    pub fn remove(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        if self.mode.is_readonly() {
            tracing::warn!(%key, "removal rejected on readonly set");
            return false;
        }
        let removed = self.data.items.write().shift_remove(&key);
        if removed {
            self.trigger(DepKey::Entry(key), TriggerOp::Delete);
        }
        removed
    }

    /// Empty the set, waking every subscriber of it.
    pub fn clear(&self) {
        if self.mode.is_readonly() {
            tracing::warn!("clear rejected on readonly set");
            return;
        }
        let was_empty = {
            let mut items = self.data.items.write();
            let was_empty = items.is_empty();
            items.clear();
            was_empty
        };
        if !was_empty {
            self.trigger(DepKey::Iterate, TriggerOp::Clear);
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.track(DepKey::Iterate);
        self.data.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current elements, in insertion order.
    pub fn to_vec(&self) -> Vec<Key> {
        self.track(DepKey::Iterate);
        self.data.items.read().iter().cloned().collect()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Key)) {
        for key in self.to_vec() {
            f(&key);
        }
    }
}

impl PartialEq for ObsSet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data) && self.mode == other.mode
    }
}

impl std::fmt::Debug for ObsSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsSet")
            .field("id", &self.data.id)
            .field("mode", &self.mode)
            .finish()
    }
}
