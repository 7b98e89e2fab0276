//! Observed Maps
//!
//! Key-value collections with scalar keys. Entry reads track the entry key;
//! size and value iteration track the iteration sentinel; key iteration
//! tracks its own sentinel, so updating the value under an existing key
//! re-runs entry iterators but leaves key-only iterators alone.
//!
//! Values are stored unobserved. Inserting an observed value strips its
//! wrapper first, so reading it back through a different wrapper flavor
//! never smuggles in the old one.

use std::sync::Arc;

use crate::reactive::dep::{DepKey, TargetKind, TriggerOp};
use crate::reactive::runtime::RuntimeInner;
use crate::value::{Key, MapData, Raw};

use super::{Mode, Value};

/// Observed handle on shared map storage.
#[derive(Clone)]
pub struct ObsMap {
    rt: Arc<RuntimeInner>,
    data: Arc<MapData>,
    mode: Mode,
}

impl ObsMap {
    pub(crate) fn new(rt: Arc<RuntimeInner>, data: Arc<MapData>, mode: Mode) -> Self {
        Self { rt, data, mode }
    }

    pub(crate) fn data(&self) -> Arc<MapData> {
        Arc::clone(&self.data)
    }

    pub(crate) fn target_id(&self) -> crate::reactive::dep::TargetId {
        self.data.id
    }

    /// Whether two handles observe the same storage.
    pub fn ptr_eq(&self, other: &ObsMap) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// The unobserved storage handle.
    pub fn raw(&self) -> Raw {
        Raw::Map(self.data())
    }

    fn track(&self, key: DepKey) {
        if self.mode.tracks() {
            self.rt.track(self.data.id, key);
        }
    }

    fn trigger(&self, key: DepKey, op: TriggerOp) {
        if self.mode.triggers() {
            self.rt
                .trigger(self.data.id, TargetKind::Map, key, op, None);
        }
    }

    /// Read an entry. Absent keys still track, so a later insert wakes the
    /// reader.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        self.track(DepKey::Entry(key.clone()));
        let raw = self.data.entries.read().get(&key).cloned();
        raw.map(|raw| Value::wrap(&self.rt, raw, self.mode.child()))
    }

    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        self.track(DepKey::Entry(key.clone()));
        self.data.entries.read().contains_key(&key)
    }

    /// Insert or update an entry. Updates that keep the same value are
    /// silent; genuine updates wake entry iterators but not key iterators.
    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Raw>) {
        let key = key.into();
        if self.mode.is_readonly() {
            tracing::warn!(%key, "write rejected on readonly map");
            return;
        }
        let raw: Raw = value.into();

        let prev = self
            .data
            .entries
            .write()
            .insert(key.clone(), raw.clone());
        match prev {
            Some(prev) => {
                if !prev.same_value(&raw) {
                    self.trigger(DepKey::Entry(key), TriggerOp::Set);
                }
            }
            None => self.trigger(DepKey::Entry(key), TriggerOp::Add),
        }
    }

    /// Remove an entry. Returns whether one existed.
    pub fn remove(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        if self.mode.is_readonly() {
            tracing::warn!(%key, "removal rejected on readonly map");
            return false;
        }
        let removed = self.data.entries.write().shift_remove(&key).is_some();
        if removed {
            self.trigger(DepKey::Entry(key), TriggerOp::Delete);
        }
        removed
    }

    /// Empty the map, waking every subscriber of it.
    pub fn clear(&self) {
        if self.mode.is_readonly() {
            tracing::warn!("clear rejected on readonly map");
            return;
        }
        let was_empty = {
            let mut entries = self.data.entries.write();
            let was_empty = entries.is_empty();
            entries.clear();
            was_empty
        };
        if !was_empty {
            self.trigger(DepKey::Iterate, TriggerOp::Clear);
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.track(DepKey::Iterate);
        self.data.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The key set, in insertion order. Subscribes to key-set changes only;
    /// value updates under existing keys do not re-run the reader.
    pub fn keys(&self) -> Vec<Key> {
        self.track(DepKey::KeyIterate);
        self.data.entries.read().keys().cloned().collect()
    }

    /// Current values, wrapped per this handle's mode.
    pub fn values(&self) -> Vec<Value> {
        self.track(DepKey::Iterate);
        let snapshot: Vec<Raw> = self.data.entries.read().values().cloned().collect();
        snapshot
            .into_iter()
            .map(|raw| Value::wrap(&self.rt, raw, self.mode.child()))
            .collect()
    }

    /// Current entries, wrapped per this handle's mode.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.track(DepKey::Iterate);
        let snapshot: Vec<(Key, Raw)> = self
            .data
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        snapshot
            .into_iter()
            .map(|(k, v)| (k, Value::wrap(&self.rt, v, self.mode.child())))
            .collect()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Key, Value)) {
        for (key, value) in self.entries() {
            f(&key, value);
        }
    }
}

impl PartialEq for ObsMap {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data) && self.mode == other.mode
    }
}

impl std::fmt::Debug for ObsMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsMap")
            .field("id", &self.data.id)
            .field("mode", &self.mode)
            .finish()
    }
}
