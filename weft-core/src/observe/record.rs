//! Observed Records
//!
//! Field-addressed containers with optional prototype delegation: a record
//! may name another record to consult when a field is missing from its own
//! entries.
//!
//! Delegation resolves to an owner before tracking or triggering. A read of
//! a delegated field subscribes at the record that actually holds it, and a
//! write to a delegated field updates that same record, so one mutation
//! produces exactly one notification no matter how long the chain is.
//! Fields that exist nowhere in the chain are created on the record that
//! was written.

use std::sync::Arc;

use crate::reactive::dep::{DepKey, TargetKind, TriggerOp};
use crate::reactive::runtime::RuntimeInner;
use crate::value::{Raw, RecordData};

use super::{Mode, Value};

/// Observed handle on shared record storage.
#[derive(Clone)]
pub struct ObsRecord {
    rt: Arc<RuntimeInner>,
    data: Arc<RecordData>,
    mode: Mode,
}

impl ObsRecord {
    pub(crate) fn new(rt: Arc<RuntimeInner>, data: Arc<RecordData>, mode: Mode) -> Self {
        Self { rt, data, mode }
    }

    pub(crate) fn data(&self) -> Arc<RecordData> {
        Arc::clone(&self.data)
    }

    pub(crate) fn target_id(&self) -> crate::reactive::dep::TargetId {
        self.data.id
    }

    /// Whether two handles observe the same storage.
    pub fn ptr_eq(&self, other: &ObsRecord) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// The unobserved storage handle.
    pub fn raw(&self) -> Raw {
        Raw::Record(self.data())
    }

    /// The record that owns `key`, walking the delegation chain.
    fn resolve_owner(&self, key: &str) -> Option<Arc<RecordData>> {
        let mut current = Arc::clone(&self.data);
        loop {
            if current.entries.read().contains_key(key) {
                return Some(current);
            }
            let next = current.proto.read().clone();
            match next {
                Some(proto) => current = proto,
                None => return None,
            }
        }
    }

    /// Read a field, consulting the delegation chain.
    ///
    /// Tracks at the owning record, or at this record when the field is
    /// absent everywhere so a later addition wakes the reader.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.resolve_owner(key) {
            Some(owner) => {
                if self.mode.tracks() {
                    self.rt.track(owner.id, DepKey::Prop(Arc::from(key)));
                }
                let raw = owner.entries.read().get(key).cloned();
                raw.map(|raw| Value::wrap(&self.rt, raw, self.mode.child()))
            }
            None => {
                if self.mode.tracks() {
                    self.rt.track(self.data.id, DepKey::Prop(Arc::from(key)));
                }
                None
            }
        }
    }

    /// Write a field. A field owned anywhere in the delegation chain is
    /// updated in place at its owner; a field owned nowhere is created on
    /// this record.
    pub fn set(&self, key: impl Into<Arc<str>>, value: impl Into<Raw>) {
        let key: Arc<str> = key.into();
        if self.mode.is_readonly() {
            tracing::warn!(%key, "write rejected on readonly record");
            return;
        }
        let raw: Raw = value.into();

        match self.resolve_owner(&key) {
            Some(owner) => {
                let prev = owner.entries.write().insert(Arc::clone(&key), raw.clone());
                let changed = !prev.is_some_and(|p| p.same_value(&raw));
                if changed && self.mode.triggers() {
                    self.rt.trigger(
                        owner.id,
                        TargetKind::Record,
                        DepKey::Prop(key),
                        TriggerOp::Set,
                        None,
                    );
                }
            }
            None => {
                self.data.entries.write().insert(Arc::clone(&key), raw);
                if self.mode.triggers() {
                    self.rt.trigger(
                        self.data.id,
                        TargetKind::Record,
                        DepKey::Prop(key),
                        TriggerOp::Add,
                        None,
                    );
                }
            }
        }
    }

    /// Remove a field from this record's own entries. Delegated fields are
    /// left alone. Returns whether a field was removed.
    pub fn remove(&self, key: &str) -> bool {
        if self.mode.is_readonly() {
            tracing::warn!(key, "removal rejected on readonly record");
            return false;
        }
        let removed = self.data.entries.write().shift_remove(key).is_some();
        if removed && self.mode.triggers() {
            self.rt.trigger(
                self.data.id,
                TargetKind::Record,
                DepKey::Prop(Arc::from(key)),
                TriggerOp::Delete,
                None,
            );
        }
        removed
    }

    /// Whether the field exists on this record or anywhere up its chain.
    pub fn contains_key(&self, key: &str) -> bool {
        match self.resolve_owner(key) {
            Some(owner) => {
                if self.mode.tracks() {
                    self.rt.track(owner.id, DepKey::Prop(Arc::from(key)));
                }
                true
            }
            None => {
                if self.mode.tracks() {
                    self.rt.track(self.data.id, DepKey::Prop(Arc::from(key)));
                }
                false
            }
        }
    }

    /// Number of own fields.
    pub fn len(&self) -> usize {
        if self.mode.tracks() {
            self.rt.track(self.data.id, DepKey::Iterate);
        }
        self.data.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Own field names, in insertion order.
    pub fn keys(&self) -> Vec<Arc<str>> {
        if self.mode.tracks() {
            self.rt.track(self.data.id, DepKey::Iterate);
        }
        self.data.entries.read().keys().cloned().collect()
    }

    /// Own fields with their values. Reading values subscribes to each
    /// field as well as to the key set.
    pub fn entries(&self) -> Vec<(Arc<str>, Value)> {
        let snapshot: Vec<(Arc<str>, Raw)> = self
            .data
            .entries
            .read()
            .iter()
            .map(|(k, v)| (Arc::clone(k), v.clone()))
            .collect();
        if self.mode.tracks() {
            self.rt.track(self.data.id, DepKey::Iterate);
            for (key, _) in &snapshot {
                self.rt.track(self.data.id, DepKey::Prop(Arc::clone(key)));
            }
        }
        snapshot
            .into_iter()
            .map(|(k, v)| (k, Value::wrap(&self.rt, v, self.mode.child())))
            .collect()
    }

    pub fn for_each(&self, mut f: impl FnMut(&str, Value)) {
        for (key, value) in self.entries() {
            f(&key, value);
        }
    }

    /// The record consulted for missing fields, if any.
    pub fn prototype(&self) -> Option<ObsRecord> {
        let proto = self.data.proto.read().clone()?;
        Some(ObsRecord::new(Arc::clone(&self.rt), proto, self.mode.child()))
    }

    /// Wire up (or clear) the delegation target. Rejected on readonly
    /// handles and when it would close a delegation cycle. This is setup
    /// wiring; it does not notify subscribers.
    pub fn set_prototype(&self, proto: Option<&ObsRecord>) {
        if self.mode.is_readonly() {
            tracing::warn!("prototype change rejected on readonly record");
            return;
        }
        if let Some(proto) = proto {
            let mut current = Some(proto.data());
            while let Some(record) = current {
                if Arc::ptr_eq(&record, &self.data) {
                    tracing::warn!("prototype change rejected, would form a cycle");
                    return;
                }
                current = record.proto.read().clone();
            }
        }
        *self.data.proto.write() = proto.map(ObsRecord::data);
    }
}

impl PartialEq for ObsRecord {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data) && self.mode == other.mode
    }
}

impl std::fmt::Debug for ObsRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsRecord")
            .field("id", &self.data.id)
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Raw, Runtime};
    use std::sync::atomic::{AtomicI32, Ordering};

    fn record(rt: &Runtime, raw: Raw) -> ObsRecord {
        rt.reactive(raw).as_record().unwrap()
    }

    #[test]
    fn missing_key_read_wakes_on_add() {
        let rt = Runtime::new();
        let obj = record(&rt, Raw::record());

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let obj_in = obj.clone();
        let _effect = rt.effect(move || {
            let _ = obj_in.get("x");
            runs_in.fetch_add(1, Ordering::SeqCst);
        });

        obj.set("x", 1i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn delegated_read_tracks_at_owner() {
        let rt = Runtime::new();
        let proto = record(&rt, Raw::record_from([("bar", 1i64)]));
        let child = record(&rt, Raw::record());
        child.set_prototype(Some(&proto));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let child_in = child.clone();
        let _effect = rt.effect(move || {
            let _ = child_in.get("bar");
            runs_in.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // The field lives on the prototype, so a direct write there wakes
        // the reader that went through the child.
        proto.set("bar", 2i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn delegated_write_runs_subscribers_exactly_once() {
        let rt = Runtime::new();
        let proto = record(&rt, Raw::record_from([("bar", 1i64)]));
        let child = record(&rt, Raw::record());
        child.set_prototype(Some(&proto));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let child_in = child.clone();
        let _effect = rt.effect(move || {
            let _ = child_in.get("bar");
            runs_in.fetch_add(1, Ordering::SeqCst);
        });

        child.set("bar", 2i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(proto.get("bar"), Some(Value::Int(2)));
        // The write landed on the owner, not as a new own field.
        assert_eq!(child.len(), 0);
    }

    #[test]
    fn add_and_delete_wake_iterators() {
        let rt = Runtime::new();
        let obj = record(&rt, Raw::record_from([("a", 1i64)]));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let obj_in = obj.clone();
        let _effect = rt.effect(move || {
            let _ = obj_in.keys();
            runs_in.fetch_add(1, Ordering::SeqCst);
        });

        obj.set("b", 2i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // Value-only update of an existing field leaves the key set alone.
        obj.set("a", 5i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        assert!(obj.remove("a"));
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn readonly_write_is_rejected() {
        let rt = Runtime::new();
        let raw = Raw::record_from([("x", 1i64)]);
        let ro = rt.readonly(raw.clone()).as_record().unwrap();
        let rw = record(&rt, raw);

        ro.set("x", 9i64);
        assert!(!ro.remove("x"));
        assert_eq!(rw.get("x"), Some(Value::Int(1)));
    }

    #[test]
    fn readonly_reads_do_not_track() {
        let rt = Runtime::new();
        let raw = Raw::record_from([("x", 1i64)]);
        let ro = rt.readonly(raw.clone()).as_record().unwrap();
        let rw = record(&rt, raw);

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let ro_in = ro.clone();
        let _effect = rt.effect(move || {
            let _ = ro_in.get("x");
            runs_in.fetch_add(1, Ordering::SeqCst);
        });

        rw.set("x", 2i64);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deep_wrapping_observes_nested_containers() {
        let rt = Runtime::new();
        let obj = record(
            &rt,
            Raw::record_from([("inner", Raw::record_from([("n", 1i64)]))]),
        );

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let obj_in = obj.clone();
        let _effect = rt.effect(move || {
            if let Some(Value::Record(inner)) = obj_in.get("inner") {
                let _ = inner.get("n");
            }
            runs_in.fetch_add(1, Ordering::SeqCst);
        });

        let inner = obj.get("inner").unwrap().as_record().unwrap();
        inner.set("n", 2i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shallow_wrapping_hands_out_plain_children() {
        let rt = Runtime::new();
        let raw = Raw::record_from([("inner", Raw::record_from([("n", 1i64)]))]);
        let obj = rt.shallow_reactive(raw).as_record().unwrap();

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let obj_in = obj.clone();
        let _effect = rt.effect(move || {
            if let Some(Value::Record(inner)) = obj_in.get("inner") {
                let _ = inner.get("n");
            }
            runs_in.fetch_add(1, Ordering::SeqCst);
        });

        // Mutating through the plain child neither tracks nor triggers.
        let inner = obj.get("inner").unwrap().as_record().unwrap();
        inner.set("n", 2i64);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Replacing the first-level field does trigger.
        obj.set("inner", Raw::record());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn prototype_cycles_are_refused() {
        let rt = Runtime::new();
        let a = record(&rt, Raw::record());
        let b = record(&rt, Raw::record());
        a.set_prototype(Some(&b));
        b.set_prototype(Some(&a));

        assert!(b.prototype().is_none());
    }
}
