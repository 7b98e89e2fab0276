//! Observed Lists
//!
//! Index-addressed containers. Slot reads track their index; length reads
//! track the length key; iteration tracks the length plus every slot it
//! visits.
//!
//! Index and length writes are coupled. Writing past the end grows the list
//! and wakes length subscribers along with the new slot's. Shrinking the
//! length wakes subscribers of every slot that fell off the end.
//!
//! Mutators suppress tracking for their own internal reads, so an effect
//! that pushes to a list it also iterates does not subscribe itself to the
//! write.

use std::sync::Arc;

use crate::reactive::dep::{DepKey, TargetKind, TriggerOp};
use crate::reactive::runtime::RuntimeInner;
use crate::value::{ListData, Raw};

use super::{Mode, Value};

/// Observed handle on shared list storage.
#[derive(Clone)]
pub struct ObsList {
    rt: Arc<RuntimeInner>,
    data: Arc<ListData>,
    mode: Mode,
}

impl ObsList {
    pub(crate) fn new(rt: Arc<RuntimeInner>, data: Arc<ListData>, mode: Mode) -> Self {
        Self { rt, data, mode }
    }

    pub(crate) fn data(&self) -> Arc<ListData> {
        Arc::clone(&self.data)
    }

    pub(crate) fn target_id(&self) -> crate::reactive::dep::TargetId {
        self.data.id
    }

    /// Whether two handles observe the same storage.
    pub fn ptr_eq(&self, other: &ObsList) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// The unobserved storage handle.
    pub fn raw(&self) -> Raw {
        Raw::List(self.data())
    }

    fn trigger(&self, key: DepKey, op: TriggerOp, new_len: Option<usize>) {
        if self.mode.triggers() {
            self.rt
                .trigger(self.data.id, TargetKind::List, key, op, new_len);
        }
    }

    /// Read a slot. Out-of-range reads still track the index, so a later
    /// grow that fills it wakes the reader.
    pub fn get(&self, index: usize) -> Option<Value> {
        if self.mode.tracks() {
            self.rt.track(self.data.id, DepKey::Index(index));
        }
        let raw = self.data.items.read().get(index).cloned();
        raw.map(|raw| Value::wrap(&self.rt, raw, self.mode.child()))
    }

    /// Write a slot. In-range writes update in place; writes past the end
    /// grow the list, padding intermediate slots with `Unit`. A growth
    /// wakes the padded slots and the length along with the written slot.
    pub fn set(&self, index: usize, value: impl Into<Raw>) {
        if self.mode.is_readonly() {
            tracing::warn!(index, "write rejected on readonly list");
            return;
        }
        let raw: Raw = value.into();

        // Tracking stays suppressed for the mutation itself but not for the
        // trigger, where woken effects rebuild their subscriptions.
        let grown_from = {
            let _pause = self.rt.context.pause();
            let mut items = self.data.items.write();
            if index < items.len() {
                let prev = std::mem::replace(&mut items[index], raw.clone());
                if prev.same_value(&raw) {
                    return;
                }
                None
            } else {
                let old_len = items.len();
                items.resize(index + 1, Raw::Unit);
                items[index] = raw;
                Some(old_len)
            }
        };

        match grown_from {
            // Every slot from the old length on exists now, the written
            // one and the padding alike.
            Some(old_len) => self.trigger(DepKey::Length, TriggerOp::Set, Some(old_len)),
            None => self.trigger(DepKey::Index(index), TriggerOp::Set, None),
        }
    }

    pub fn len(&self) -> usize {
        if self.mode.tracks() {
            self.rt.track(self.data.id, DepKey::Length);
        }
        self.data.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resize the list, padding with `Unit` on grow and dropping the tail
    /// on shrink. Subscribers of every slot at or past the smaller of the
    /// two lengths are woken, along with length subscribers.
    pub fn set_len(&self, new_len: usize) {
        if self.mode.is_readonly() {
            tracing::warn!(new_len, "resize rejected on readonly list");
            return;
        }
        let cut = {
            let _pause = self.rt.context.pause();
            let mut items = self.data.items.write();
            let old_len = items.len();
            if old_len == new_len {
                return;
            }
            items.resize(new_len, Raw::Unit);
            old_len.min(new_len)
        };
        self.trigger(DepKey::Length, TriggerOp::Set, Some(cut));
    }

    /// Append an element.
    pub fn push(&self, value: impl Into<Raw>) {
        if self.mode.is_readonly() {
            tracing::warn!("push rejected on readonly list");
            return;
        }
        let raw: Raw = value.into();
        let index = {
            let _pause = self.rt.context.pause();
            let mut items = self.data.items.write();
            items.push(raw);
            items.len() - 1
        };
        self.trigger(DepKey::Index(index), TriggerOp::Add, None);
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        if self.mode.is_readonly() {
            tracing::warn!("pop rejected on readonly list");
            return None;
        }
        let (raw, new_len) = {
            let _pause = self.rt.context.pause();
            let mut items = self.data.items.write();
            let raw = items.pop()?;
            (raw, items.len())
        };
        self.trigger(DepKey::Length, TriggerOp::Set, Some(new_len));
        Some(Value::wrap(&self.rt, raw, self.mode.child()))
    }

    /// Insert an element, shifting everything at or past `index`.
    pub fn insert(&self, index: usize, value: impl Into<Raw>) {
        if self.mode.is_readonly() {
            tracing::warn!(index, "insert rejected on readonly list");
            return;
        }
        let raw: Raw = value.into();
        {
            let _pause = self.rt.context.pause();
            let mut items = self.data.items.write();
            let at = index.min(items.len());
            items.insert(at, raw);
        }
        // Every slot from the insertion point on holds a different value
        // now, and the length changed with them.
        self.trigger(DepKey::Length, TriggerOp::Set, Some(index));
    }

    /// Remove and return the element at `index`, shifting the tail down.
    pub fn remove(&self, index: usize) -> Option<Value> {
        if self.mode.is_readonly() {
            tracing::warn!(index, "removal rejected on readonly list");
            return None;
        }
        let raw = {
            let _pause = self.rt.context.pause();
            let mut items = self.data.items.write();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        self.trigger(DepKey::Length, TriggerOp::Set, Some(index));
        Some(Value::wrap(&self.rt, raw, self.mode.child()))
    }

    /// Empty the list, waking every subscriber of it.
    pub fn clear(&self) {
        if self.mode.is_readonly() {
            tracing::warn!("clear rejected on readonly list");
            return;
        }
        let was_empty = {
            let _pause = self.rt.context.pause();
            let mut items = self.data.items.write();
            let was_empty = items.is_empty();
            items.clear();
            was_empty
        };
        if !was_empty {
            self.trigger(DepKey::Length, TriggerOp::Clear, Some(0));
        }
    }

    /// Whether any slot holds the same value, by change-detection equality.
    /// Subscribes to the length and every slot.
    pub fn contains(&self, value: impl Into<Raw>) -> bool {
        self.position(value).is_some()
    }

    /// First slot holding the same value, by change-detection equality.
    pub fn position(&self, value: impl Into<Raw>) -> Option<usize> {
        let needle: Raw = value.into();
        let items = self.snapshot();
        items.iter().position(|item| item.same_value(&needle))
    }

    /// Copy out the current elements, wrapped per this handle's mode.
    pub fn to_vec(&self) -> Vec<Value> {
        self.snapshot()
            .into_iter()
            .map(|raw| Value::wrap(&self.rt, raw, self.mode.child()))
            .collect()
    }

    pub fn for_each(&self, mut f: impl FnMut(usize, Value)) {
        for (index, value) in self.to_vec().into_iter().enumerate() {
            f(index, value);
        }
    }

    /// Clone the items out, subscribing to the length and every slot.
    fn snapshot(&self) -> Vec<Raw> {
        let items: Vec<Raw> = self.data.items.read().clone();
        if self.mode.tracks() {
            self.rt.track(self.data.id, DepKey::Length);
            for index in 0..items.len() {
                self.rt.track(self.data.id, DepKey::Index(index));
            }
        }
        items
    }
}

impl PartialEq for ObsList {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data) && self.mode == other.mode
    }
}

impl std::fmt::Debug for ObsList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsList")
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

    fn list(rt: &Runtime, raw: Raw) -> ObsList {
        rt.reactive(raw).as_list().unwrap()
    }

    #[test]
    fn slot_reads_track_their_index() {
        let rt = Runtime::new();
        let items = list(&rt, Raw::list_from([1i64, 2, 3]));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let items_in = items.clone();
        let _effect = rt.effect(move || {
            let _ = items_in.get(1);
            runs_in.fetch_add(1, Ordering::SeqCst);
        });

        items.set(0, 9i64);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        items.set(1, 9i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn growing_write_wakes_length_subscribers_once() {
        let rt = Runtime::new();
        let items = list(&rt, Raw::list_from([1i64]));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let items_in = items.clone();
        let _effect = rt.effect(move || {
            let _ = items_in.len();
            runs_in.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        items.set(3, 7i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(items.get(2), Some(Value::Unit));
        assert_eq!(items.get(3), Some(Value::Int(7)));
    }

    #[test]
    fn growth_wakes_padded_slot_readers() {
        let rt = Runtime::new();
        let items = list(&rt, Raw::list_from([1i64]));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let items_in = items.clone();
        let _effect = rt.effect(move || {
            let _ = items_in.get(2);
            runs_in.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(items.get(2), None);

        // Slot 2 is padding, not the written slot, but it exists now.
        items.set(4, 9i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(items.get(2), Some(Value::Unit));
    }

    #[test]
    fn shrinking_length_wakes_dropped_slots() {
        let rt = Runtime::new();
        let items = list(&rt, Raw::list_from([1i64, 2, 3, 4]));

        let tail_runs = Arc::new(AtomicI32::new(0));
        let head_runs = Arc::new(AtomicI32::new(0));

        let tail_in = tail_runs.clone();
        let items_in = items.clone();
        let _tail = rt.effect(move || {
            let _ = items_in.get(3);
            tail_in.fetch_add(1, Ordering::SeqCst);
        });
        let head_in = head_runs.clone();
        let items_in = items.clone();
        let _head = rt.effect(move || {
            let _ = items_in.get(0);
            head_in.fetch_add(1, Ordering::SeqCst);
        });

        items.set_len(2);
        assert_eq!(tail_runs.load(Ordering::SeqCst), 2);
        assert_eq!(head_runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn push_wakes_iterating_effect_exactly_once() {
        let rt = Runtime::new();
        let items = list(&rt, Raw::list_from([1i64, 2]));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let items_in = items.clone();
        let _effect = rt.effect(move || {
            let mut total = 0;
            items_in.for_each(|_, v| {
                if let Value::Int(n) = v {
                    total += n;
                }
            });
            let _ = total;
            runs_in.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        items.push(3i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effect_pushing_to_its_own_list_does_not_spin() {
        let rt = Runtime::new();
        let items = list(&rt, Raw::list());

        let items_in = items.clone();
        let _effect = rt.effect(move || {
            items_in.push(1i64);
        });

        assert_eq!(items.len(), 1);
    }

    #[test]
    fn pop_wakes_last_slot_and_length_once() {
        let rt = Runtime::new();
        let items = list(&rt, Raw::list_from([1i64, 2]));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let items_in = items.clone();
        let _effect = rt.effect(move || {
            let _ = items_in.len();
            let _ = items_in.get(1);
            runs_in.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let popped = items.pop();
        assert_eq!(popped, Some(Value::Int(2)));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn insert_and_remove_wake_shifted_slots() {
        let rt = Runtime::new();
        let items = list(&rt, Raw::list_from([1i64, 2, 3]));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let items_in = items.clone();
        let _effect = rt.effect(move || {
            let _ = items_in.get(2);
            runs_in.fetch_add(1, Ordering::SeqCst);
        });

        items.insert(1, 9i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        items.remove(0);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn contains_observes_membership() {
        let rt = Runtime::new();
        let nested = Raw::record_from([("x", 1i64)]);
        let items = list(&rt, Raw::list_from([nested.clone()]));

        // The handle read back out is the same storage that went in.
        assert!(items.contains(nested));
        assert_eq!(items.position(Raw::record()), None);

        let read_back = items.get(0).unwrap().raw();
        assert!(items.contains(read_back));
    }

    #[test]
    fn clear_wakes_every_subscriber() {
        let rt = Runtime::new();
        let items = list(&rt, Raw::list_from([1i64, 2]));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in = runs.clone();
        let items_in = items.clone();
        let _effect = rt.effect(move || {
            let _ = items_in.get(0);
            runs_in.fetch_add(1, Ordering::SeqCst);
        });

        items.clear();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(items.is_empty());
    }

    #[test]
    fn readonly_list_rejects_mutation() {
        let rt = Runtime::new();
        let raw = Raw::list_from([1i64]);
        let ro = rt.readonly(raw.clone()).as_list().unwrap();
        let rw = list(&rt, raw);

        ro.push(2i64);
        ro.set(0, 9i64);
        assert!(ro.pop().is_none());
        assert_eq!(rw.len(), 1);
        assert_eq!(rw.get(0), Some(Value::Int(1)));
    }
}
