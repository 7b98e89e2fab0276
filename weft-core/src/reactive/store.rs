//! Dependency Store
//!
//! The central two-level index from `(target, key)` to the set of effects
//! subscribed to that aspect. Reads insert into it via `track`, writes read
//! from it via `trigger`, and effect cleanup removes stale rows before every
//! re-run.
//!
//! Subscriptions are held weakly. An effect that was dropped without being
//! stopped simply fails to upgrade at gather time and is pruned lazily.
//!
//! Subscriber sets are insertion-ordered, so effects re-run in the order
//! they first subscribed. That makes trigger fan-out deterministic, which
//! the scheduler and the tests both rely on.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use super::dep::{DepKey, TargetId};
use super::effect::{EffectId, EffectInner};

type DepSet = IndexMap<EffectId, Weak<EffectInner>>;

/// Effects collected by one or more gather passes, deduplicated by ID.
pub(crate) type Gathered = IndexMap<EffectId, Arc<EffectInner>>;

#[derive(Default)]
pub(crate) struct DepStore {
    buckets: HashMap<TargetId, HashMap<DepKey, DepSet>>,
}

impl DepStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record that `effect` depends on `(target, key)`.
    ///
    /// Returns true when this is a new subscription, so the caller knows to
    /// append the back-reference to the effect's dep list.
    pub(crate) fn subscribe(
        &mut self,
        target: TargetId,
        key: DepKey,
        id: EffectId,
        effect: Weak<EffectInner>,
    ) -> bool {
        let set = self
            .buckets
            .entry(target)
            .or_default()
            .entry(key)
            .or_default();
        set.insert(id, effect).is_none()
    }

    /// Remove one subscription, pruning empty sets and buckets behind it.
    pub(crate) fn unsubscribe(&mut self, target: TargetId, key: &DepKey, id: EffectId) {
        let Some(keys) = self.buckets.get_mut(&target) else {
            return;
        };
        if let Some(set) = keys.get_mut(key) {
            set.shift_remove(&id);
            if set.is_empty() {
                keys.remove(key);
            }
        }
        if keys.is_empty() {
            self.buckets.remove(&target);
        }
    }

    /// Collect the live subscribers of `(target, key)` into `out`.
    pub(crate) fn gather(&self, target: TargetId, key: &DepKey, out: &mut Gathered) {
        let Some(set) = self.buckets.get(&target).and_then(|keys| keys.get(key)) else {
            return;
        };
        for (id, weak) in set {
            if let Some(effect) = weak.upgrade() {
                out.entry(*id).or_insert(effect);
            }
        }
    }

    /// Collect subscribers of every index at or beyond `min`, plus the
    /// length key. Used when a list is truncated.
    pub(crate) fn gather_truncated(&self, target: TargetId, min: usize, out: &mut Gathered) {
        let Some(keys) = self.buckets.get(&target) else {
            return;
        };
        for (key, set) in keys {
            let hit = match key {
                DepKey::Index(i) => *i >= min,
                DepKey::Length => true,
                _ => false,
            };
            if hit {
                for (id, weak) in set {
                    if let Some(effect) = weak.upgrade() {
                        out.entry(*id).or_insert(effect);
                    }
                }
            }
        }
    }

    /// Collect every subscriber of the target, whatever the key. Used when
    /// a container is cleared wholesale.
    pub(crate) fn gather_all(&self, target: TargetId, out: &mut Gathered) {
        let Some(keys) = self.buckets.get(&target) else {
            return;
        };
        for set in keys.values() {
            for (id, weak) in set {
                if let Some(effect) = weak.upgrade() {
                    out.entry(*id).or_insert(effect);
                }
            }
        }
    }

    /// Whether any effect is subscribed to any aspect of the target.
    pub(crate) fn has_subscribers(&self, target: TargetId) -> bool {
        self.buckets
            .get(&target)
            .is_some_and(|keys| keys.values().any(|set| !set.is_empty()))
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, target: TargetId, key: &DepKey) -> usize {
        self.buckets
            .get(&target)
            .and_then(|keys| keys.get(key))
            .map_or(0, |set| set.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_is_idempotent_per_effect() {
        let mut store = DepStore::new();
        let target = TargetId::next();
        let effect = EffectInner::stub();
        let key = DepKey::Prop(Arc::from("x"));

        assert!(store.subscribe(target, key.clone(), effect.id, Arc::downgrade(&effect)));
        assert!(!store.subscribe(target, key.clone(), effect.id, Arc::downgrade(&effect)));
        assert_eq!(store.subscriber_count(target, &key), 1);
    }

    #[test]
    fn unsubscribe_prunes_empty_buckets() {
        let mut store = DepStore::new();
        let target = TargetId::next();
        let effect = EffectInner::stub();
        let key = DepKey::Length;

        store.subscribe(target, key.clone(), effect.id, Arc::downgrade(&effect));
        assert!(store.has_subscribers(target));

        store.unsubscribe(target, &key, effect.id);
        assert!(!store.has_subscribers(target));
    }

    #[test]
    fn gather_skips_dead_effects() {
        let mut store = DepStore::new();
        let target = TargetId::next();
        let key = DepKey::Iterate;

        let live = EffectInner::stub();
        let dead = EffectInner::stub();
        store.subscribe(target, key.clone(), live.id, Arc::downgrade(&live));
        store.subscribe(target, key.clone(), dead.id, Arc::downgrade(&dead));
        drop(dead);

        let mut out = Gathered::new();
        store.gather(target, &key, &mut out);
        assert_eq!(out.len(), 1);
        assert!(out.contains_key(&live.id));
    }

    #[test]
    fn gather_truncated_hits_indices_beyond_cut() {
        let mut store = DepStore::new();
        let target = TargetId::next();

        let low = EffectInner::stub();
        let high = EffectInner::stub();
        let len = EffectInner::stub();
        store.subscribe(target, DepKey::Index(0), low.id, Arc::downgrade(&low));
        store.subscribe(target, DepKey::Index(5), high.id, Arc::downgrade(&high));
        store.subscribe(target, DepKey::Length, len.id, Arc::downgrade(&len));

        let mut out = Gathered::new();
        store.gather_truncated(target, 2, &mut out);
        assert!(!out.contains_key(&low.id));
        assert!(out.contains_key(&high.id));
        assert!(out.contains_key(&len.id));
    }

    #[test]
    fn gather_all_collects_every_key() {
        let mut store = DepStore::new();
        let target = TargetId::next();

        let a = EffectInner::stub();
        let b = EffectInner::stub();
        store.subscribe(
            target,
            DepKey::Entry(crate::value::Key::Int(1)),
            a.id,
            Arc::downgrade(&a),
        );
        store.subscribe(target, DepKey::Iterate, b.id, Arc::downgrade(&b));

        let mut out = Gathered::new();
        store.gather_all(target, &mut out);
        assert_eq!(out.len(), 2);
    }
}
