//! Derived Values
//!
//! A [`Computed`] caches the result of a tracked closure and recomputes it
//! lazily. Nothing runs at creation; the first read computes, later reads
//! return the cache until a dependency of the closure changes.
//!
//! # How It Works
//!
//! 1. The closure runs inside a lazy effect, so its reads subscribe the
//!    effect to whatever it touched.
//! 2. When a dependency changes, the effect's scheduler runs instead of the
//!    closure. It flips the dirty flag and notifies readers of the derived
//!    value. The recompute itself is deferred to the next read.
//! 3. Reads inside other effects track the derived value's own target, so
//!    invalidation propagates outward through chains of derived values.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::dep::{DepKey, TargetId, TargetKind, TriggerOp};
use super::effect::{Effect, EffectOptions};
use super::runtime::{Runtime, RuntimeInner};

/// A lazily recomputed, cached derivation of reactive state.
pub struct Computed<T> {
    rt: Weak<RuntimeInner>,
    effect: Effect,
    slot: Arc<Mutex<Option<T>>>,
    dirty: Arc<AtomicBool>,
    target: TargetId,
}

impl Runtime {
    /// Create a derived value from a tracked closure.
    pub fn computed<T, F>(&self, mut f: F) -> Computed<T>
    where
        T: Clone + Send + 'static,
        F: FnMut() -> T + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(None));
        let dirty = Arc::new(AtomicBool::new(true));
        let target = TargetId::next();

        let rt = Arc::downgrade(&self.inner);
        let dirty_in = dirty.clone();
        let rt_in = rt.clone();
        let scheduler = Arc::new(move |_effect: Effect| {
            // Invalidate once; further source changes before the next read
            // have nothing left to do.
            if !dirty_in.swap(true, Ordering::SeqCst) {
                if let Some(rt) = rt_in.upgrade() {
                    if rt.has_subscribers(target) {
                        rt.trigger(
                            target,
                            TargetKind::Node,
                            DepKey::Prop(Arc::from("value")),
                            TriggerOp::Set,
                            None,
                        );
                    }
                }
            }
        });

        let slot_in = slot.clone();
        let effect = self.effect_with(
            EffectOptions {
                lazy: true,
                scheduler: Some(scheduler),
            },
            move || {
                *slot_in.lock() = Some(f());
            },
        );

        Computed {
            rt,
            effect,
            slot,
            dirty,
            target,
        }
    }
}

impl<T: Clone> Computed<T> {
    /// Current value, recomputing first if a dependency changed since the
    /// last read. Reads inside an effect subscribe it to this value.
    pub fn get(&self) -> T {
        if self.dirty.swap(false, Ordering::SeqCst) {
            self.effect.run();
        }
        if self.slot.lock().is_none() {
            // The tracked run was skipped: stopped before the first read,
            // or the runtime is gone. Fill the cache untracked.
            self.effect.run_detached();
        }
        if let Some(rt) = self.rt.upgrade() {
            rt.track(self.target, DepKey::Prop(Arc::from("value")));
        }
        self.slot
            .lock()
            .clone()
            .expect("derived value read during its own recomputation")
    }
}

impl<T> Computed<T> {
    /// Detach from sources. The cached value keeps serving reads but never
    /// recomputes again.
    pub fn stop(&self) {
        self.effect.stop();
        self.dirty.store(false, Ordering::SeqCst);
    }
}
