//! Watchers
//!
//! A watcher observes a source and calls back with the new and previous
//! value when it changes. Sources are either a tracked getter closure or an
//! observed container, which is traversed deeply so any nested change
//! fires the callback.
//!
//! # Flush timing
//!
//! A `Sync` watcher fires in the same call stack as the write. A `Post`
//! watcher is queued on the post lane and fires after pending effect
//! re-runs have settled, when the outermost trigger or batch unwinds.
//!
//! # Invalidation
//!
//! The callback may register a cleanup through [`OnCleanup`]. It runs
//! before the next callback and when the watcher stops, which is where
//! in-flight work tied to the previous value gets cancelled.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::dep::TargetId;
use super::effect::{Effect, EffectInner, EffectOptions, SchedulerFn};
use super::runtime::Runtime;
use crate::observe::Value;
use crate::value::Raw;

/// What a watcher observes.
pub enum WatchSource {
    /// A tracked closure; the watcher fires when anything it read changes.
    Getter(Box<dyn FnMut() -> Raw + Send>),
    /// An observed container, traversed deeply on every run.
    Observed(Value),
}

impl WatchSource {
    pub fn getter(f: impl FnMut() -> Raw + Send + 'static) -> Self {
        WatchSource::Getter(Box::new(f))
    }
}

impl From<Value> for WatchSource {
    fn from(value: Value) -> Self {
        WatchSource::Observed(value)
    }
}

/// When a watcher's callback runs relative to the write that woke it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    #[default]
    Sync,
    Post,
}

/// Options for [`Runtime::watch`].
#[derive(Default)]
pub struct WatchOptions {
    /// Fire the callback once at registration, with no previous value.
    pub immediate: bool,
    pub flush: FlushMode,
}

type CleanupSlot = Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>;

/// Handed to the watcher callback for registering invalidation cleanup.
pub struct OnCleanup {
    slot: CleanupSlot,
}

impl OnCleanup {
    /// Register a cleanup to run before the next callback or on stop.
    /// Registering again within one callback replaces the previous one.
    pub fn on_invalidate(&self, f: impl FnOnce() + Send + 'static) {
        *self.slot.lock() = Some(Box::new(f));
    }
}

/// Handle to a registered watcher.
pub struct WatchHandle {
    effect: Effect,
    cleanup: CleanupSlot,
}

impl WatchHandle {
    /// Stop watching. Runs any pending invalidation cleanup.
    pub fn stop(&self) {
        if let Some(cleanup) = self.cleanup.lock().take() {
            cleanup();
        }
        self.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }
}

impl Runtime {
    /// Watch a source and call back with `(new, old, on_cleanup)` when it
    /// changes. `old` is `None` only for an immediate first call.
    pub fn watch<F>(
        &self,
        source: impl Into<WatchSource>,
        callback: F,
        options: WatchOptions,
    ) -> WatchHandle
    where
        F: FnMut(Raw, Option<Raw>, &OnCleanup) + Send + 'static,
    {
        let mut source = source.into();
        let value_slot: Arc<Mutex<Option<Raw>>> = Arc::new(Mutex::new(None));
        let old_slot: Arc<Mutex<Option<Raw>>> = Arc::new(Mutex::new(None));
        let cleanup: CleanupSlot = Arc::new(Mutex::new(None));
        // Held weakly: the job is captured by the effect's own scheduler,
        // so a strong handle here would keep the effect alive forever.
        let effect_cell: Arc<Mutex<Weak<EffectInner>>> = Arc::new(Mutex::new(Weak::new()));
        let callback = Arc::new(Mutex::new(callback));

        let value_in = value_slot.clone();
        let body = move || {
            let value = match &mut source {
                WatchSource::Getter(f) => f(),
                WatchSource::Observed(observed) => {
                    traverse(observed, &mut HashSet::new());
                    observed.raw()
                }
            };
            *value_in.lock() = Some(value);
        };

        let job: Arc<dyn Fn() + Send + Sync> = {
            let cleanup = cleanup.clone();
            let effect_cell = effect_cell.clone();
            let value_slot = value_slot.clone();
            let old_slot = old_slot.clone();
            let callback = callback.clone();
            Arc::new(move || {
                let Some(inner) = effect_cell.lock().upgrade() else {
                    return;
                };
                let effect = Effect { inner };
                if !effect.is_active() {
                    return;
                }
                if let Some(invalidate) = cleanup.lock().take() {
                    invalidate();
                }
                effect.run();
                let new = value_slot.lock().clone().unwrap_or(Raw::Unit);
                let old = old_slot.lock().replace(new.clone());
                let guard = OnCleanup {
                    slot: cleanup.clone(),
                };
                (callback.lock())(new, old, &guard);
            })
        };

        let scheduler: SchedulerFn = match options.flush {
            FlushMode::Sync => {
                let job = job.clone();
                Arc::new(move |_effect: Effect| job())
            }
            FlushMode::Post => {
                let job = job.clone();
                let rt = Arc::downgrade(&self.inner);
                Arc::new(move |effect: Effect| {
                    if let Some(rt) = rt.upgrade() {
                        let job = job.clone();
                        rt.queue.enqueue_post(effect.id().0, Box::new(move || job()));
                    }
                })
            }
        };

        let effect = self.effect_with(
            EffectOptions {
                lazy: true,
                scheduler: Some(scheduler),
            },
            body,
        );
        *effect_cell.lock() = Arc::downgrade(&effect.inner);

        if options.immediate {
            job();
        } else {
            // Collect dependencies and the baseline without firing.
            effect.run();
            let initial = value_slot.lock().clone();
            *old_slot.lock() = initial;
        }

        WatchHandle { effect, cleanup }
    }
}

/// Visit every reachable field of an observed container, subscribing the
/// running effect to all of it. Cycles are cut on container identity.
fn traverse(value: &Value, seen: &mut HashSet<TargetId>) {
    match value {
        Value::Record(record) => {
            if seen.insert(record.target_id()) {
                for (_, child) in record.entries() {
                    traverse(&child, seen);
                }
            }
        }
        Value::List(list) => {
            if seen.insert(list.target_id()) {
                for child in list.to_vec() {
                    traverse(&child, seen);
                }
            }
        }
        Value::Map(map) => {
            if seen.insert(map.target_id()) {
                let _ = map.keys();
                for (_, child) in map.entries() {
                    traverse(&child, seen);
                }
            }
        }
        Value::Set(set) => {
            let _ = set.to_vec();
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn getter_watch_reports_new_and_old() {
        let rt = Runtime::new();
        let state = rt.reactive(Raw::record_from([("n", 1i64)]));
        let record = state.as_record().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        let record_in = record.clone();
        let _watch = rt.watch(
            WatchSource::getter(move || {
                record_in.get("n").map(Raw::from).unwrap_or(Raw::Unit)
            }),
            move |new, old, _| {
                seen_in.lock().push((new, old));
            },
            WatchOptions::default(),
        );

        record.set("n", 2i64);
        let calls = seen.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.same_value(&Raw::Int(2)));
        assert!(calls[0].1.as_ref().unwrap().same_value(&Raw::Int(1)));
    }

    #[test]
    fn immediate_watch_fires_with_no_previous_value() {
        let rt = Runtime::new();
        let state = rt.reactive(Raw::record_from([("n", 1i64)]));
        let record = state.as_record().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        let record_in = record.clone();
        let _watch = rt.watch(
            WatchSource::getter(move || {
                record_in.get("n").map(Raw::from).unwrap_or(Raw::Unit)
            }),
            move |new, old, _| {
                seen_in.lock().push((new, old.is_none()));
            },
            WatchOptions {
                immediate: true,
                ..Default::default()
            },
        );

        {
            let calls = seen.lock();
            assert_eq!(calls.len(), 1);
            assert!(calls[0].0.same_value(&Raw::Int(1)));
            assert!(calls[0].1);
        }

        record.set("n", 2i64);
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn observed_source_fires_on_nested_change() {
        let rt = Runtime::new();
        let state = rt.reactive(Raw::record_from([(
            "inner",
            Raw::record_from([("n", 1i64)]),
        )]));

        let calls = Arc::new(AtomicI32::new(0));
        let calls_in = calls.clone();
        let _watch = rt.watch(
            state.clone(),
            move |_, _, _| {
                calls_in.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );

        let inner = state
            .as_record()
            .unwrap()
            .get("inner")
            .unwrap()
            .as_record()
            .unwrap();
        inner.set("n", 2i64);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn post_watch_fires_after_batch_settles() {
        let rt = Runtime::new();
        let state = rt.reactive(Raw::record_from([("n", 0i64)]));
        let record = state.as_record().unwrap();

        let calls = Arc::new(AtomicI32::new(0));
        let calls_in = calls.clone();
        let record_in = record.clone();
        let _watch = rt.watch(
            WatchSource::getter(move || {
                record_in.get("n").map(Raw::from).unwrap_or(Raw::Unit)
            }),
            move |_, _, _| {
                calls_in.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions {
                flush: FlushMode::Post,
                ..Default::default()
            },
        );

        let calls_out = calls.clone();
        rt.batch(|| {
            record.set("n", 1i64);
            record.set("n", 2i64);
            assert_eq!(calls_out.load(Ordering::SeqCst), 0);
        });

        // Two writes, one deferred callback, observing the final value.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn post_watch_sees_state_after_sync_effects() {
        let rt = Runtime::new();
        let state = rt.reactive(Raw::record_from([("n", 0i64)]));
        let record = state.as_record().unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));

        let order_in = order.clone();
        let record_in = record.clone();
        let _effect = rt.effect(move || {
            let _ = record_in.get("n");
            order_in.lock().push("effect");
        });
        order.lock().clear();

        let order_in = order.clone();
        let record_in = record.clone();
        let _watch = rt.watch(
            WatchSource::getter(move || {
                record_in.get("n").map(Raw::from).unwrap_or(Raw::Unit)
            }),
            move |_, _, _| {
                order_in.lock().push("watch");
            },
            WatchOptions {
                flush: FlushMode::Post,
                ..Default::default()
            },
        );

        record.set("n", 1i64);
        assert_eq!(*order.lock(), vec!["effect", "watch"]);
    }

    #[test]
    fn invalidation_cleanup_runs_before_next_callback() {
        let rt = Runtime::new();
        let state = rt.reactive(Raw::record_from([("n", 0i64)]));
        let record = state.as_record().unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let log_in = log.clone();
        let record_in = record.clone();
        let watch = rt.watch(
            WatchSource::getter(move || {
                record_in.get("n").map(Raw::from).unwrap_or(Raw::Unit)
            }),
            move |new, _, on_cleanup| {
                let log = log_in.clone();
                log.lock().push(format!("run {new:?}"));
                let log_for_cleanup = log_in.clone();
                on_cleanup.on_invalidate(move || {
                    log_for_cleanup.lock().push("cleanup".to_string());
                });
            },
            WatchOptions::default(),
        );

        record.set("n", 1i64);
        record.set("n", 2i64);
        watch.stop();

        assert_eq!(
            *log.lock(),
            vec!["run Int(1)", "cleanup", "run Int(2)", "cleanup"]
        );
    }

    #[test]
    fn stopped_watcher_releases_its_closures() {
        let sentinel = Arc::new(());
        let rt = Runtime::new();
        let state = rt.reactive(Raw::record_from([("n", 0i64)]));
        let record = state.as_record().unwrap();

        let in_getter = sentinel.clone();
        let in_callback = sentinel.clone();
        let record_in = record.clone();
        let watch = rt.watch(
            WatchSource::getter(move || {
                let _ = &in_getter;
                record_in.get("n").map(Raw::from).unwrap_or(Raw::Unit)
            }),
            move |_, _, _| {
                let _ = &in_callback;
            },
            WatchOptions::default(),
        );

        record.set("n", 1i64);
        watch.stop();
        drop(watch);
        drop(record);
        drop(state);
        drop(rt);

        assert_eq!(Arc::strong_count(&sentinel), 1);
    }

    #[test]
    fn stopped_watch_goes_quiet() {
        let rt = Runtime::new();
        let state = rt.reactive(Raw::record_from([("n", 0i64)]));
        let record = state.as_record().unwrap();

        let calls = Arc::new(AtomicI32::new(0));
        let calls_in = calls.clone();
        let record_in = record.clone();
        let watch = rt.watch(
            WatchSource::getter(move || {
                record_in.get("n").map(Raw::from).unwrap_or(Raw::Unit)
            }),
            move |_, _, _| {
                calls_in.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );

        record.set("n", 1i64);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        watch.stop();
        assert!(!watch.is_active());
        record.set("n", 2i64);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
