//! Reactive Runtime
//!
//! The engine instance. A [`Runtime`] owns the dependency store, the
//! tracking context, and the job queue; every observable wrapper, effect,
//! derived value, and watcher is created through one and stays bound to it.
//! Two runtimes in one process are fully independent.
//!
//! # How It Works
//!
//! 1. Reads call [`RuntimeInner::track`], which subscribes the innermost
//!    running effect to the `(target, key)` that was read.
//! 2. Writes call [`RuntimeInner::trigger`], which gathers subscribers for
//!    the written key plus whatever sentinel keys the operation disturbs,
//!    then re-runs each one inline or hands it to its scheduler.
//! 3. Deferred jobs drain when the outermost trigger or [`Runtime::batch`]
//!    scope unwinds. Inside a batch, even schedulerless effects are queued,
//!    so N writes cost one re-run per affected effect.
//!
//! Runaway cascades (effects writing each other's dependencies forever) are
//! cut off at a fixed trigger depth and reported through `tracing`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::context::TrackContext;
use super::dep::{DepKey, TargetId, TargetKind, TriggerOp};
use super::effect::{Effect, EffectInner, EffectOptions, SchedulerFn};
use super::scheduler::JobQueue;
use super::store::{DepStore, Gathered};

/// Nested trigger cascades deeper than this are dropped.
const MAX_TRIGGER_DEPTH: usize = 64;

/// A reactive engine instance.
///
/// Cheap to clone; clones share the same store, context, and queue.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    pub(crate) store: Mutex<DepStore>,
    pub(crate) context: Arc<TrackContext>,
    pub(crate) queue: JobQueue,
    batch_depth: AtomicUsize,
    trigger_depth: AtomicUsize,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                store: Mutex::new(DepStore::new()),
                context: Arc::new(TrackContext::new()),
                queue: JobQueue::new(),
                batch_depth: AtomicUsize::new(0),
                trigger_depth: AtomicUsize::new(0),
            }),
        }
    }

    /// Register an effect and run it once to collect its dependencies.
    pub fn effect<F>(&self, f: F) -> Effect
    where
        F: FnMut() + Send + 'static,
    {
        self.effect_with(EffectOptions::default(), f)
    }

    /// Register an effect with explicit options.
    pub fn effect_with<F>(&self, options: EffectOptions, f: F) -> Effect
    where
        F: FnMut() + Send + 'static,
    {
        let inner = EffectInner::new(
            Arc::downgrade(&self.inner),
            Box::new(f),
            options.scheduler,
        );
        let effect = Effect { inner };
        if !options.lazy {
            effect.run();
        }
        effect
    }

    /// Run `f` with all writes coalesced: affected effects re-run at most
    /// once, after `f` and any enclosing batches return.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.batch_depth.fetch_add(1, Ordering::SeqCst);
        let _guard = BatchGuard {
            inner: Arc::clone(&self.inner),
        };
        f()
    }

    /// Run `f` with dependency tracking suppressed. Reads inside establish
    /// no subscriptions for the surrounding effect.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _pause = self.inner.context.pause();
        f()
    }

    /// A scheduler that defers effect re-runs to the shared job queue,
    /// deduplicated per effect.
    pub fn queued_scheduler(&self) -> SchedulerFn {
        let inner = Arc::downgrade(&self.inner);
        Arc::new(move |effect: Effect| {
            if let Some(rt) = inner.upgrade() {
                rt.queue
                    .enqueue(effect.id().0, Box::new(move || effect.run()));
            }
        })
    }

    /// Drain any queued jobs now instead of waiting for the next unwind.
    pub fn flush(&self) {
        self.inner.queue.flush();
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeInner {
    /// Subscribe the innermost running effect to `(target, key)`.
    pub(crate) fn track(&self, target: TargetId, key: DepKey) {
        if self.context.is_paused() {
            return;
        }
        let Some((id, effect)) = self.context.active() else {
            return;
        };
        let fresh = self
            .store
            .lock()
            .subscribe(target, key.clone(), id, Arc::downgrade(&effect));
        if fresh {
            effect.deps.lock().push((target, key));
        }
    }

    /// Notify subscribers that `(target, key)` changed via `op`.
    ///
    /// `new_len` carries the post-write length for list length writes, so
    /// truncation can wake subscribers of the removed slots.
    pub(crate) fn trigger(
        &self,
        target: TargetId,
        kind: TargetKind,
        key: DepKey,
        op: TriggerOp,
        new_len: Option<usize>,
    ) {
        let depth = self.trigger_depth.fetch_add(1, Ordering::SeqCst);
        let _depth = DepthGuard(&self.trigger_depth);
        if depth >= MAX_TRIGGER_DEPTH {
            tracing::error!(depth, ?target, "trigger cascade too deep, dropping");
            return;
        }

        let mut gathered = Gathered::new();
        {
            let store = self.store.lock();
            if op == TriggerOp::Clear {
                store.gather_all(target, &mut gathered);
            } else if kind == TargetKind::List && key == DepKey::Length && op == TriggerOp::Set {
                store.gather_truncated(target, new_len.unwrap_or(0), &mut gathered);
            } else {
                store.gather(target, &key, &mut gathered);
                match op {
                    TriggerOp::Add | TriggerOp::Delete => {
                        store.gather(target, &DepKey::Iterate, &mut gathered);
                        if kind == TargetKind::Map {
                            store.gather(target, &DepKey::KeyIterate, &mut gathered);
                        }
                        if kind == TargetKind::List && op == TriggerOp::Add {
                            store.gather(target, &DepKey::Length, &mut gathered);
                        }
                    }
                    TriggerOp::Set => {
                        // Map value updates disturb entry iteration but not
                        // the key set.
                        if kind == TargetKind::Map {
                            store.gather(target, &DepKey::Iterate, &mut gathered);
                        }
                    }
                    TriggerOp::Clear => unreachable!(),
                }
            }
        }

        // A write made by the effect that depends on the same key must not
        // re-run that effect, or every self-referential update would spin.
        if let Some(active) = self.context.active_id() {
            gathered.shift_remove(&active);
        }

        let deferred = self.batch_depth.load(Ordering::SeqCst) > 0;
        for (_, inner) in gathered {
            let effect = Effect { inner };
            if !effect.is_active() {
                continue;
            }
            if effect.inner.scheduler.is_some() {
                effect.schedule_or_run();
            } else if deferred {
                self.queue
                    .enqueue(effect.id().0, Box::new(move || effect.run()));
            } else {
                effect.run();
            }
        }

        // Deferred work drains when the outermost trigger unwinds, unless a
        // batch is still open; then the batch guard does it.
        if depth == 0 && !deferred {
            self.queue.flush();
        }
    }

    /// Drop every subscription recorded by the effect's previous run.
    pub(crate) fn cleanup_effect(&self, effect: &Arc<EffectInner>) {
        let deps = std::mem::take(&mut *effect.deps.lock());
        if deps.is_empty() {
            return;
        }
        let mut store = self.store.lock();
        for (target, key) in deps {
            store.unsubscribe(target, &key, effect.id);
        }
    }

    pub(crate) fn has_subscribers(&self, target: TargetId) -> bool {
        self.store.lock().has_subscribers(target)
    }
}

struct BatchGuard {
    inner: Arc<RuntimeInner>,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if self.inner.batch_depth.fetch_sub(1, Ordering::SeqCst) == 1
            && !self.inner.queue.is_empty()
        {
            self.inner.queue.flush();
        }
    }
}

struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
