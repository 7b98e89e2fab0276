//! Reactive Effects
//!
//! An effect is a re-runnable unit of computation. Every run first drops the
//! subscriptions recorded by the previous run, then re-executes the body
//! with a tracking frame active, rebuilding the dependency set from exactly
//! the reads that actually happened. Branches not taken this run therefore
//! stop re-running the effect.
//!
//! Effects are explicit records: the closure, the dependency
//! back-references, the optional scheduler hook, and an active flag live in
//! one shared allocation that the dependency store subscribes to weakly.
//!
//! # Scheduler hook
//!
//! When a dependency changes, an effect without a scheduler re-runs inline,
//! in the same call stack as the write. An effect with a scheduler is handed
//! to it instead; the scheduler decides when (or whether) to call
//! [`Effect::run`]. Deferral, deduplication, and batching are all built from
//! this one hook.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::dep::{next_serial, DepKey, TargetId};
use super::runtime::RuntimeInner;

/// Unique identifier for an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(pub(crate) u64);

impl EffectId {
    pub(crate) fn next() -> Self {
        EffectId(next_serial())
    }
}

/// Caller-supplied override for how an effect re-runs.
pub type SchedulerFn = Arc<dyn Fn(Effect) + Send + Sync>;

/// Options for [`crate::Runtime::effect_with`].
#[derive(Default)]
pub struct EffectOptions {
    /// Skip the initial run; the caller invokes [`Effect::run`] itself.
    pub lazy: bool,
    /// Re-run override; `None` means inline synchronous re-runs.
    pub scheduler: Option<SchedulerFn>,
}

pub(crate) struct EffectInner {
    pub(crate) id: EffectId,
    pub(crate) runtime: Weak<RuntimeInner>,
    pub(crate) runner: Mutex<Box<dyn FnMut() + Send>>,
    /// Back-references to every `(target, key)` this effect is currently
    /// subscribed to; consumed wholesale on cleanup.
    pub(crate) deps: Mutex<SmallVec<[(TargetId, DepKey); 8]>>,
    pub(crate) scheduler: Option<SchedulerFn>,
    pub(crate) active: AtomicBool,
}

impl EffectInner {
    pub(crate) fn new(
        runtime: Weak<RuntimeInner>,
        runner: Box<dyn FnMut() + Send>,
        scheduler: Option<SchedulerFn>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: EffectId::next(),
            runtime,
            runner: Mutex::new(runner),
            deps: Mutex::new(SmallVec::new()),
            scheduler,
            active: AtomicBool::new(true),
        })
    }

    #[cfg(test)]
    pub(crate) fn stub() -> Arc<Self> {
        Self::new(Weak::new(), Box::new(|| {}), None)
    }
}

/// Handle to a registered effect.
#[derive(Clone)]
pub struct Effect {
    pub(crate) inner: Arc<EffectInner>,
}

impl Effect {
    /// This effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Whether the effect still responds to runs and triggers.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Re-run the effect body: unsubscribe from the previous run's
    /// dependencies, push a tracking frame, execute, pop.
    ///
    /// A run attempted while the same effect is already executing (a cycle
    /// through nested effects) is skipped rather than recursed into.
    pub fn run(&self) {
        if !self.is_active() {
            return;
        }
        let Some(rt) = self.inner.runtime.upgrade() else {
            return;
        };
        let Some(mut runner) = self.inner.runner.try_lock() else {
            tracing::warn!(effect = self.inner.id.0, "skipped re-entrant effect run");
            return;
        };

        rt.cleanup_effect(&self.inner);
        let _frame = rt.context.enter(self.inner.id, Arc::downgrade(&self.inner));
        runner();
    }

    /// Permanently deactivate the effect and drop all of its subscriptions.
    pub fn stop(&self) {
        if self.inner.active.swap(false, Ordering::SeqCst) {
            if let Some(rt) = self.inner.runtime.upgrade() {
                rt.cleanup_effect(&self.inner);
            }
        }
    }

    /// Run the body alone, with no cleanup, tracking frame, or liveness
    /// check. Lets a derived value fill its cache when its effect is
    /// stopped or its runtime is gone.
    pub(crate) fn run_detached(&self) {
        if let Some(mut runner) = self.inner.runner.try_lock() {
            runner();
        }
    }

    /// Run inline or hand off to the scheduler hook.
    pub(crate) fn schedule_or_run(&self) {
        if !self.is_active() {
            return;
        }
        match &self.inner.scheduler {
            Some(scheduler) => scheduler(self.clone()),
            None => self.run(),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .field("dep_count", &self.inner.deps.lock().len())
            .finish()
    }
}
