//! Tracking Context
//!
//! Tracks which effect is currently executing so reads can attribute
//! themselves to it. The context is a stack: effects may nest, and a nested
//! effect's reads must attribute to the innermost frame, never an outer one.
//!
//! Both the frame stack and tracking suppression use RAII guards, so the
//! stack unwinds correctly even when an effect body panics, and suppression
//! always restores on scope exit.
//!
//! Each runtime owns its own context. Two runtimes in one process never see
//! each other's active effects.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::effect::{EffectId, EffectInner};

#[derive(Default)]
pub(crate) struct TrackContext {
    frames: Mutex<Vec<(EffectId, Weak<EffectInner>)>>,
    pause_depth: AtomicUsize,
}

impl TrackContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Push a frame for the given effect. Popped when the guard drops.
    pub(crate) fn enter(self: &Arc<Self>, id: EffectId, effect: Weak<EffectInner>) -> FrameGuard {
        self.frames.lock().push((id, effect));
        FrameGuard {
            context: Arc::clone(self),
        }
    }

    /// The innermost running effect, if any and still alive.
    pub(crate) fn active(&self) -> Option<(EffectId, Arc<EffectInner>)> {
        let frames = self.frames.lock();
        let (id, weak) = frames.last()?;
        let effect = weak.upgrade()?;
        Some((*id, effect))
    }

    /// The innermost running effect's ID, if any.
    pub(crate) fn active_id(&self) -> Option<EffectId> {
        self.frames.lock().last().map(|(id, _)| *id)
    }

    /// Suppress tracking until the guard drops. Nests; tracking resumes
    /// when the outermost guard goes away.
    pub(crate) fn pause(self: &Arc<Self>) -> PauseGuard {
        self.pause_depth.fetch_add(1, Ordering::Relaxed);
        PauseGuard {
            context: Arc::clone(self),
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.pause_depth.load(Ordering::Relaxed) > 0
    }
}

/// Pops one frame on drop.
pub(crate) struct FrameGuard {
    context: Arc<TrackContext>,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        self.context.frames.lock().pop();
    }
}

/// Re-enables one level of tracking suppression on drop.
pub(crate) struct PauseGuard {
    context: Arc<TrackContext>,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.context.pause_depth.fetch_sub(1, Ordering::Relaxed);
    }
}
