//! Reactive Engine
//!
//! The dependency-tracking machinery: who reads what, and who to wake when
//! it changes.
//!
//! # How It Works
//!
//! 1. [`runtime::Runtime`] is the engine instance tying the pieces together.
//! 2. [`effect::Effect`] is the unit of re-runnable work; the tracking
//!    context attributes reads to the innermost running one.
//! 3. The dependency store maps `(target, key)` pairs to subscribed
//!    effects; triggers consult it plus the operation-specific gather rules.
//! 4. The job queue holds deferred re-runs and post-flush callbacks, drained
//!    when the outermost trigger or batch unwinds.
//! 5. [`computed::Computed`] and [`watch`] watchers are built on lazy
//!    effects with custom schedulers.

pub mod computed;
pub mod effect;
pub mod runtime;
pub mod watch;

pub(crate) mod context;
pub(crate) mod dep;
pub(crate) mod scheduler;
pub(crate) mod store;
