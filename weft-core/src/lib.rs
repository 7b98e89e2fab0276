//! # Weft Core
//!
//! A fine-grained reactive state engine. State lives in shared containers,
//! reads through observed handles record who depends on what, and writes
//! notify exactly the effects whose inputs changed.
//!
//! # Architecture
//!
//! - [`value`]: the unobserved data model, scalars plus shared record,
//!   list, map, and set containers, with a JSON snapshot bridge.
//! - [`reactive`]: the engine itself: the [`Runtime`], effects, the
//!   dependency store, the job queue, derived values, and watchers.
//! - [`observe`]: the wrapper handles that make reads track and writes
//!   trigger, in deep, shallow, and readonly flavors.
//!
//! # Example
//!
//! ```
//! use weft_core::{Raw, Runtime, Value};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI64, Ordering};
//!
//! let rt = Runtime::new();
//! let state = rt.reactive(Raw::record_from([("count", 0i64)]));
//! let counter = state.as_record().unwrap();
//!
//! let seen = Arc::new(AtomicI64::new(-1));
//! let seen_in = seen.clone();
//! let counter_in = counter.clone();
//! let _effect = rt.effect(move || {
//!     if let Some(Value::Int(n)) = counter_in.get("count") {
//!         seen_in.store(n, Ordering::SeqCst);
//!     }
//! });
//!
//! counter.set("count", 1i64);
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

pub mod observe;
pub mod reactive;
pub mod value;

pub use observe::{Mode, ObsList, ObsMap, ObsRecord, ObsSet, Value};
pub use reactive::computed::Computed;
pub use reactive::effect::{Effect, EffectId, EffectOptions, SchedulerFn};
pub use reactive::runtime::Runtime;
pub use reactive::watch::{FlushMode, OnCleanup, WatchHandle, WatchOptions, WatchSource};
pub use value::{Key, Raw, SnapshotError};
