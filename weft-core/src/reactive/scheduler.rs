//! Job Queue
//!
//! Deferred work produced by triggers. Jobs are keyed, so scheduling the
//! same effect many times within one batch collapses to a single run, and
//! insertion order is preserved so flushes are deterministic.
//!
//! Two lanes exist. The sync lane holds deferred effect re-runs; the post
//! lane holds callbacks that must observe fully settled state, such as
//! post-flush watchers. Each flush round drains the sync lane to empty
//! before touching the post lane, and keeps going until both are empty,
//! so a post job that dirties more state gets its consequences applied in
//! the same flush.
//!
//! `flush` is re-entrancy-safe: a flush started while one is already
//! draining returns immediately and lets the outer drain pick up the new
//! jobs.

use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;

pub(crate) type Job = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub(crate) struct JobQueue {
    sync: Mutex<IndexMap<u64, Job>>,
    post: Mutex<IndexMap<u64, Job>>,
    flushing: AtomicBool,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a job on the sync lane. A job already queued under the same
    /// key keeps its position; the closure is replaced.
    pub(crate) fn enqueue(&self, key: u64, job: Job) {
        self.sync.lock().insert(key, job);
    }

    /// Queue a job on the post lane.
    pub(crate) fn enqueue_post(&self, key: u64, job: Job) {
        self.post.lock().insert(key, job);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.sync.lock().is_empty() && self.post.lock().is_empty()
    }

    /// Drain both lanes to empty. No-op when already flushing.
    pub(crate) fn flush(&self) {
        if self.flushing.swap(true, Ordering::SeqCst) {
            return;
        }
        let _reset = ResetOnDrop(&self.flushing);

        loop {
            let batch: Vec<Job> = {
                let mut lane = self.sync.lock();
                lane.drain(..).map(|(_, job)| job).collect()
            };
            if !batch.is_empty() {
                for job in batch {
                    job();
                }
                continue;
            }

            let batch: Vec<Job> = {
                let mut lane = self.post.lock();
                lane.drain(..).map(|(_, job)| job).collect()
            };
            if batch.is_empty() {
                break;
            }
            for job in batch {
                job();
            }
        }
    }
}

struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
