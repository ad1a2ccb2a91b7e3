//! A rate-limited, deduplicating work queue (spec §4.1 "Queue discipline",
//! §8 invariant 2). Grounded on `kube::runtime`'s internal scheduler
//! (`kube-runtime`'s `scheduler.rs`: a `DelayQueue` plus a dedup map keyed on
//! the message), generalized here into an explicit `Get`/`Done`/`Forget`
//! surface since `Controller::run` keeps that discipline private and the
//! spec requires it to be independently testable.
//!
//! Discipline: an item `Get`-ed is moved into `processing`. Any `Add` for an
//! item already in `processing` only marks it `dirty` rather than
//! re-scheduling it — it is re-added the moment `Done` is called. This is
//! exactly one worker per item at a time, with no lost updates.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::task::noop_waker;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::time::delay_queue::{self, DelayQueue};

struct Inner<T> {
    delay: DelayQueue<T>,
    scheduled: HashMap<T, delay_queue::Key>,
    processing: HashSet<T>,
    dirty: HashSet<T>,
}

/// Shared, cloneable handle onto a single underlying queue. Clone freely and
/// hand a copy to each worker task.
pub struct WorkQueue<T: Eq + Hash + Clone> {
    inner: Mutex<Inner<T>>,
}

impl<T: Eq + Hash + Clone> Default for WorkQueue<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                delay: DelayQueue::new(),
                scheduled: HashMap::new(),
                processing: HashSet::new(),
                dirty: HashSet::new(),
            }),
        }
    }
}

impl<T: Eq + Hash + Clone> WorkQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `item` to run immediately, unless it is currently being
    /// processed — in which case it is only marked dirty so `Done` can
    /// re-add it once the in-flight run finishes.
    pub async fn add(&self, item: T) {
        self.add_after(item, Duration::ZERO).await;
    }

    /// Enqueue `item` to run after `delay` (used for requeues with backoff).
    /// Same dedup semantics as `add`: the earlier of any two pending
    /// schedules for the same item wins.
    pub async fn add_after(&self, item: T, delay: Duration) {
        let mut inner = self.inner.lock().await;
        if inner.processing.contains(&item) {
            inner.dirty.insert(item);
            return;
        }
        let run_at = Instant::now() + delay;
        match inner.scheduled.get(&item) {
            Some(key) => {
                if inner.delay.deadline(key) > run_at {
                    inner.delay.reset_at(key, run_at);
                }
            }
            None => {
                let key = inner.delay.insert_at(item.clone(), run_at);
                inner.scheduled.insert(item, key);
            }
        }
    }

    /// Block until an item is ready, then move it into `processing` and
    /// return it. Callers must call `done` exactly once per `get`.
    pub async fn get(&self) -> T {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Poll::Ready(Some(expired)) = Pin::new(&mut inner.delay).poll_expired(&mut cx) {
                    let item = expired.into_inner();
                    inner.scheduled.remove(&item);
                    inner.processing.insert(item.clone());
                    return item;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Mark `item` as finished processing. If it was re-added (directly or
    /// via `dirty`) while in flight, re-queue it immediately so no update is
    /// lost; otherwise it is simply forgotten.
    pub async fn done(&self, item: &T) {
        let mut inner = self.inner.lock().await;
        inner.processing.remove(item);
        if inner.dirty.remove(item) {
            let key = inner.delay.insert_at(item.clone(), Instant::now());
            inner.scheduled.insert(item.clone(), key);
        }
    }

    /// Drop any pending re-run schedule for `item` predating this dispatch
    /// (spec §4.1 "Forget on success"). Deliberately leaves `dirty` alone: a
    /// `dirty` mark means an `Add` arrived while `item` was processing, and
    /// only `done` is allowed to consume it and re-queue — clearing it here
    /// would silently drop that update (spec §5 "no lost updates"). The
    /// worker calls this before `done` precisely so a `dirty` mark set
    /// during the run just completed survives to be re-queued.
    pub async fn forget(&self, item: &T) {
        let mut inner = self.inner.lock().await;
        if let Some(key) = inner.scheduled.remove(item) {
            inner.delay.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_then_done_allows_item_to_be_readded() {
        let q: WorkQueue<&'static str> = WorkQueue::new();
        q.add("ns/chi1").await;
        let item = q.get().await;
        assert_eq!(item, "ns/chi1");
        q.done(&item).await;
        q.add("ns/chi1").await;
        let again = q.get().await;
        assert_eq!(again, "ns/chi1");
        q.done(&again).await;
    }

    #[tokio::test]
    async fn add_while_processing_only_marks_dirty_and_requeues_on_done() {
        let q: WorkQueue<&'static str> = WorkQueue::new();
        q.add("ns/chi1").await;
        let item = q.get().await;
        // A second Add arrives while the first is still in flight.
        q.add("ns/chi1").await;
        q.done(&item).await;
        // Exactly one re-queued instance, not lost and not duplicated.
        let again = q.get().await;
        assert_eq!(again, "ns/chi1");
    }

    #[tokio::test]
    async fn forget_drops_pending_schedule() {
        let q: WorkQueue<&'static str> = WorkQueue::new();
        q.add_after("ns/chi1", Duration::from_secs(60)).await;
        q.forget(&"ns/chi1").await;
        let inner = q.inner.lock().await;
        assert!(inner.scheduled.is_empty());
    }

    #[tokio::test]
    async fn forget_then_done_preserves_a_dirty_requeue() {
        let q: WorkQueue<&'static str> = WorkQueue::new();
        q.add("ns/chi1").await;
        let item = q.get().await;
        // A second Add arrives while the first is still in flight.
        q.add("ns/chi1").await;
        // The worker's dispatch loop calls `forget` before `done`.
        q.forget(&item).await;
        q.done(&item).await;
        let again = q.get().await;
        assert_eq!(again, "ns/chi1");
    }
}
