//! [`JobHandle`], [`JobSignal`], and handle combination.
//!
//! A handle is one of three shapes: already complete, a single leaf of
//! dispatched work, or a flat join of leaves. Combining never nests: the
//! leaves of every input are gathered into one list, already-complete
//! leaves are dropped, and duplicates (same [`WorkId`]) are merged. A
//! writer handle that is re-joined every cycle therefore never grows a
//! chain of joins-of-joins.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use weft_core::WorkId;

// ── Completion ─────────────────────────────────────────────────────

/// Shared completion flag for one piece of work.
///
/// The flag only ever goes from pending to complete, so a poisoned lock
/// is recovered rather than propagated: the boolean it guards is still
/// meaningful.
struct Completion {
    id: WorkId,
    done: AtomicBool,
    state: Mutex<bool>,
    cond: Condvar,
}

impl Completion {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            id: WorkId::next(),
            done: AtomicBool::new(false),
            state: Mutex::new(false),
            cond: Condvar::new(),
        })
    }

    fn is_complete(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn complete(&self) {
        let mut done = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *done = true;
        self.done.store(true, Ordering::Release);
        drop(done);
        self.cond.notify_all();
    }

    fn wait(&self) {
        if self.is_complete() {
            return;
        }
        let mut done = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = self.cond.wait(done).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wait_until(&self, deadline: Instant) -> bool {
        if self.is_complete() {
            return true;
        }
        let mut done = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(done, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            done = guard;
        }
        true
    }
}

// ── JobHandle ──────────────────────────────────────────────────────

#[derive(Clone)]
enum Repr {
    Complete,
    Leaf(Arc<Completion>),
    Join(Arc<[Arc<Completion>]>),
}

/// A marker for outstanding asynchronous work.
///
/// Cloning a handle is cheap (reference-counted). Once a handle is
/// observed complete it stays complete. Waiting on an already-complete
/// handle is a no-op.
#[derive(Clone)]
pub struct JobHandle {
    repr: Repr,
}

impl JobHandle {
    /// A handle that is already complete.
    pub fn completed() -> Self {
        Self {
            repr: Repr::Complete,
        }
    }

    /// Create a pending handle together with the [`JobSignal`] that
    /// completes it.
    ///
    /// Dropping the signal also completes the handle, so waiters are
    /// released even if the producer unwinds.
    pub fn signal() -> (JobSignal, JobHandle) {
        let completion = Completion::new();
        let handle = Self {
            repr: Repr::Leaf(Arc::clone(&completion)),
        };
        (JobSignal { completion }, handle)
    }

    /// Whether every piece of work behind this handle has finished.
    pub fn is_complete(&self) -> bool {
        self.leaves().iter().all(|c| c.is_complete())
    }

    /// Block until every piece of work behind this handle has finished.
    pub fn wait(&self) {
        for leaf in self.leaves() {
            leaf.wait();
        }
    }

    /// Block until the handle completes or `timeout` elapses.
    ///
    /// Returns `true` if the handle completed in time. A timeout too large
    /// to express as a deadline waits without one.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_complete() {
            return true;
        }
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.leaves().iter().all(|leaf| leaf.wait_until(deadline)),
            None => {
                self.wait();
                true
            }
        }
    }

    /// A handle that completes when both `self` and `other` do.
    pub fn join(&self, other: &JobHandle) -> JobHandle {
        combine([self, other])
    }

    /// IDs of the work this handle still waits on, sorted ascending.
    pub fn pending_work(&self) -> Vec<WorkId> {
        let mut ids: Vec<WorkId> = self
            .leaves()
            .iter()
            .filter(|c| !c.is_complete())
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Whether waiting on `self` and on `other` releases at the same point.
    pub fn is_equivalent(&self, other: &JobHandle) -> bool {
        self.pending_work() == other.pending_work()
    }

    /// Whether this handle waits on the given piece of work.
    pub fn depends_on(&self, work: WorkId) -> bool {
        self.leaves()
            .iter()
            .any(|c| c.id == work && !c.is_complete())
    }

    /// Number of leaves retained by this handle, complete or not.
    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// The single work ID behind a leaf handle, if this is one.
    pub fn work_id(&self) -> Option<WorkId> {
        match &self.repr {
            Repr::Leaf(c) => Some(c.id),
            _ => None,
        }
    }

    fn leaves(&self) -> &[Arc<Completion>] {
        match &self.repr {
            Repr::Complete => &[],
            Repr::Leaf(c) => std::slice::from_ref(c),
            Repr::Join(list) => list,
        }
    }

    fn from_leaves(mut leaves: Vec<Arc<Completion>>) -> Self {
        let repr = match leaves.len() {
            0 => Repr::Complete,
            1 => match leaves.pop() {
                Some(leaf) => Repr::Leaf(leaf),
                None => Repr::Complete,
            },
            _ => Repr::Join(leaves.into()),
        };
        Self { repr }
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::completed()
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("pending", &self.pending_work())
            .field("leaves", &self.leaf_count())
            .finish()
    }
}

/// Combine handles into one that completes when every input does.
///
/// Combining zero handles, or only complete ones, yields a complete
/// handle. The result is flat: nested joins are expanded and duplicate
/// work is merged.
pub fn combine<'a, I>(handles: I) -> JobHandle
where
    I: IntoIterator<Item = &'a JobHandle>,
{
    let mut pending: IndexMap<WorkId, Arc<Completion>> = IndexMap::new();
    for handle in handles {
        for leaf in handle.leaves() {
            if !leaf.is_complete() {
                pending.entry(leaf.id).or_insert_with(|| Arc::clone(leaf));
            }
        }
    }
    JobHandle::from_leaves(pending.into_values().collect())
}

// ── JobSignal ──────────────────────────────────────────────────────

/// The producer side of a handle created with [`JobHandle::signal`].
pub struct JobSignal {
    completion: Arc<Completion>,
}

impl JobSignal {
    /// The work ID this signal completes.
    pub fn id(&self) -> WorkId {
        self.completion.id
    }

    /// Mark the work complete and wake every waiter.
    pub fn complete(self) {
        // Drop does the work.
    }
}

impl Drop for JobSignal {
    fn drop(&mut self) {
        self.completion.complete();
    }
}

impl fmt::Debug for JobSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSignal")
            .field("id", &self.completion.id)
            .field("complete", &self.completion.is_complete())
            .finish()
    }
}
