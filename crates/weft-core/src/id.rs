//! Strongly-typed identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a shared resource guarded by the dependency registry.
///
/// A resource ID is only a key: the registry never owns the data behind
/// it, it only tracks which outstanding work touches it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ResourceId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies an update unit by its configured order index.
///
/// Units run in ascending `UnitId` order every cycle. The index is
/// supplied at registration; it is never inferred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for UnitId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Monotonically increasing cycle counter.
///
/// Incremented each time the scheduler loop completes a pass over
/// every unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CycleId(pub u64);

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CycleId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Counter for unique [`WorkId`] allocation.
static WORK_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one piece of dispatched work.
///
/// Allocated from a monotonic atomic counter via [`WorkId::next`]. Two
/// distinct work items never share an ID within a process, so combined
/// handles can de-duplicate their leaves by ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId(u64);

impl WorkId {
    /// Allocate a fresh, unique work ID. Thread-safe.
    pub fn next() -> Self {
        Self(WORK_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_ids_are_unique_and_increasing() {
        let a = WorkId::next();
        let b = WorkId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn work_ids_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..256).map(|_| WorkId::next()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<WorkId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn display_is_raw_value() {
        assert_eq!(ResourceId(7).to_string(), "7");
        assert_eq!(UnitId(3).to_string(), "3");
        assert_eq!(CycleId(42).to_string(), "42");
    }
}
