//! The [`DependencyRegistry`]: per-resource reader and writer handles.
//!
//! Each tracked resource has one entry holding the join of every reader
//! registered since the last write, and the single current writer. A
//! new writer folds in the previous writer and all outstanding readers,
//! so waiting on the writer implies every earlier access has finished.
//!
//! # Concurrency
//!
//! The registry has no internal locking. Mutation goes through
//! [`register_access`](DependencyRegistry::register_access), which takes
//! `&mut self`; the scheduler loop owns the registry and publishes one
//! unit at a time. A caller that publishes from several threads must
//! wrap the registry in a mutex so each registration stays atomic.

use indexmap::IndexMap;
use weft_core::{ResourceId, ResourceSet};
use weft_job::{combine, JobHandle};

/// Handle state for one resource.
#[derive(Clone, Debug, Default)]
pub struct RegistryEntry {
    readers: JobHandle,
    writer: JobHandle,
}

impl RegistryEntry {
    /// Join of every reader registered since the last write.
    pub fn readers(&self) -> &JobHandle {
        &self.readers
    }

    /// The current writer.
    pub fn writer(&self) -> &JobHandle {
        &self.writer
    }

    /// Everything a new writer of this resource must wait for.
    pub fn all(&self) -> JobHandle {
        self.writer.join(&self.readers)
    }
}

/// Table of outstanding work per resource.
///
/// Owned by the scheduler loop; created with it and torn down with it.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    entries: IndexMap<ResourceId, RegistryEntry>,
}

impl DependencyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that work behind `incoming` reads `reads` and writes
    /// `writes`, and return everything that work now depends on.
    ///
    /// - For each written resource the new writer is
    ///   `join(incoming, previous writer, previous readers)`; the reader
    ///   set is cleared because the write supersedes it.
    /// - For each resource only read, `incoming` joins the reader set and
    ///   the current writer is part of the result.
    ///
    /// A resource in both sets is treated as written. Unknown resources
    /// get a fresh entry.
    pub fn register_access(
        &mut self,
        reads: &ResourceSet,
        writes: &ResourceSet,
        incoming: &JobHandle,
    ) -> JobHandle {
        let mut deps: Vec<JobHandle> = Vec::with_capacity(1 + reads.len() + writes.len());
        deps.push(incoming.clone());

        for id in writes {
            let entry = self.entries.entry(id).or_default();
            let writer = entry.all().join(incoming);
            entry.readers = JobHandle::completed();
            entry.writer = writer.clone();
            deps.push(writer);
        }

        for id in reads.difference(writes).iter() {
            let entry = self.entries.entry(id).or_default();
            entry.readers = entry.readers.join(incoming);
            deps.push(entry.writer.clone());
        }

        combine(&deps)
    }

    /// What a unit with the given access must wait for before touching
    /// its resources. Does not register anything.
    ///
    /// Readers wait for the current writer; writers wait for the current
    /// writer and every outstanding reader. Unknown resources contribute
    /// nothing.
    pub fn query_dependency(&self, reads: &ResourceSet, writes: &ResourceSet) -> JobHandle {
        let mut deps: Vec<&JobHandle> = Vec::with_capacity(reads.len() + 2 * writes.len());
        for id in reads.difference(writes).iter() {
            if let Some(entry) = self.entries.get(&id) {
                deps.push(&entry.writer);
            }
        }
        for id in writes {
            if let Some(entry) = self.entries.get(&id) {
                deps.push(&entry.writer);
                deps.push(&entry.readers);
            }
        }
        combine(deps)
    }

    /// The entry for a resource, if it has ever been registered.
    pub fn entry(&self, id: ResourceId) -> Option<&RegistryEntry> {
        self.entries.get(&id)
    }

    /// Current writer of `id`; complete if the resource is untracked.
    pub fn writer(&self, id: ResourceId) -> JobHandle {
        self.entries
            .get(&id)
            .map(|e| e.writer.clone())
            .unwrap_or_default()
    }

    /// Current reader join of `id`; complete if the resource is untracked.
    pub fn readers(&self, id: ResourceId) -> JobHandle {
        self.entries
            .get(&id)
            .map(|e| e.readers.clone())
            .unwrap_or_default()
    }

    /// Tracked resources, in first-registration order.
    pub fn resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.entries.keys().copied()
    }

    /// Number of tracked resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no resource has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Join of every handle the registry tracks.
    pub fn outstanding(&self) -> JobHandle {
        combine(
            self.entries
                .values()
                .flat_map(|e| [&e.writer, &e.readers]),
        )
    }

    /// Block until every tracked handle has completed.
    pub fn complete_all(&self) {
        self.outstanding().wait();
    }

    /// Forget every entry. Outstanding work keeps running; callers that
    /// need it finished call [`complete_all`](Self::complete_all) first.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
