//! Test utilities and unit fixtures for weft development.
//!
//! [`set`] builds a [`ResourceSet`] from raw ids; the [`fixtures`]
//! module holds reusable [`Unit`](weft_sched::Unit) implementations.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use weft_core::{ResourceId, ResourceSet};

pub use fixtures::{
    CounterUnit, FailingUnit, NoopUnit, Observation, ObservingUnit, PanickingUnit, RecordingUnit,
};

/// Build a resource set from raw ids.
pub fn set(ids: &[u32]) -> ResourceSet {
    ids.iter().map(|&i| ResourceId(i)).collect()
}

/// A counter shared between a test and the jobs its units dispatch.
pub fn shared_counter() -> Arc<AtomicU64> {
    Arc::new(AtomicU64::new(0))
}

/// A log shared between a test and its units.
pub fn shared_log<T>() -> Arc<Mutex<Vec<T>>> {
    Arc::new(Mutex::new(Vec::new()))
}
