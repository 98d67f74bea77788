//! Job handles and the worker pool that executes dispatched work.
//!
//! A [`JobHandle`] marks work that completes at some point. Handles are
//! cheap to clone, combine into joins that complete when every input
//! does, and can be waited on. [`JobSystem`] is the execution substrate:
//! a fixed pool of worker threads that run closures once the handle they
//! were dispatched behind has completed.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod handle;
pub mod system;

pub use handle::{combine, JobHandle, JobSignal};
pub use system::{panic_message, JobConfig, JobError, JobStats, JobSystem};
