//! Core types for the weft dependency-tracking scheduler.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the identifiers, the [`ResourceSet`] bitset used to declare access,
//! and the error types shared by every other crate in the workspace.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod resource;

pub use error::{CycleError, UnitError};
pub use id::{CycleId, ResourceId, UnitId, WorkId};
pub use resource::{ResourceSet, ResourceSetIter};
