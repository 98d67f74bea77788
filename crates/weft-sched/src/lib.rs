//! Scheduling primitives for weft.
//!
//! - [`Unit`]: an update unit with declared read/write resource sets.
//! - [`DependencyRegistry`]: per-resource reader/writer handles.
//! - [`UnitContext`]: the per-unit cached dependency and its
//!   `needs_refresh` flag, driving the begin/end-of-turn protocol.
//! - [`TurnContext`]: what a unit body sees while it runs.
//! - [`validate_schedule`]: startup checks plus the [`DependencyPlan`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod context;
pub mod registry;
pub mod schedule;
pub mod unit;

pub use context::{DependencyPull, TurnContext, TurnPhase, UnitContext};
pub use registry::{DependencyRegistry, RegistryEntry};
pub use schedule::{
    validate_schedule, DependencyPlan, DependencySource, ScheduleError, UnitRegistration,
    WriteOverlap,
};
pub use unit::{FnUnit, Unit};
