//! The [`Unit`] trait and the closure-backed [`FnUnit`].
//!
//! Units are executed in their configured order every cycle. They
//! declare resource access once at registration; the scheduler uses
//! the declaration to pull and publish dependencies around each turn.

use crate::context::TurnContext;
use weft_core::{ResourceSet, UnitError};

/// An update unit run once per cycle by the scheduler loop.
///
/// # Contract
///
/// - `reads()` and `writes()` are called once at registration, not per
///   cycle. A resource in both sets is treated as written.
/// - `run()` may do its work inline or dispatch it through
///   [`TurnContext::dispatch`]; dispatched work is published as the
///   unit's new dependency when the turn ends.
/// - A unit must never wait on work it dispatched in the same turn
///   through its own combined dependency; that handle does not exist
///   until the turn is published.
///
/// # Object safety
///
/// The scheduler stores units as `Box<dyn Unit>`.
///
/// # Examples
///
/// ```
/// use weft_core::{ResourceId, ResourceSet, UnitError};
/// use weft_sched::{TurnContext, Unit};
///
/// struct Integrate {
///     positions: ResourceId,
/// }
///
/// impl Unit for Integrate {
///     fn name(&self) -> &str { "integrate" }
///
///     fn reads(&self) -> ResourceSet { ResourceSet::empty() }
///
///     fn writes(&self) -> ResourceSet {
///         [self.positions].into_iter().collect()
///     }
///
///     fn run(&mut self, ctx: &mut TurnContext<'_>) -> Result<(), UnitError> {
///         ctx.dispatch(|| { /* mutate positions */ });
///         Ok(())
///     }
/// }
///
/// let unit = Integrate { positions: ResourceId(0) };
/// assert_eq!(unit.name(), "integrate");
/// ```
pub trait Unit: Send + 'static {
    /// Human-readable name for error reporting and metrics.
    fn name(&self) -> &str;

    /// Resources this unit reads.
    fn reads(&self) -> ResourceSet;

    /// Resources this unit writes.
    ///
    /// Default: empty set.
    fn writes(&self) -> ResourceSet {
        ResourceSet::empty()
    }

    /// Execute the unit's body for one turn.
    ///
    /// Called after the unit's bound dependency has completed.
    fn run(&mut self, ctx: &mut TurnContext<'_>) -> Result<(), UnitError>;
}

/// A [`Unit`] backed by a closure.
pub struct FnUnit<F>
where
    F: FnMut(&mut TurnContext<'_>) -> Result<(), UnitError> + Send + 'static,
{
    name: String,
    reads: ResourceSet,
    writes: ResourceSet,
    body: F,
}

impl<F> FnUnit<F>
where
    F: FnMut(&mut TurnContext<'_>) -> Result<(), UnitError> + Send + 'static,
{
    /// Create a closure-backed unit with the given access sets.
    pub fn new(name: impl Into<String>, reads: ResourceSet, writes: ResourceSet, body: F) -> Self {
        Self {
            name: name.into(),
            reads,
            writes,
            body,
        }
    }
}

impl<F> Unit for FnUnit<F>
where
    F: FnMut(&mut TurnContext<'_>) -> Result<(), UnitError> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> ResourceSet {
        self.reads.clone()
    }

    fn writes(&self) -> ResourceSet {
        self.writes.clone()
    }

    fn run(&mut self, ctx: &mut TurnContext<'_>) -> Result<(), UnitError> {
        (self.body)(ctx)
    }
}
