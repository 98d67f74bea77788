//! Schedule validation and dependency planning.
//!
//! [`validate_schedule`] runs once at scheduler construction. It fixes
//! the execution order from the configured order indices, rejects
//! structural errors, and builds the [`DependencyPlan`]: for every unit
//! and every resource it declares, which publication a true refresh at
//! the start of its turn will observe.

use std::error::Error;
use std::fmt;

use indexmap::IndexMap;
use weft_core::{ResourceId, ResourceSet, UnitId};

use crate::unit::Unit;

// ── Registration ───────────────────────────────────────────────────

/// A unit paired with its configured order index.
pub struct UnitRegistration {
    /// Position in the cycle; units run in ascending order.
    pub order: UnitId,
    /// The unit itself.
    pub unit: Box<dyn Unit>,
}

impl UnitRegistration {
    /// Pair a unit with its order index.
    pub fn new(order: u32, unit: impl Unit) -> Self {
        Self {
            order: UnitId(order),
            unit: Box::new(unit),
        }
    }
}

impl fmt::Debug for UnitRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitRegistration")
            .field("order", &self.order)
            .field("unit", &self.unit.name())
            .finish()
    }
}

// ── Plan ───────────────────────────────────────────────────────────

/// Which publication a unit observes for one resource on a true refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencySource {
    /// No unit in the schedule writes this resource.
    Unwritten,
    /// Written earlier in the same cycle by the unit at `writer_index`.
    InCycle {
        /// Execution position of the writer.
        writer_index: usize,
    },
    /// Last written in the previous cycle by the unit at `writer_index`,
    /// which runs at or after this unit's position.
    PriorCycle {
        /// Execution position of the writer.
        writer_index: usize,
    },
}

/// Two units writing the same resource in one cycle with no unit reading
/// it in between, so the earlier write is never observed in-cycle.
///
/// Not an error: the later writer folds in and supersedes the earlier
/// one. Reported so callers can audit the ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOverlap {
    /// The contested resource.
    pub resource: ResourceId,
    /// Name of the earlier writer.
    pub first_writer: String,
    /// Name of the later writer.
    pub second_writer: String,
}

/// Precomputed ordering facts for a validated schedule.
#[derive(Debug)]
#[must_use]
pub struct DependencyPlan {
    /// Indices into the registration list, in execution order.
    execution_order: Vec<usize>,
    /// Order index of each unit, in execution order.
    ids: Vec<UnitId>,
    /// `sources[position]` maps each declared resource to its source.
    sources: Vec<IndexMap<ResourceId, DependencySource>>,
    overlaps: Vec<WriteOverlap>,
}

impl DependencyPlan {
    /// Number of units in the plan.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the plan covers zero units.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Indices into the registration list, in execution order.
    pub fn execution_order(&self) -> &[usize] {
        &self.execution_order
    }

    /// Order indices in execution order.
    pub fn unit_ids(&self) -> &[UnitId] {
        &self.ids
    }

    /// Execution position of a unit.
    pub fn position_of(&self, id: UnitId) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    /// Source for `resource` as seen by the unit at `position`.
    pub fn source(&self, position: usize, resource: ResourceId) -> Option<DependencySource> {
        self.sources.get(position)?.get(&resource).copied()
    }

    /// All `(resource, source)` pairs for the unit at `position`.
    pub fn sources_for(&self, position: usize) -> Option<&IndexMap<ResourceId, DependencySource>> {
        self.sources.get(position)
    }

    /// Resources the unit at `position` depends on from a writer that
    /// publishes after its turn in the same cycle.
    ///
    /// These are the accesses where reusing a stale cached handle can
    /// miss in-flight work.
    pub fn late_writers_for(&self, position: usize) -> Vec<ResourceId> {
        self.sources
            .get(position)
            .map(|m| {
                m.iter()
                    .filter(|(_, s)| match s {
                        DependencySource::PriorCycle { writer_index } => *writer_index > position,
                        _ => false,
                    })
                    .map(|(&r, _)| r)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Successive writers of one resource with no read in between.
    pub fn write_overlaps(&self) -> &[WriteOverlap] {
        &self.overlaps
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// Errors from schedule validation (startup-time, not per-cycle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// No units registered.
    EmptySchedule,
    /// Two units share an order index.
    DuplicateOrder {
        /// The contested index.
        order: UnitId,
        /// Name of the first unit registered at that index.
        first: String,
        /// Name of the second unit registered at that index.
        second: String,
    },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySchedule => write!(f, "schedule has no units"),
            Self::DuplicateOrder {
                order,
                first,
                second,
            } => write!(
                f,
                "order index {order} used by both '{first}' and '{second}'"
            ),
        }
    }
}

impl Error for ScheduleError {}

// ── Validation ─────────────────────────────────────────────────────

/// Validate the registrations and build the [`DependencyPlan`].
///
/// Checks performed:
///
/// 1. At least one unit is registered.
/// 2. Order indices are unique.
///
/// Units execute in ascending order index regardless of registration
/// order.
pub fn validate_schedule(units: &[UnitRegistration]) -> Result<DependencyPlan, ScheduleError> {
    // 1. Non-empty
    if units.is_empty() {
        return Err(ScheduleError::EmptySchedule);
    }

    // 2. Unique order indices
    let mut execution_order: Vec<usize> = (0..units.len()).collect();
    execution_order.sort_by_key(|&i| units[i].order);
    for pair in execution_order.windows(2) {
        let (a, b) = (&units[pair[0]], &units[pair[1]]);
        if a.order == b.order {
            return Err(ScheduleError::DuplicateOrder {
                order: a.order,
                first: a.unit.name().to_string(),
                second: b.unit.name().to_string(),
            });
        }
    }

    // 3. Last writer per resource across the whole cycle
    let declared: Vec<_> = execution_order
        .iter()
        .map(|&i| (units[i].unit.reads(), units[i].unit.writes()))
        .collect();
    let mut final_writer: IndexMap<ResourceId, usize> = IndexMap::new();
    for (pos, (_, writes)) in declared.iter().enumerate() {
        for id in writes {
            final_writer.insert(id, pos);
        }
    }

    // 4. Sources and overlaps
    let mut last_writer: IndexMap<ResourceId, usize> = IndexMap::new();
    let mut sources = Vec::with_capacity(declared.len());
    let mut overlaps = Vec::new();
    // Resources whose latest in-cycle write has been read since.
    let mut observed = ResourceSet::empty();
    for (pos, (reads, writes)) in declared.iter().enumerate() {
        let mut unit_sources = IndexMap::new();
        for id in &reads.union(writes) {
            let source = match (last_writer.get(&id), final_writer.get(&id)) {
                (Some(&w), _) => DependencySource::InCycle { writer_index: w },
                (None, Some(&w)) => DependencySource::PriorCycle { writer_index: w },
                (None, None) => DependencySource::Unwritten,
            };
            unit_sources.insert(id, source);
        }
        sources.push(unit_sources);

        for id in writes {
            if let Some(&prev) = last_writer.get(&id) {
                if !observed.contains(id) && !reads.contains(id) {
                    overlaps.push(WriteOverlap {
                        resource: id,
                        first_writer: units[execution_order[prev]].unit.name().to_string(),
                        second_writer: units[execution_order[pos]].unit.name().to_string(),
                    });
                }
            }
            last_writer.insert(id, pos);
            observed.remove(id);
        }
        for id in &reads.difference(writes) {
            observed.insert(id);
        }
    }

    let ids = execution_order.iter().map(|&i| units[i].order).collect();
    Ok(DependencyPlan {
        execution_order,
        ids,
        sources,
        overlaps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TurnContext;
    use weft_core::{ResourceSet, UnitError};

    struct Access {
        name: &'static str,
        reads: &'static [u32],
        writes: &'static [u32],
    }

    impl Unit for Access {
        fn name(&self) -> &str {
            self.name
        }
        fn reads(&self) -> ResourceSet {
            self.reads.iter().map(|&i| ResourceId(i)).collect()
        }
        fn writes(&self) -> ResourceSet {
            self.writes.iter().map(|&i| ResourceId(i)).collect()
        }
        fn run(&mut self, _ctx: &mut TurnContext<'_>) -> Result<(), UnitError> {
            Ok(())
        }
    }

    fn reg(
        order: u32,
        name: &'static str,
        reads: &'static [u32],
        writes: &'static [u32],
    ) -> UnitRegistration {
        UnitRegistration::new(order, Access { name, reads, writes })
    }

    #[test]
    fn empty_schedule_rejected() {
        assert_eq!(validate_schedule(&[]).unwrap_err(), ScheduleError::EmptySchedule);
    }

    #[test]
    fn duplicate_order_rejected() {
        let units = vec![reg(1, "a", &[], &[0]), reg(1, "b", &[0], &[])];
        match validate_schedule(&units) {
            Err(ScheduleError::DuplicateOrder { order, first, second }) => {
                assert_eq!(order, UnitId(1));
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            other => panic!("expected DuplicateOrder, got {other:?}"),
        }
    }

    #[test]
    fn execution_follows_order_index_not_registration() {
        let units = vec![
            reg(20, "late", &[], &[]),
            reg(5, "early", &[], &[]),
            reg(10, "mid", &[], &[]),
        ];
        let plan = validate_schedule(&units).unwrap();
        assert_eq!(plan.execution_order(), &[1, 2, 0]);
        assert_eq!(plan.unit_ids(), &[UnitId(5), UnitId(10), UnitId(20)]);
        assert_eq!(plan.position_of(UnitId(10)), Some(1));
        assert_eq!(plan.position_of(UnitId(11)), None);
    }

    #[test]
    fn sources_distinguish_in_cycle_and_prior_cycle() {
        // 0: reads X (written later) ; 1: writes X ; 2: reads X ; 3: reads Y (never written)
        let units = vec![
            reg(0, "early_reader", &[0], &[]),
            reg(1, "writer", &[], &[0]),
            reg(2, "late_reader", &[0], &[]),
            reg(3, "orphan", &[1], &[]),
        ];
        let plan = validate_schedule(&units).unwrap();
        assert_eq!(
            plan.source(0, ResourceId(0)),
            Some(DependencySource::PriorCycle { writer_index: 1 })
        );
        assert_eq!(
            plan.source(2, ResourceId(0)),
            Some(DependencySource::InCycle { writer_index: 1 })
        );
        assert_eq!(plan.source(3, ResourceId(1)), Some(DependencySource::Unwritten));
        assert_eq!(plan.late_writers_for(0), vec![ResourceId(0)]);
        assert!(plan.late_writers_for(2).is_empty());
    }

    #[test]
    fn writer_sees_its_own_previous_cycle() {
        let units = vec![reg(0, "solo", &[], &[0])];
        let plan = validate_schedule(&units).unwrap();
        assert_eq!(
            plan.source(0, ResourceId(0)),
            Some(DependencySource::PriorCycle { writer_index: 0 })
        );
        assert!(plan.late_writers_for(0).is_empty());
    }

    #[test]
    fn adjacent_writers_reported_as_overlap() {
        let units = vec![
            reg(0, "a", &[], &[0]),
            reg(1, "b", &[], &[0]),
            reg(2, "c", &[], &[0]),
        ];
        let plan = validate_schedule(&units).unwrap();
        let overlaps = plan.write_overlaps();
        assert_eq!(overlaps.len(), 2);
        assert_eq!(overlaps[0].first_writer, "a");
        assert_eq!(overlaps[0].second_writer, "b");
        assert_eq!(overlaps[1].first_writer, "b");
        assert_eq!(overlaps[1].second_writer, "c");
    }

    #[test]
    fn read_between_writers_is_not_an_overlap() {
        let units = vec![
            reg(0, "a", &[], &[0, 1]),
            reg(1, "reader", &[0], &[]),
            reg(2, "b", &[], &[0, 1]),
            reg(3, "rmw", &[1], &[1]),
        ];
        let plan = validate_schedule(&units).unwrap();
        // Resource 0 is read between a and b; resource 1 is not, and
        // rmw reads b's write before replacing it.
        assert_eq!(
            plan.write_overlaps(),
            &[WriteOverlap {
                resource: ResourceId(1),
                first_writer: "a".into(),
                second_writer: "b".into(),
            }]
        );
    }
}
