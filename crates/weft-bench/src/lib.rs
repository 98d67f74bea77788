//! Benchmark profiles for the weft scheduler.
//!
//! - [`reference_schedule`]: layered schedule where each stage reads a
//!   seeded subset of the previous stage's resources
//! - [`access_workload`]: seeded read/write set pairs for registry benches

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use weft_core::{ResourceId, ResourceSet};
use weft_engine::SchedulerConfig;

/// Build a layered benchmark schedule: `depth` stages of `width` units.
///
/// Unit `j` of stage `s` writes resource `s * width + j` and reads a
/// seeded subset (at least one) of stage `s - 1`'s resources. Every body
/// dispatches one empty job, so each cycle exercises dispatch, publish
/// and the pre-turn waits of every unit.
pub fn reference_schedule(width: u32, depth: u32, seed: u64) -> SchedulerConfig {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut config = SchedulerConfig::default();
    for stage in 0..depth {
        for j in 0..width {
            let own = ResourceId(stage * width + j);
            let reads = if stage == 0 {
                ResourceSet::empty()
            } else {
                let prev = (stage - 1) * width;
                let mut reads: ResourceSet = (0..width)
                    .filter(|_| rng.next_u32() % 2 == 0)
                    .map(|k| ResourceId(prev + k))
                    .collect();
                reads.insert(ResourceId(prev + rng.next_u32() % width));
                reads
            };
            let writes: ResourceSet = [own].into_iter().collect();
            config = config.register_fn(
                own.0,
                format!("stage{stage}_{j}"),
                reads,
                writes,
                |ctx| {
                    ctx.dispatch(|| {});
                    Ok(())
                },
            );
        }
    }
    config
}

/// Generate `count` seeded `(reads, writes)` pairs over `resources` ids.
///
/// Roughly one access in four is a write.
pub fn access_workload(resources: u32, count: usize, seed: u64) -> Vec<(ResourceSet, ResourceSet)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut reads = ResourceSet::empty();
            let mut writes = ResourceSet::empty();
            for _ in 0..4 {
                let id = ResourceId(rng.next_u32() % resources);
                if rng.next_u32() % 4 == 0 {
                    writes.insert(id);
                } else {
                    reads.insert(id);
                }
            }
            (reads, writes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_schedule_validates() {
        let config = reference_schedule(4, 3, 42);
        assert_eq!(config.units.len(), 12);
        config.validate().unwrap();
    }

    #[test]
    fn reference_schedule_reads_previous_stage() {
        let config = reference_schedule(4, 3, 7);
        for reg in &config.units {
            let stage = reg.order.0 / 4;
            let reads = reg.unit.reads();
            if stage == 0 {
                assert!(reads.is_empty());
            } else {
                assert!(!reads.is_empty());
                assert!(reads.iter().all(|r| r.0 / 4 == stage - 1));
            }
        }
    }

    #[test]
    fn access_workload_deterministic() {
        let a = access_workload(16, 32, 42);
        let b = access_workload(16, 32, 42);
        assert_eq!(a, b);
        assert!(a.iter().all(|(r, w)| r.iter().chain(w.iter()).all(|id| id.0 < 16)));
    }
}
