//! Divergence-ranked pruning of voxel distributions.
//!
//! # Algorithm
//!
//! Walk the divergence list in ascending order. For every record whose
//! endpoints are both still valid, the pair is the most redundant one left,
//! so one endpoint is tombstoned:
//!
//! - the endpoint with fewer samples (it carries less evidence),
//! - on equal sample counts, the higher voxel index.
//!
//! Records with a pruned endpoint are skipped. Because divergences are never
//! recomputed mid-pass, one ascending scan is equivalent to repeatedly taking
//! the global minimum over live records. Equal divergences are resolved by
//! the list order `(divergence, p, q)`.
//!
//! Isolated voxels have no neighbours and therefore no divergence records. If
//! the list runs dry before the target is reached, the remaining removals
//! take the valid distributions with the fewest samples, highest index first.

use std::cmp::Reverse;

use tracing::debug;

use crate::distribution::DistributionStore;
use crate::divergence::{retain_live, KlDivergence};
use crate::error::{Result, SamplerError};

/// Outcome of a pruning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Flattened indices of the removed distributions, in removal order.
    pub removed: Vec<usize>,
    /// How many of those were removed by the sample-count fallback.
    pub fallback_removed: usize,
}

/// Remove distributions until exactly `target` valid ones remain.
///
/// `divergences` must be sorted ascending (as produced by
/// [`crate::divergence::compute_divergences`]). On return it only holds records
/// whose endpoints both survived.
pub fn prune(
    store: &mut DistributionStore,
    divergences: &mut Vec<KlDivergence>,
    target: usize,
) -> Result<PruneReport> {
    let available = store.num_valid();
    if target > available {
        return Err(SamplerError::InvalidTarget { target, available });
    }

    let to_remove = available - target;
    let mut report = PruneReport::default();

    for record in divergences.iter() {
        if report.removed.len() == to_remove {
            break;
        }
        if !record.is_live(store) {
            continue;
        }

        let victim = {
            let p_samples = store.slot(record.p).num_samples;
            let q_samples = store.slot(record.q).num_samples;
            if p_samples < q_samples {
                record.p
            } else {
                record.q
            }
        };

        store.remove(victim);
        report.removed.push(victim);
    }

    if report.removed.len() < to_remove {
        let mut remaining: Vec<(usize, usize)> = store
            .valid_indices()
            .into_iter()
            .map(|index| (store.slot(index).num_samples, index))
            .collect();
        remaining.sort_unstable_by_key(|&(n, i)| (n, Reverse(i)));

        let missing = to_remove - report.removed.len();
        for &(_, index) in remaining.iter().take(missing) {
            store.remove(index);
            report.removed.push(index);
        }
        report.fallback_removed = missing;

        debug!(
            missing,
            "Divergence list exhausted; pruned sparsest distributions"
        );
    }

    retain_live(divergences, store);

    debug!(
        target,
        removed = report.removed.len(),
        remaining_divergences = divergences.len(),
        "Pruned distributions"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::accumulate;
    use crate::divergence::{compute_divergences, DivergenceMode};
    use crate::test_utils::make_uniform_cube;
    use crate::voxel_grid::VoxelGrid;

    fn store_with(samples: &[(usize, usize)], num_cells: usize) -> DistributionStore {
        let store = DistributionStore::new(num_cells, 0);
        for &(index, count) in samples {
            for i in 0..count {
                store.fold_point(index, &[i as f32, 0.0, 0.0], None);
            }
        }
        store
    }

    fn record(divergence: f64, p: usize, q: usize) -> KlDivergence {
        KlDivergence { divergence, p, q }
    }

    #[test]
    fn test_prune_removes_smallest_divergence_first() {
        let mut store = store_with(&[(0, 3), (1, 5), (2, 4), (3, 4)], 4);
        let mut divergences = vec![
            record(0.1, 2, 3),
            record(0.5, 0, 1),
            record(0.9, 1, 2),
        ];

        let report = prune(&mut store, &mut divergences, 2).unwrap();

        // (2,3) tie on samples -> higher index 3; then (0,1) -> fewer samples 0
        assert_eq!(report.removed, vec![3, 0]);
        assert_eq!(report.fallback_removed, 0);
        assert_eq!(store.valid_indices(), vec![1, 2]);
        assert_eq!(divergences, vec![record(0.9, 1, 2)]);
    }

    #[test]
    fn test_equal_divergences_resolve_by_lowest_index() {
        let mut store = store_with(&[(0, 2), (1, 2), (4, 2), (5, 2)], 6);
        let mut divergences = vec![
            record(0.3, 0, 1),
            record(0.3, 4, 5),
        ];

        let report = prune(&mut store, &mut divergences, 3).unwrap();
        assert_eq!(report.removed, vec![1]);
    }

    #[test]
    fn test_stale_records_are_skipped() {
        let mut store = store_with(&[(0, 1), (1, 2), (2, 3)], 3);
        let mut divergences = vec![
            record(0.1, 0, 1),
            record(0.2, 0, 2),
            record(0.3, 1, 2),
        ];

        // 0 goes first; (0,2) is then stale, so (1,2) removes 1
        let report = prune(&mut store, &mut divergences, 1).unwrap();
        assert_eq!(report.removed, vec![0, 1]);
        assert_eq!(store.valid_indices(), vec![2]);
        assert!(divergences.is_empty());
    }

    #[test]
    fn test_fallback_for_isolated_voxels() {
        let mut store = store_with(&[(0, 4), (3, 1), (6, 1), (8, 7)], 9);
        let mut divergences = Vec::new();

        let report = prune(&mut store, &mut divergences, 2).unwrap();

        // Fewest samples first; 3 and 6 tie, higher index goes first
        assert_eq!(report.removed, vec![6, 3]);
        assert_eq!(report.fallback_removed, 2);
        assert_eq!(store.valid_indices(), vec![0, 8]);
    }

    #[test]
    fn test_invalid_target() {
        let mut store = store_with(&[(0, 1), (1, 1)], 2);
        let mut divergences = Vec::new();

        let result = prune(&mut store, &mut divergences, 3);
        assert!(matches!(
            result,
            Err(SamplerError::InvalidTarget {
                target: 3,
                available: 2
            })
        ));
        // Nothing was touched
        assert_eq!(store.num_valid(), 2);
    }

    #[test]
    fn test_prune_to_current_count_is_noop() {
        let mut store = store_with(&[(0, 1), (1, 1)], 2);
        let mut divergences = vec![record(0.0, 0, 1)];

        let report = prune(&mut store, &mut divergences, 2).unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(divergences.len(), 1);
    }

    #[test]
    fn test_prune_exact_on_real_cloud() {
        let points = make_uniform_cube(1000, 1.0, 17);
        let grid = VoxelGrid::from_points(&points, 100).unwrap();

        let mode = DivergenceMode::Symmetric;

        for target in [0, 1, 10, 50] {
            let mut store = accumulate(&grid, &points, None, 0).unwrap();
            let mut divergences = compute_divergences(&store, &grid, mode, 1e-6).unwrap();

            prune(&mut store, &mut divergences, target).unwrap();
            assert_eq!(store.num_valid(), target);
            assert!(divergences.iter().all(|d| d.is_live(&store)));
        }
    }
}
