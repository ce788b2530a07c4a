//! KL divergences between spatially adjacent voxel distributions.
//!
//! Only face, edge and corner neighbours are compared (at most 26 per voxel),
//! so the candidate set grows linearly with the number of valid voxels. Each
//! unordered pair yields one [`KlDivergence`] record with `p < q` (flattened
//! voxel indices).
//!
//! Records refer to distributions by index into the store, never by
//! ownership. Once either endpoint is pruned the record is stale and is
//! dropped by [`retain_live`].

pub mod kl;

pub use kl::{kl_divergence, PreparedGaussian};

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distribution::DistributionStore;
use crate::error::{Result, SamplerError};
use crate::voxel_grid::VoxelGrid;

/// Which KL direction a divergence record holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DivergenceMode {
    /// `D(P||Q)` with P the lower voxel index.
    Forward,
    /// `D(P||Q) + D(Q||P)`, independent of pair orientation.
    #[default]
    Symmetric,
}

/// Divergence between two adjacent valid distributions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KlDivergence {
    pub divergence: f64,
    /// Flattened index of the lower-indexed distribution.
    pub p: usize,
    /// Flattened index of the higher-indexed distribution.
    pub q: usize,
}

impl KlDivergence {
    /// Whether both endpoints are still valid in `store`.
    pub fn is_live(&self, store: &DistributionStore) -> bool {
        store.is_valid(self.p) && store.is_valid(self.q)
    }
}

/// Compute divergences for every adjacent pair of valid distributions.
///
/// The result is sorted ascending by `(divergence, p, q)`, which fixes the
/// pruning order for equal divergences.
pub fn compute_divergences(
    store: &DistributionStore,
    grid: &VoxelGrid,
    mode: DivergenceMode,
    epsilon: f64,
) -> Result<Vec<KlDivergence>> {
    let valid = store.valid_indices();

    let prepared = valid
        .par_iter()
        .map(|&index| {
            PreparedGaussian::new(&store.slot(index), epsilon)
                .ok_or(SamplerError::DegenerateDistribution { index })
        })
        .collect::<Result<Vec<_>>>()?;

    let position: HashMap<usize, usize> = valid
        .iter()
        .enumerate()
        .map(|(pos, &index)| (index, pos))
        .collect();
    let (position, prepared) = (&position, &prepared);

    let mut divergences: Vec<KlDivergence> = valid
        .par_iter()
        .enumerate()
        .flat_map_iter(|(p_pos, &p)| {
            grid.neighbors(p)
                .filter(move |&q| q > p)
                .filter_map(move |q| position.get(&q).map(|&q_pos| (q, q_pos)))
                .map(move |(q, q_pos)| {
                    let (gp, gq) = (&prepared[p_pos], &prepared[q_pos]);
                    let divergence = match mode {
                        DivergenceMode::Forward => gp.divergence_to(gq),
                        DivergenceMode::Symmetric => gp.symmetric_divergence(gq),
                    };
                    KlDivergence { divergence, p, q }
                })
        })
        .collect();

    divergences.par_sort_unstable_by(|a, b| {
        a.divergence
            .total_cmp(&b.divergence)
            .then(a.p.cmp(&b.p))
            .then(a.q.cmp(&b.q))
    });

    debug!(
        num_valid = valid.len(),
        num_divergences = divergences.len(),
        ?mode,
        "Computed adjacent KL divergences"
    );

    Ok(divergences)
}

/// Drop records whose endpoints are no longer both valid.
pub fn retain_live(divergences: &mut Vec<KlDivergence>, store: &DistributionStore) {
    divergences.retain(|d| d.is_live(store));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::accumulate;
    use crate::test_utils::make_uniform_cube;

    fn symmetric(store: &DistributionStore, grid: &VoxelGrid) -> Vec<KlDivergence> {
        let mode = DivergenceMode::Symmetric;
        compute_divergences(store, grid, mode, 1e-6).unwrap()
    }

    /// Two dense clusters in adjacent cells plus one far away.
    fn clustered_points() -> Vec<[f32; 3]> {
        let mut points = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                for k in 0..5 {
                    let d = [i as f32 * 0.1, j as f32 * 0.1, k as f32 * 0.1];
                    points.push([0.3 + d[0], 0.3 + d[1], 0.3 + d[2]]);
                    points.push([1.3 + d[0], 0.3 + d[1], 0.3 + d[2]]);
                    points.push([4.3 + d[0], 4.3 + d[1], 4.3 + d[2]]);
                }
            }
        }
        // Anchor the grid origin at 0 and its far corner at 5
        points.push([0.0, 0.0, 0.0]);
        points.push([5.0, 5.0, 5.0]);
        points
    }

    #[test]
    fn test_only_adjacent_pairs() {
        let points = clustered_points();
        let grid = VoxelGrid::with_voxel_size(&points, 1.0).unwrap();
        let store = accumulate(&grid, &points, None, 0).unwrap();

        let divergences = symmetric(&store, &grid);

        // Occupied: (0,0,0) with the origin anchor, (1,0,0), and (4,4,4) with
        // the far anchor
        assert_eq!(store.num_valid(), 3);
        assert_eq!(divergences.len(), 1);

        let d = divergences[0];
        assert_eq!(d.p, 0);
        assert_eq!(d.q, 1);
        assert!(d.divergence > 0.0);
    }

    #[test]
    fn test_sorted_and_oriented() {
        let points = make_uniform_cube(5000, 3.0, 8);
        let grid = VoxelGrid::from_points(&points, 64).unwrap();
        let store = accumulate(&grid, &points, None, 0).unwrap();

        for mode in [DivergenceMode::Forward, DivergenceMode::Symmetric] {
            let divergences = compute_divergences(&store, &grid, mode, 1e-6).unwrap();
            assert!(!divergences.is_empty());

            for d in &divergences {
                assert!(d.p < d.q);
                assert!(d.divergence >= 0.0);
                assert!(d.divergence.is_finite());
            }
            for pair in divergences.windows(2) {
                assert!(pair[0].divergence <= pair[1].divergence);
            }
        }
    }

    #[test]
    fn test_symmetric_is_sum_of_directions() {
        let points = make_uniform_cube(2000, 1.0, 4);
        let grid = VoxelGrid::from_points(&points, 8).unwrap();
        let store = accumulate(&grid, &points, None, 0).unwrap();

        for d in &symmetric(&store, &grid) {
            let p = store.snapshot(d.p).unwrap();
            let q = store.snapshot(d.q).unwrap();
            let expected =
                kl_divergence(&p, &q, 1e-6).unwrap() + kl_divergence(&q, &p, 1e-6).unwrap();
            assert!((d.divergence - expected).abs() < 1e-9 * expected.max(1.0));
        }
    }

    #[test]
    fn test_strict_mode_reports_degenerate_voxel() {
        let points = [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]];
        let grid = VoxelGrid::with_voxel_size(&points, 1.0).unwrap();
        let store = accumulate(&grid, &points, None, 0).unwrap();

        let result = compute_divergences(&store, &grid, DivergenceMode::Symmetric, 0.0);
        assert!(matches!(
            result,
            Err(SamplerError::DegenerateDistribution { .. })
        ));
    }

    #[test]
    fn test_retain_live_drops_stale_records() {
        let points = make_uniform_cube(2000, 1.0, 4);
        let grid = VoxelGrid::from_points(&points, 8).unwrap();
        let mut store = accumulate(&grid, &points, None, 0).unwrap();

        let mut divergences = symmetric(&store, &grid);
        let removed = divergences[0].p;
        store.remove(removed);

        retain_live(&mut divergences, &store);
        assert!(divergences
            .iter()
            .all(|d| d.p != removed && d.q != removed));
        assert!(divergences.iter().all(|d| d.is_live(&store)));
    }
}
