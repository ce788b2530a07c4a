//! Occupancy-driven voxel size search.
//!
//! The volumetric policy only approximates the desired count: clouds that
//! fill their bounding box unevenly (surfaces, scans) occupy far fewer cells
//! than the box holds. This search bisects the voxel size against the actual
//! occupied-cell count instead.

use rayon::prelude::*;
use tracing::{debug, warn};

use super::{checked_num_cells, grid_dims, volumetric_voxel_size, Bounds, VoxelGrid};
use crate::error::{Result, SamplerError};

/// Number of distinct cells hit by `points`.
pub fn count_occupied(grid: &VoxelGrid, points: &[[f32; 3]]) -> Result<usize> {
    let mut indices = points
        .par_iter()
        .map(|p| grid.voxel_index(p))
        .collect::<Result<Vec<_>>>()?;

    indices.par_sort_unstable();
    indices.dedup();

    Ok(indices.len())
}

/// Search a voxel size whose occupancy lies in
/// `[desired, desired * (1 + upper_tolerance)]`.
///
/// Starts from the volumetric estimate and bisects between zero and the
/// largest extent. Probes that would exceed [`super::MAX_GRID_CELLS`] count as
/// "too fine". If no probe lands in the window, returns the probe closest to
/// the window, preferring those at or above `desired`.
pub fn search_grid(
    points: &[[f32; 3]],
    desired: usize,
    upper_tolerance: f64,
    max_iterations: usize,
) -> Result<VoxelGrid> {
    let bounds = Bounds::from_points(points)?;
    let upper = desired as f64 * (1.0 + upper_tolerance);

    let mut lo = 0.0_f64;
    let mut hi = bounds.extent().iter().copied().fold(0.0_f64, f64::max);
    let mut guess = volumetric_voxel_size(&bounds, desired)?;

    let mut best: Option<(VoxelGrid, (bool, usize))> = None;

    for iteration in 0..max_iterations {
        let dims = grid_dims(&bounds.extent(), guess);
        if checked_num_cells(dims).is_none() {
            lo = guess;
            guess = lo + (hi - lo) / 2.0;
            continue;
        }

        let grid = VoxelGrid::from_bounds(&bounds, guess)?;
        let occupied = count_occupied(&grid, points)?;

        debug!(iteration, voxel_size = guess, occupied, desired, "Voxel size probe");

        if occupied as f64 > upper {
            lo = guess;
        } else if occupied < desired {
            hi = guess;
        } else {
            return Ok(grid);
        }

        // Rank: below-target probes lose to any probe at or above target.
        let rank = if occupied >= desired {
            (false, occupied - desired)
        } else {
            (true, desired - occupied)
        };
        if best.as_ref().map_or(true, |(_, seen)| rank < *seen) {
            best = Some((grid, rank));
        }

        guess = lo + (hi - lo) / 2.0;
    }

    warn!(
        max_iterations,
        desired, "Voxel size search exhausted its iteration budget"
    );

    best.map(|(grid, _)| grid).ok_or_else(|| {
        SamplerError::InvalidInput(format!(
            "no voxel size within {max_iterations} probes fits the grid cell limit"
        ))
    })
}
