//! Parallel accumulation of points into per-voxel distributions.
//!
//! # Algorithm
//!
//! 1. Resolve every point's flattened voxel index (parallel). Any failure
//!    aborts before a single slot is touched.
//! 2. Fold points into a fresh [`DistributionStore`] from rayon workers. Each
//!    fold locks only its own slot.
//!
//! Runs on whatever rayon pool is current; callers wrap it in
//! `ThreadPool::install` to bound the worker count.

use rayon::prelude::*;
use tracing::debug;

use super::DistributionStore;
use crate::error::{Result, SamplerError};
use crate::voxel_grid::VoxelGrid;

/// Points folded per rayon task.
const FOLD_CHUNK: usize = 1024;

/// Check a label array against the point array.
///
/// Labels must run parallel to the points and lie in `0..=num_classes`
/// (label `num_classes` is the "unknown" bucket).
pub fn validate_classes(
    num_points: usize,
    classes: Option<&[u16]>,
    num_classes: u16,
) -> Result<()> {
    let Some(classes) = classes else {
        return Ok(());
    };

    if classes.len() != num_points {
        return Err(SamplerError::InvalidInput(format!(
            "got {} class labels for {num_points} points",
            classes.len()
        )));
    }

    if let Some((i, label)) = classes
        .iter()
        .enumerate()
        .find(|(_, &label)| label > num_classes)
    {
        return Err(SamplerError::InvalidInput(format!(
            "point {i} has class {label}, expected 0..={num_classes}"
        )));
    }

    Ok(())
}

/// Fold all points into a new store sized for `grid`.
pub fn accumulate(
    grid: &VoxelGrid,
    points: &[[f32; 3]],
    classes: Option<&[u16]>,
    num_classes: u16,
) -> Result<DistributionStore> {
    validate_classes(points.len(), classes, num_classes)?;

    let indices = points
        .par_iter()
        .map(|p| grid.voxel_index(p))
        .collect::<Result<Vec<_>>>()?;

    let store = DistributionStore::new(grid.num_cells(), num_classes);

    indices
        .par_chunks(FOLD_CHUNK)
        .zip(points.par_chunks(FOLD_CHUNK))
        .enumerate()
        .for_each(|(chunk, (chunk_indices, chunk_points))| {
            let base = chunk * FOLD_CHUNK;
            for (offset, (&index, point)) in chunk_indices.iter().zip(chunk_points).enumerate() {
                let label = classes.map(|c| c[base + offset]);
                store.fold_point(index, point, label);
            }
        });

    debug!(
        num_points = points.len(),
        num_cells = store.len(),
        "Accumulated points into voxel distributions"
    );

    Ok(store)
}
