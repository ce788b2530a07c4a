//! Voxel grid geometry.
//!
//! The grid is a dense, axis-aligned lattice anchored at the bounding-box
//! minimum of the input cloud. It owns no point data: it only maps metric
//! points to voxel coordinates and flattened cell indices, which index the
//! per-voxel distribution slots.
//!
//! # Sizing
//!
//! A single isotropic edge length is chosen from the desired output point
//! count (see [`GridSizing`]). Axes with zero extent (planar or linear clouds)
//! are excluded from the volume and get a single cell. Volumetric sizes are
//! dyadic fractions of the largest extent, so grids for increasing counts
//! nest inside each other.
//!
//! # Indexing
//!
//! `index = x + y * len_x + z * len_x * len_y`
//!
//! Points inside the grid's metric extent are clamped into the boundary cell
//! (a point on the maximum face maps to the last cell). Points outside the
//! extent fail with `OutOfBounds`.

pub mod sizing;
pub mod types;

pub use types::{Bounds, GridSizing, VoxelCoord};

use tracing::debug;

use crate::error::{Result, SamplerError};

/// Upper bound on the number of cells a grid may allocate.
pub const MAX_GRID_CELLS: usize = 1 << 24;

/// Slack (in voxel units) for points sitting on the grid faces.
const BOUNDARY_TOLERANCE: f64 = 1e-6;

/// Axes whose extent is below this fraction of the largest extent are flat.
const FLAT_AXIS_RATIO: f64 = 1e-9;

/// Deepest dyadic refinement of the largest extent.
const MAX_HALVINGS: f64 = 512.0;

/// Dense voxel grid geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    /// Cells per axis `[len_x, len_y, len_z]`.
    dims: [usize; 3],
    /// Metric position of the grid origin (bounding-box minimum).
    offset: [f64; 3],
    /// Edge length of every voxel.
    voxel_size: f64,
}

impl VoxelGrid {
    /// Size a grid for `points` so that roughly `desired` voxels are occupied.
    ///
    /// Uses the volumetric policy. See [`sizing::search_grid`] for the
    /// occupancy-driven alternative.
    ///
    /// # Example
    /// ```ignore
    /// let grid = VoxelGrid::from_points(&points, 100)?;
    /// let index = grid.voxel_index(&points[0])?;
    /// ```
    pub fn from_points(points: &[[f32; 3]], desired: usize) -> Result<Self> {
        let bounds = Bounds::from_points(points)?;
        let voxel_size = volumetric_voxel_size(&bounds, desired)?;
        Self::from_bounds(&bounds, voxel_size)
    }

    /// Build a grid over `points` with an explicit voxel size.
    pub fn with_voxel_size(points: &[[f32; 3]], voxel_size: f64) -> Result<Self> {
        let bounds = Bounds::from_points(points)?;
        Self::from_bounds(&bounds, voxel_size)
    }

    /// Build a grid covering `bounds` with the given voxel size.
    pub fn from_bounds(bounds: &Bounds, voxel_size: f64) -> Result<Self> {
        if !(voxel_size.is_finite() && voxel_size > 0.0) {
            return Err(SamplerError::InvalidInput(format!(
                "voxel size must be positive and finite, got {voxel_size}"
            )));
        }

        let dims = grid_dims(&bounds.extent(), voxel_size);
        let num_cells = checked_num_cells(dims).ok_or_else(|| {
            SamplerError::InvalidInput(format!(
                "voxel size {voxel_size} needs a {dims:?} grid (limit {MAX_GRID_CELLS} cells)"
            ))
        })?;

        debug!(
            ?dims,
            num_cells,
            voxel_size,
            offset = ?bounds.min,
            "Voxel grid sized"
        );

        Ok(Self {
            dims,
            offset: bounds.min,
            voxel_size,
        })
    }

    /// Cells per axis `[len_x, len_y, len_z]`.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Grid origin in metric space.
    pub fn offset(&self) -> [f64; 3] {
        self.offset
    }

    /// Voxel edge length.
    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    /// Total number of cells (`len_x * len_y * len_z`).
    pub fn num_cells(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Voxel coordinates of a metric point.
    pub fn voxel_coord(&self, point: &[f32; 3]) -> Result<VoxelCoord> {
        let mut cell = [0usize; 3];

        for axis in 0..3 {
            let rel = (point[axis] as f64 - self.offset[axis]) / self.voxel_size;
            let len = self.dims[axis];

            if !rel.is_finite()
                || rel < -BOUNDARY_TOLERANCE
                || rel > len as f64 + BOUNDARY_TOLERANCE
            {
                return Err(SamplerError::OutOfBounds { point: *point });
            }

            cell[axis] = (rel.max(0.0).floor() as usize).min(len - 1);
        }

        Ok(VoxelCoord::new(cell[0], cell[1], cell[2]))
    }

    /// Flattened cell index of a metric point.
    pub fn voxel_index(&self, point: &[f32; 3]) -> Result<usize> {
        self.voxel_coord(point).map(|coord| self.flat_index(coord))
    }

    /// Flatten voxel coordinates: `x + y * len_x + z * len_x * len_y`.
    pub fn flat_index(&self, coord: VoxelCoord) -> usize {
        coord.x + coord.y * self.dims[0] + coord.z * self.dims[0] * self.dims[1]
    }

    /// Voxel coordinates of a flattened index (inverse of [`Self::flat_index`]).
    pub fn coord_of(&self, index: usize) -> VoxelCoord {
        let dim_xy = self.dims[0] * self.dims[1];
        let z = index / dim_xy;
        let remainder = index % dim_xy;
        let y = remainder / self.dims[0];
        let x = remainder % self.dims[0];

        VoxelCoord::new(x, y, z)
    }

    /// Metric centre of a voxel.
    pub fn voxel_center(&self, coord: VoxelCoord) -> [f64; 3] {
        let cell = [coord.x, coord.y, coord.z];
        std::array::from_fn(|axis| {
            self.offset[axis] + (cell[axis] as f64 + 0.5) * self.voxel_size
        })
    }

    /// Flattened indices of the in-grid face, edge and corner neighbours of a
    /// cell (at most 26).
    pub fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let center = self.coord_of(index);

        neighbor_offsets().filter_map(move |[dx, dy, dz]| {
            let x = center.x.checked_add_signed(dx)?;
            let y = center.y.checked_add_signed(dy)?;
            let z = center.z.checked_add_signed(dz)?;

            if x >= self.dims[0] || y >= self.dims[1] || z >= self.dims[2] {
                return None;
            }

            Some(self.flat_index(VoxelCoord::new(x, y, z)))
        })
    }
}

/// Volumetric voxel size over the non-flat axes.
///
/// The raw estimate `(volume / desired)^(1/d)` is snapped to the nearest
/// (in log scale) size of the form `largest_extent / 2^k`. Grids sized this
/// way share the bounding-box origin and every finer grid subdivides each
/// coarser cell exactly, so a larger `desired` never occupies fewer voxels.
pub fn volumetric_voxel_size(bounds: &Bounds, desired: usize) -> Result<f64> {
    if desired == 0 {
        return Err(SamplerError::InvalidInput(
            "desired point count must be at least 1".to_string(),
        ));
    }

    let extent = bounds.extent();
    let largest = extent.iter().copied().fold(0.0_f64, f64::max);
    let spans: Vec<f64> = extent
        .iter()
        .copied()
        .filter(|&e| e > largest * FLAT_AXIS_RATIO && e > 0.0)
        .collect();

    if spans.is_empty() {
        return Err(SamplerError::InvalidInput(
            "point cloud has zero extent on every axis".to_string(),
        ));
    }

    let volume: f64 = spans.iter().product();
    let estimate = (volume / desired as f64).powf(1.0 / spans.len() as f64);

    // The estimate never exceeds the largest extent, so halvings >= 0
    let ratio = (largest / estimate).log2();
    let halvings = ratio.round().clamp(0.0, MAX_HALVINGS);
    let voxel_size = largest / 2.0_f64.powi(halvings as i32);

    if !(voxel_size.is_finite() && voxel_size > 0.0) {
        return Err(SamplerError::InvalidInput(format!(
            "bounding box {extent:?} yields voxel size {voxel_size}"
        )));
    }

    Ok(voxel_size)
}

/// Cells per axis for a given extent; every axis gets at least one cell.
///
/// Ratios within `BOUNDARY_TOLERANCE` of an integer do not open an extra
/// cell; the upper face clamps into the last one instead.
fn grid_dims(extent: &[f64; 3], voxel_size: f64) -> [usize; 3] {
    std::array::from_fn(|axis| {
        let cells = (extent[axis] / voxel_size - BOUNDARY_TOLERANCE).ceil();
        (cells as usize).max(1)
    })
}

fn checked_num_cells(dims: [usize; 3]) -> Option<usize> {
    dims[0]
        .checked_mul(dims[1])?
        .checked_mul(dims[2])
        .filter(|&cells| cells <= MAX_GRID_CELLS)
}

fn neighbor_offsets() -> impl Iterator<Item = [isize; 3]> {
    // x fastest, matching the flattened index order
    (0..27isize)
        .map(|i| [i % 3 - 1, i / 3 % 3 - 1, i / 9 - 1])
        .filter(|offset| *offset != [0, 0, 0])
}
