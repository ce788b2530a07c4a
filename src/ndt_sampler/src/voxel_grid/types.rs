//! Type definitions for voxel grid structures.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SamplerError};

/// Policy used to choose the voxel edge length from the desired point count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum GridSizing {
    /// Distribute the bounding-box volume evenly over the desired number of
    /// cells. The estimate `(volume / desired)^(1/d)` over the `d` non-flat
    /// axes is snapped to `largest_extent / 2^k`.
    ///
    /// Deterministic and monotonic: a larger desired count never yields a
    /// larger voxel or fewer occupied voxels.
    #[default]
    Volumetric,
    /// Bisect the voxel size until the number of occupied voxels lies in
    /// `[desired, desired * (1 + upper_tolerance)]`.
    ///
    /// Each probe counts occupied cells over the full cloud. When the
    /// iteration budget runs out, the best probe seen is used.
    Search {
        upper_tolerance: f64,
        max_iterations: usize,
    },
}

/// Axis-aligned bounding box of a point cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Bounds {
    /// Compute the bounding box of a point cloud.
    ///
    /// Fails with `InvalidInput` for an empty cloud or non-finite coordinates.
    pub fn from_points(points: &[[f32; 3]]) -> Result<Self> {
        if points.is_empty() {
            return Err(SamplerError::InvalidInput(
                "point cloud is empty".to_string(),
            ));
        }

        let mut min = [f64::MAX; 3];
        let mut max = [f64::MIN; 3];

        for (i, p) in points.iter().enumerate() {
            if !p.iter().all(|v| v.is_finite()) {
                return Err(SamplerError::InvalidInput(format!(
                    "point {i} has non-finite coordinates {p:?}"
                )));
            }
            for axis in 0..3 {
                let v = p[axis] as f64;
                min[axis] = min[axis].min(v);
                max[axis] = max[axis].max(v);
            }
        }

        Ok(Self { min, max })
    }

    /// Extent along each axis.
    pub fn extent(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// 3D voxel coordinates (non-negative grid indices).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoxelCoord {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl VoxelCoord {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }
}
