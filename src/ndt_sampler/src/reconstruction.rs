//! Projection of valid distributions back into a point cloud.

use serde::{Deserialize, Serialize};

use crate::distribution::DistributionStore;
use crate::voxel_grid::VoxelGrid;

/// Where each emitted point is placed inside its voxel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointPlacement {
    /// The distribution mean.
    #[default]
    Mean,
    /// The geometric centre of the voxel.
    VoxelCenter,
}

/// Downsampled point cloud: three parallel arrays, one entry per valid
/// distribution, in ascending voxel index order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloudSample {
    pub points: Vec<[f32; 3]>,
    /// Row-major 3x3 covariances.
    pub covariances: Vec<[f32; 9]>,
    /// Majority class per point, `None` when no labels were supplied.
    pub classes: Vec<Option<u16>>,
}

impl PointCloudSample {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Positions as a flat array [N * 3].
    pub fn points_flat(&self) -> Vec<f32> {
        self.points.iter().flatten().copied().collect()
    }

    /// Covariances as a flat array [N * 9].
    pub fn covariances_flat(&self) -> Vec<f32> {
        self.covariances.iter().flatten().copied().collect()
    }
}

/// Emit one point per valid distribution.
///
/// Reads only: repeated calls over an unchanged store return identical output.
pub fn reconstruct(
    store: &DistributionStore,
    grid: &VoxelGrid,
    placement: PointPlacement,
) -> PointCloudSample {
    let valid = store.valid_indices();
    let mut sample = PointCloudSample {
        points: Vec::with_capacity(valid.len()),
        covariances: Vec::with_capacity(valid.len()),
        classes: Vec::with_capacity(valid.len()),
    };

    for index in valid {
        let nd = store.slot(index);

        let position = match placement {
            PointPlacement::Mean => {
                let mean = nd.mean_vector();
                [mean.x, mean.y, mean.z]
            }
            PointPlacement::VoxelCenter => grid.voxel_center(grid.coord_of(index)),
        };
        sample.points.push(position.map(|v| v as f32));

        // Row-major order
        let cov = nd.covariance_matrix();
        sample
            .covariances
            .push(std::array::from_fn(|i| cov[(i / 3, i % 3)] as f32));

        sample.classes.push(nd.dominant_class());
    }

    sample
}
