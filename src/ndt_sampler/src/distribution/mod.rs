//! Per-voxel normal distributions.
//!
//! Each grid cell owns one [`NormalDistribution`] that folds points in with
//! Welford's single-pass update:
//!
//! ```text
//! n     += 1
//! delta  = x - mean_old
//! mean   = mean_old + delta / n
//! C     += delta * (x - mean)^T
//! ```
//!
//! `C` is the unnormalized co-moment matrix. It is divided by `n` only when
//! read through [`NormalDistribution::covariance_matrix`], so single-sample
//! voxels finalize to a zero covariance.

pub mod accumulator;
pub mod store;

pub use accumulator::{accumulate, validate_classes};
pub use store::DistributionStore;

use nalgebra::{Matrix3, Vector3};

/// Gaussian statistics of the points that fell into one voxel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalDistribution {
    /// Flattened voxel index. `None` until the first point arrives.
    pub index: Option<usize>,
    /// Running centroid.
    pub mean: Vector3<f64>,
    /// Centroid before the most recent update.
    pub old_mean: Vector3<f64>,
    /// Unnormalized co-moment matrix (sum of deviation outer products).
    pub covariance: Matrix3<f64>,
    /// Per-axis sum of squared deviations (diagonal of `covariance`).
    pub m2: Vector3<f64>,
    /// Points folded in so far. Zero means the voxel is empty or pruned.
    pub num_samples: usize,
    /// Current majority class, if labels were supplied.
    pub class: Option<u16>,
    /// Votes held by `class`.
    pub num_class_samples: u32,
    /// Votes per label, `num_classes + 1` entries once the first label arrives.
    class_counts: Vec<u32>,
}

impl NormalDistribution {
    /// Whether any point has been folded into this distribution.
    pub fn is_valid(&self) -> bool {
        self.num_samples > 0
    }

    /// Fold one point (and optionally its class label) into the statistics.
    ///
    /// `label` must be in `0..=num_classes`; callers validate beforehand.
    pub fn fold(&mut self, index: usize, point: &[f32; 3], label: Option<u16>, num_classes: u16) {
        let x = Vector3::new(point[0] as f64, point[1] as f64, point[2] as f64);

        self.index.get_or_insert(index);
        self.num_samples += 1;
        let n = self.num_samples as f64;

        self.old_mean = self.mean;
        let delta = x - self.old_mean;
        self.mean = self.old_mean + delta / n;
        let residual = x - self.mean;

        self.m2 += delta.component_mul(&residual);
        self.covariance += delta * residual.transpose();

        if let Some(label) = label {
            self.vote(label, num_classes);
        }
    }

    /// Record a class vote, keeping `class` at the argmax of the histogram
    /// (lowest label on ties) so the result is independent of fold order.
    fn vote(&mut self, label: u16, num_classes: u16) {
        if self.class_counts.is_empty() {
            self.class_counts = vec![0; num_classes as usize + 1];
        }

        let slot = label as usize;
        self.class_counts[slot] += 1;
        let votes = self.class_counts[slot];

        match self.class {
            Some(current) if current == label => self.num_class_samples = votes,
            Some(current)
                if votes < self.num_class_samples
                    || (votes == self.num_class_samples && current < label) => {}
            _ => {
                self.class = Some(label);
                self.num_class_samples = votes;
            }
        }
    }

    /// Finalized mean.
    pub fn mean_vector(&self) -> Vector3<f64> {
        self.mean
    }

    /// Finalized (population) covariance: `C / n`, symmetrized.
    ///
    /// Returns the zero matrix for empty distributions.
    pub fn covariance_matrix(&self) -> Matrix3<f64> {
        if self.num_samples == 0 {
            return Matrix3::zeros();
        }

        let cov = self.covariance / self.num_samples as f64;
        (cov + cov.transpose()) * 0.5
    }

    /// Majority class label, `None` when no labels were folded in.
    pub fn dominant_class(&self) -> Option<u16> {
        self.class
    }

    /// Votes per label (empty when no labels were folded in).
    pub fn class_histogram(&self) -> &[u32] {
        &self.class_counts
    }

    /// Reset to the empty state, keeping the voxel identity.
    ///
    /// Used as the pruning tombstone.
    pub fn clear(&mut self) {
        let index = self.index;
        *self = Self::default();
        self.index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fold_all(points: &[[f32; 3]]) -> NormalDistribution {
        let mut nd = NormalDistribution::default();
        for p in points {
            nd.fold(7, p, None, 0);
        }
        nd
    }

    fn batch_covariance(points: &[[f32; 3]]) -> Matrix3<f64> {
        let n = points.len() as f64;
        let vs: Vec<Vector3<f64>> = points
            .iter()
            .map(|p| Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64))
            .collect();
        let mean = vs.iter().sum::<Vector3<f64>>() / n;
        vs.iter()
            .map(|v| (v - mean) * (v - mean).transpose())
            .sum::<Matrix3<f64>>()
            / n
    }

    #[test]
    fn test_single_sample_has_zero_covariance() {
        let nd = fold_all(&[[1.0, 2.0, 3.0]]);

        assert!(nd.is_valid());
        assert_eq!(nd.index, Some(7));
        assert_eq!(nd.mean_vector(), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(nd.covariance_matrix(), Matrix3::zeros());
    }

    #[test]
    fn test_matches_batch_statistics() {
        let points = [
            [1.0, 2.0, 3.0],
            [1.5, 2.2, 2.9],
            [0.7, 1.6, 3.3],
            [1.2, 2.8, 3.1],
            [0.9, 2.1, 2.5],
        ];
        let nd = fold_all(&points);

        let expected_mean = Vector3::new(1.06, 2.14, 2.96);
        assert_relative_eq!(nd.mean_vector(), expected_mean, epsilon = 1e-6);
        assert_relative_eq!(nd.covariance_matrix(), batch_covariance(&points), epsilon = 1e-9);

        // m2 tracks the co-moment diagonal
        for axis in 0..3 {
            assert_relative_eq!(nd.m2[axis], nd.covariance[(axis, axis)], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_covariance_is_symmetric() {
        let points = [[0.0, 0.0, 0.0], [1.0, 2.0, 0.5], [-1.0, 0.3, 2.0], [0.4, -0.7, 1.1]];
        let cov = fold_all(&points).covariance_matrix();

        assert_eq!(cov, cov.transpose());
    }

    #[test]
    fn test_majority_class() {
        let mut nd = NormalDistribution::default();
        for label in [2, 1, 1, 2, 1, 3] {
            nd.fold(0, &[0.0, 0.0, 0.0], Some(label), 4);
        }

        assert_eq!(nd.dominant_class(), Some(1));
        assert_eq!(nd.num_class_samples, 3);
        assert_eq!(nd.class_histogram(), &[0, 3, 2, 1, 0]);
    }

    #[test]
    fn test_class_tie_picks_lowest_label_in_any_order() {
        for order in [[3, 1, 3, 1], [1, 3, 1, 3], [3, 3, 1, 1], [1, 1, 3, 3]] {
            let mut nd = NormalDistribution::default();
            for label in order {
                nd.fold(0, &[0.0, 0.0, 0.0], Some(label), 3);
            }
            assert_eq!(nd.dominant_class(), Some(1), "order {order:?}");
            assert_eq!(nd.num_class_samples, 2);
        }
    }

    #[test]
    fn test_no_labels_means_no_class() {
        let nd = fold_all(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
        assert_eq!(nd.dominant_class(), None);
        assert!(nd.class_histogram().is_empty());
    }

    #[test]
    fn test_clear_keeps_identity() {
        let mut nd = fold_all(&[[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]);
        nd.clear();

        assert!(!nd.is_valid());
        assert_eq!(nd.index, Some(7));
        assert_eq!(nd.covariance_matrix(), Matrix3::zeros());
    }
}
