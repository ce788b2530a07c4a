//! Synthetic point clouds with known structure.
//!
//! Random generators take an explicit seed so tests and the demo binary are
//! reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

/// One point at the centre of each octant of the unit cube, ordered
/// x-fastest.
///
/// Their bounding box is `[0.25, 0.75]^3`, so a grid sized for eight voxels
/// puts every point in its own cell.
pub fn make_octant_points() -> Vec<[f32; 3]> {
    let mut points = Vec::with_capacity(8);
    for z in [0.25, 0.75] {
        for y in [0.25, 0.75] {
            for x in [0.25, 0.75] {
                points.push([x, y, z]);
            }
        }
    }
    points
}

/// `n` points drawn uniformly from `[0, side]^3`.
pub fn make_uniform_cube(n: usize, side: f32, seed: u64) -> Vec<[f32; 3]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            [
                rng.gen_range(0.0..=side),
                rng.gen_range(0.0..=side),
                rng.gen_range(0.0..=side),
            ]
        })
        .collect()
}

/// `n` points from an axis-aligned Gaussian with per-axis standard deviation
/// `sigma`. A zero `sigma` pins that axis to `center`.
pub fn make_gaussian_cluster(
    center: [f32; 3],
    sigma: [f32; 3],
    n: usize,
    seed: u64,
) -> Vec<[f32; 3]> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..n)
        .map(|_| {
            std::array::from_fn(|i| {
                let z: f32 = StandardNormal.sample(&mut rng);
                center[i] + sigma[i] * z
            })
        })
        .collect()
}

/// Three orthogonal planes (XY, YZ, ZX) forming a half-cube with side
/// `length` and grid spacing `interval`.
///
/// Returns `3 * (length/interval + 1)^2` points. The edges shared by two
/// planes are emitted twice.
pub fn make_half_cubic_pcd(length: f32, interval: f32) -> Vec<[f32; 3]> {
    let num_points_per_line = ((length / interval) as usize) + 1;
    let mut points = Vec::with_capacity(3 * num_points_per_line * num_points_per_line);

    for i in 0..num_points_per_line {
        for j in 0..num_points_per_line {
            let u = interval * (j as f32);
            let v = interval * (i as f32);

            points.push([u, v, 0.0]);
            points.push([0.0, u, v]);
            points.push([u, 0.0, v]);
        }
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel_grid::Bounds;

    #[test]
    fn test_octant_points() {
        let points = make_octant_points();
        assert_eq!(points.len(), 8);
        assert_eq!(points[1], [0.75, 0.25, 0.25]);

        let bounds = Bounds::from_points(&points).unwrap();
        assert_eq!(bounds.min, [0.25, 0.25, 0.25]);
        assert_eq!(bounds.max, [0.75, 0.75, 0.75]);
    }

    #[test]
    fn test_uniform_cube_is_seeded_and_bounded() {
        let a = make_uniform_cube(500, 2.0, 42);
        let b = make_uniform_cube(500, 2.0, 42);
        let c = make_uniform_cube(500, 2.0, 43);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().flatten().all(|&v| (0.0..=2.0).contains(&v)));
    }

    #[test]
    fn test_gaussian_cluster_moments() {
        let points = make_gaussian_cluster([1.0, 2.0, 3.0], [0.5, 0.1, 0.0], 10_000, 7);
        let n = points.len() as f32;

        let mean_x = points.iter().map(|p| p[0]).sum::<f32>() / n;
        let mean_y = points.iter().map(|p| p[1]).sum::<f32>() / n;
        assert!((mean_x - 1.0).abs() < 0.05);
        assert!((mean_y - 2.0).abs() < 0.01);

        // Zero sigma collapses the axis
        assert!(points.iter().all(|p| p[2] == 3.0));
    }

    #[test]
    fn test_half_cubic_pcd() {
        let points = make_half_cubic_pcd(2.0, 1.0);
        assert_eq!(points.len(), 27);

        let bounds = Bounds::from_points(&points).unwrap();
        assert_eq!(bounds.min, [0.0, 0.0, 0.0]);
        assert_eq!(bounds.max, [2.0, 2.0, 2.0]);
    }
}
