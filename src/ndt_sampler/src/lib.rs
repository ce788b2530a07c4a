//! NDT-based point cloud downsampling.
//!
//! This library reduces large 3D point clouds by fitting one Gaussian per
//! occupied voxel (the Normal Distributions Transform), then optionally
//! prunes the distribution set to an exact count using KL divergence between
//! adjacent voxels.
//!
//! # Architecture
//!
//! The pipeline is split into phases:
//! - Phase 1: Voxel grid sizing from the bounding box and desired count
//! - Phase 2: Parallel accumulation of points into per-voxel distributions
//! - Phase 3: KL divergences between adjacent distributions
//! - Phase 4: Pruning the most redundant distributions
//! - Phase 5: Reconstruction of a point cloud (point, covariance, class)
//!
//! # Usage
//!
//! ```ignore
//! use ndt_sampler::NdtSampler;
//!
//! let mut sampler = NdtSampler::new()?;
//!
//! // Roughly 10k points, one per occupied voxel
//! let coarse = sampler.downsample(&points, Some(&labels), 19, 10_000)?;
//!
//! // Exactly 2k points
//! let sample = sampler.prune(2_000)?;
//! println!("{} points, first covariance {:?}", sample.len(), sample.covariances[0]);
//! ```

pub mod distribution;
pub mod divergence;
pub mod error;
pub mod pruning;
pub mod reconstruction;
pub mod sampler;
pub mod test_utils;
pub mod timing;
pub mod voxel_grid;

pub use distribution::{DistributionStore, NormalDistribution};
pub use divergence::{compute_divergences, kl_divergence, DivergenceMode, KlDivergence};
pub use error::{Result, SamplerError};
pub use pruning::PruneReport;
pub use reconstruction::{PointCloudSample, PointPlacement};
pub use timing::SamplerTiming;
pub use voxel_grid::{GridSizing, VoxelCoord, VoxelGrid};

// High-level API (recommended for most users)
pub use sampler::{NdtSampler, SamplerBuilder, SamplerConfig};
