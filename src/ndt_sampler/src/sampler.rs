//! High-level downsampling engine.
//!
//! # Example
//!
//! ```ignore
//! use ndt_sampler::NdtSampler;
//!
//! let mut sampler = NdtSampler::builder().num_workers(4).build()?;
//!
//! // One point per occupied voxel, roughly 5000 of them
//! let coarse = sampler.downsample(&points, Some(&labels), 19, 5000)?;
//!
//! // Exactly 1000 points, keeping the most informative distributions
//! let sample = sampler.prune(1000)?;
//!
//! sampler.release()?;
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distribution::{accumulate, validate_classes, DistributionStore};
use crate::divergence::{compute_divergences, DivergenceMode, KlDivergence};
use crate::error::{Result, SamplerError};
use crate::pruning::prune;
use crate::reconstruction::{reconstruct, PointCloudSample, PointPlacement};
use crate::timing::{PhaseTimer, SamplerTiming};
use crate::voxel_grid::sizing::search_grid;
use crate::voxel_grid::{GridSizing, VoxelGrid};

/// Configuration for the NDT sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Worker threads for accumulation and divergence computation.
    /// 0 uses the global rayon pool.
    pub num_workers: usize,

    /// Voxel size selection policy.
    pub sizing: GridSizing,

    /// KL direction stored in the divergence records.
    pub divergence: DivergenceMode,

    /// Diagonal regularization added to every covariance before KL
    /// evaluation. 0.0 turns singular covariances into errors.
    pub covariance_epsilon: f64,

    /// Where output points are placed inside their voxel.
    pub placement: PointPlacement,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            num_workers: 0,
            sizing: GridSizing::Volumetric,
            divergence: DivergenceMode::Symmetric,
            covariance_epsilon: 1e-6,
            placement: PointPlacement::Mean,
        }
    }
}

impl SamplerConfig {
    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.covariance_epsilon.is_finite() && self.covariance_epsilon >= 0.0) {
            return Err(SamplerError::InvalidInput(format!(
                "covariance_epsilon must be finite and non-negative, got {}",
                self.covariance_epsilon
            )));
        }

        if let GridSizing::Search {
            upper_tolerance,
            max_iterations,
        } = self.sizing
        {
            if !(upper_tolerance.is_finite() && upper_tolerance >= 0.0) {
                return Err(SamplerError::InvalidInput(format!(
                    "upper_tolerance must be finite and non-negative, got {upper_tolerance}"
                )));
            }
            if max_iterations == 0 {
                return Err(SamplerError::InvalidInput(
                    "max_iterations must be at least 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Builder for NdtSampler configuration.
#[derive(Debug, Clone)]
pub struct SamplerBuilder {
    config: SamplerConfig,
}

impl SamplerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: SamplerConfig::default(),
        }
    }

    /// Set the worker thread count (0 = global rayon pool).
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.config.num_workers = num_workers;
        self
    }

    /// Set the voxel sizing policy.
    pub fn sizing(mut self, sizing: GridSizing) -> Self {
        self.config.sizing = sizing;
        self
    }

    /// Set the divergence direction.
    pub fn divergence(mut self, divergence: DivergenceMode) -> Self {
        self.config.divergence = divergence;
        self
    }

    /// Set the covariance regularization.
    pub fn covariance_epsilon(mut self, epsilon: f64) -> Self {
        self.config.covariance_epsilon = epsilon;
        self
    }

    /// Set the output point placement.
    pub fn placement(mut self, placement: PointPlacement) -> Self {
        self.config.placement = placement;
        self
    }

    /// Build the sampler.
    pub fn build(self) -> Result<NdtSampler> {
        NdtSampler::with_config(self.config)
    }
}

impl Default for SamplerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Distributions from the most recent successful `downsample`.
#[derive(Debug)]
struct GridState {
    grid: VoxelGrid,
    store: DistributionStore,
    /// Computed on the first `prune`, then kept free of stale records.
    divergences: Option<Vec<KlDivergence>>,
}

#[derive(Debug)]
enum SamplerState {
    Idle,
    Ready(Box<GridState>),
    Released,
}

/// NDT downsampling engine.
///
/// Owns the distribution store and divergence list of one
/// downsample/prune cycle. Lifecycle: `downsample` (repeatable, each call
/// replaces the previous state), any number of `prune` calls, then `release`.
#[derive(Debug)]
pub struct NdtSampler {
    config: SamplerConfig,

    /// Dedicated worker pool (None when using the global rayon pool).
    pool: Option<rayon::ThreadPool>,

    state: SamplerState,

    /// Timing of the most recent operation.
    timing: SamplerTiming,
}

impl NdtSampler {
    /// Create a sampler with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(SamplerConfig::default())
    }

    /// Create a sampler with custom configuration.
    pub fn with_config(config: SamplerConfig) -> Result<Self> {
        config.validate()?;

        let pool = if config.num_workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.num_workers)
                .thread_name(|i| format!("ndt-sampler-{i}"))
                .build()?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            config,
            pool,
            state: SamplerState::Idle,
            timing: SamplerTiming::default(),
        })
    }

    /// Create a builder for configuring the sampler.
    pub fn builder() -> SamplerBuilder {
        SamplerBuilder::new()
    }

    /// Get the current configuration.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Check if `release` has been called.
    pub fn is_released(&self) -> bool {
        matches!(self.state, SamplerState::Released)
    }

    /// Timing of the most recent `downsample` or `prune`.
    pub fn timing(&self) -> &SamplerTiming {
        &self.timing
    }

    /// Accumulate `points` into voxel distributions and emit one point per
    /// occupied voxel.
    ///
    /// The voxel size is chosen so that roughly `desired` voxels are
    /// occupied; the output length is the actual occupied count. `classes`,
    /// if given, runs parallel to `points` with labels in `0..=num_classes`.
    ///
    /// On failure the previous distributions (if any) are left untouched.
    pub fn downsample(
        &mut self,
        points: &[[f32; 3]],
        classes: Option<&[u16]>,
        num_classes: u16,
        desired: usize,
    ) -> Result<PointCloudSample> {
        self.ensure_live()?;

        if points.is_empty() {
            return Err(SamplerError::InvalidInput("point cloud is empty".to_string()));
        }
        if desired == 0 {
            return Err(SamplerError::InvalidInput(
                "desired point count must be positive".to_string(),
            ));
        }
        validate_classes(points.len(), classes, num_classes)?;

        let mut timing = SamplerTiming::default();
        let config = &self.config;

        let (grid, store) = install(&self.pool, || -> Result<_> {
            let timer = PhaseTimer::start("sizing");
            let grid = match config.sizing {
                GridSizing::Volumetric => VoxelGrid::from_points(points, desired)?,
                GridSizing::Search {
                    upper_tolerance,
                    max_iterations,
                } => search_grid(points, desired, upper_tolerance, max_iterations)?,
            };
            timer.stop(&mut timing.sizing_ms);

            let timer = PhaseTimer::start("accumulate");
            let store = accumulate(&grid, points, classes, num_classes)?;
            timer.stop(&mut timing.accumulate_ms);

            Ok((grid, store))
        })?;

        let timer = PhaseTimer::start("reconstruct");
        let sample = reconstruct(&store, &grid, self.config.placement);
        timer.stop(&mut timing.reconstruct_ms);

        debug!(
            num_points = points.len(),
            desired,
            num_valid = sample.len(),
            voxel_size = grid.voxel_size(),
            "Downsampled point cloud"
        );

        self.state = SamplerState::Ready(Box::new(GridState {
            grid,
            store,
            divergences: None,
        }));
        self.timing = timing;

        Ok(sample)
    }

    /// Reduce the current distributions to exactly `target` and emit them.
    ///
    /// Divergences between adjacent voxels are computed on the first call
    /// after a `downsample` and reused by later calls. Fails with
    /// `InvalidTarget` if `target` exceeds the number of valid distributions,
    /// without modifying anything.
    pub fn prune(&mut self, target: usize) -> Result<PointCloudSample> {
        let state = match &mut self.state {
            SamplerState::Ready(state) => state,
            SamplerState::Idle => return Err(SamplerError::NotDownsampled),
            SamplerState::Released => return Err(SamplerError::UseAfterRelease),
        };

        let available = state.store.num_valid();
        if target > available {
            return Err(SamplerError::InvalidTarget { target, available });
        }

        let mut timing = SamplerTiming::default();
        let GridState {
            grid,
            store,
            divergences,
        } = &mut **state;

        if divergences.is_none() {
            let timer = PhaseTimer::start("divergence");
            let computed = install(&self.pool, || {
                compute_divergences(
                    store,
                    grid,
                    self.config.divergence,
                    self.config.covariance_epsilon,
                )
            })?;
            timer.stop(&mut timing.divergence_ms);
            *divergences = Some(computed);
        }

        let timer = PhaseTimer::start("prune");
        let records = divergences.get_or_insert_with(Vec::new);
        let report = prune(store, records, target)?;
        timer.stop(&mut timing.prune_ms);

        let timer = PhaseTimer::start("reconstruct");
        let sample = reconstruct(store, grid, self.config.placement);
        timer.stop(&mut timing.reconstruct_ms);

        debug!(
            target,
            removed = report.removed.len(),
            fallback_removed = report.fallback_removed,
            "Pruned distributions"
        );

        self.timing = timing;
        Ok(sample)
    }

    /// Re-emit the current distributions without modifying them.
    pub fn to_point_cloud(&self) -> Result<PointCloudSample> {
        let state = self.ready()?;
        Ok(reconstruct(&state.store, &state.grid, self.config.placement))
    }

    /// Number of valid distributions.
    pub fn num_valid(&self) -> Result<usize> {
        Ok(self.ready()?.store.num_valid())
    }

    /// Grid of the most recent `downsample`.
    pub fn grid(&self) -> Result<&VoxelGrid> {
        Ok(&self.ready()?.grid)
    }

    /// Live divergence records, ascending. Empty until the first `prune`.
    pub fn divergences(&self) -> Result<&[KlDivergence]> {
        Ok(self.ready()?.divergences.as_deref().unwrap_or_default())
    }

    /// Free the distributions, divergence list and worker pool.
    ///
    /// Every later call on this instance fails with `UseAfterRelease`,
    /// including a second `release`.
    pub fn release(&mut self) -> Result<()> {
        self.ensure_live()?;

        if let SamplerState::Ready(state) = &self.state {
            debug!(
                num_cells = state.store.len(),
                "Releasing sampler distributions"
            );
        }

        self.state = SamplerState::Released;
        self.pool = None;
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_released() {
            return Err(SamplerError::UseAfterRelease);
        }
        Ok(())
    }

    fn ready(&self) -> Result<&GridState> {
        match &self.state {
            SamplerState::Ready(state) => Ok(state),
            SamplerState::Idle => Err(SamplerError::NotDownsampled),
            SamplerState::Released => Err(SamplerError::UseAfterRelease),
        }
    }
}

/// Run `op` on the dedicated pool if there is one.
fn install<R, F>(pool: &Option<rayon::ThreadPool>, op: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    match pool {
        Some(pool) => pool.install(op),
        None => op(),
    }
}
