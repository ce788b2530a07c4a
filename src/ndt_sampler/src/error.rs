//! Error types for the NDT sampler.

use rayon::ThreadPoolBuildError;
use thiserror::Error;

/// Errors from sampler operations.
///
/// Every variant is a local, non-retryable condition: there is no I/O in the
/// engine, so callers either fix their inputs or stop using the instance.
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Point {point:?} lies outside the voxel grid")]
    OutOfBounds { point: [f32; 3] },

    #[error("Distribution {index} has a singular covariance")]
    DegenerateDistribution { index: usize },

    #[error("Cannot prune to {target} distributions ({available} available)")]
    InvalidTarget { target: usize, available: usize },

    #[error("Sampler used after release()")]
    UseAfterRelease,

    #[error("No distributions yet. Call downsample() first.")]
    NotDownsampled,

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] ThreadPoolBuildError),
}

impl SamplerError {
    /// Whether the caller can retry with corrected parameters.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            SamplerError::InvalidInput(_)
                | SamplerError::OutOfBounds { .. }
                | SamplerError::InvalidTarget { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SamplerError>;
