//! Closed-form KL divergence between 3D Gaussians.
//!
//! ```text
//! D(P||Q) = 0.5 * (tr(Σq⁻¹ Σp) + (μq - μp)ᵀ Σq⁻¹ (μq - μp) - 3 + ln(|Σq| / |Σp|))
//! ```
//!
//! Both covariances are regularized with `ε·I` before factorization. With
//! `ε = 0`, a covariance that is not positive definite is reported as
//! degenerate instead.

use nalgebra::{Cholesky, Matrix3, Vector3, U3};

use crate::distribution::NormalDistribution;
use crate::error::{Result, SamplerError};

const DIMENSIONS: f64 = 3.0;

/// A finalized, regularized Gaussian with its Cholesky factor cached.
#[derive(Debug, Clone)]
pub struct PreparedGaussian {
    pub mean: Vector3<f64>,
    pub covariance: Matrix3<f64>,
    cholesky: Cholesky<f64, U3>,
    ln_det: f64,
}

impl PreparedGaussian {
    /// Finalize and factor a distribution.
    ///
    /// Returns `None` if the regularized covariance is not positive definite.
    pub fn new(nd: &NormalDistribution, epsilon: f64) -> Option<Self> {
        Self::from_moments(nd.mean_vector(), nd.covariance_matrix(), epsilon)
    }

    /// Factor a Gaussian given by its mean and covariance.
    pub fn from_moments(
        mean: Vector3<f64>,
        covariance: Matrix3<f64>,
        epsilon: f64,
    ) -> Option<Self> {
        let covariance = covariance + Matrix3::identity() * epsilon;
        let cholesky = covariance.cholesky()?;

        // |Σ| = Π L_ii², so ln|Σ| = 2 Σ ln L_ii
        let l = cholesky.l_dirty();
        let ln_det = 2.0 * (0..3).map(|i| l[(i, i)].ln()).sum::<f64>();

        if !ln_det.is_finite() {
            return None;
        }

        Some(Self {
            mean,
            covariance,
            cholesky,
            ln_det,
        })
    }

    /// `D(self || q)`, clamped at zero against rounding.
    pub fn divergence_to(&self, q: &PreparedGaussian) -> f64 {
        let trace = q.cholesky.solve(&self.covariance).trace();

        let diff = q.mean - self.mean;
        let mahalanobis = diff.dot(&q.cholesky.solve(&diff));

        let kl = 0.5 * (trace + mahalanobis - DIMENSIONS + q.ln_det - self.ln_det);
        kl.max(0.0)
    }

    /// `D(self || q) + D(q || self)`.
    pub fn symmetric_divergence(&self, q: &PreparedGaussian) -> f64 {
        self.divergence_to(q) + q.divergence_to(self)
    }
}

/// `D(P || Q)` between two accumulated distributions.
///
/// Fails with `DegenerateDistribution` naming the offending voxel when either
/// covariance cannot be factored after regularization.
pub fn kl_divergence(
    p: &NormalDistribution,
    q: &NormalDistribution,
    epsilon: f64,
) -> Result<f64> {
    let prepare = |nd: &NormalDistribution| {
        let index = nd.index.unwrap_or_default();
        PreparedGaussian::new(nd, epsilon)
            .ok_or(SamplerError::DegenerateDistribution { index })
    };

    let p = prepare(p)?;
    let q = prepare(q)?;
    Ok(p.divergence_to(&q))
}
