//! Sigma-point quadrature for Gaussian moment propagation
//!
//! Approximates how a Gaussian belief transforms through a nonlinear
//! function by propagating a deterministic set of weighted sample points
//! (the unscented transform) instead of linearizing.
//!
//! # Sigma Point Selection
//!
//! This implementation uses the symmetric sigma point selection:
//! - χ₀ = μ (mean)
//! - χᵢ = μ + √((n+λ)P)ᵢ for i = 1...n
//! - χᵢ₊ₙ = μ - √((n+λ)P)ᵢ for i = 1...n
//!
//! where λ = α²(n+κ) - n is the scaling parameter.
//!
//! # Example
//!
//! ```
//! use depthtrack::prelude::*;
//! use nalgebra::{DMatrix, DVector};
//!
//! let quadrature = UnscentedQuadrature::default();
//! let mean = DVector::from_row_slice(&[1.0, -2.0]);
//! let covariance = DMatrix::from_diagonal_element(2, 2, 0.5);
//!
//! // Propagating the points through the identity recovers the moments.
//! let points = quadrature.sigma_points(&mean, &covariance).unwrap();
//! let propagated = points.points().to_vec();
//! let recovered = points.mean_of(&propagated);
//! assert!((recovered - mean).norm() < 1e-9);
//! ```

use nalgebra::{DMatrix, DVector};

use crate::{Result, TrackError};

/// Unscented-transform quadrature rule.
///
/// The scaling parameters control the sigma point spread and weighting.
///
/// # Common Parameter Choices
///
/// - **Standard**: α=1e-3, β=2, κ=0
/// - **Scaled**: α=1, β=2, κ=3-n (for Gaussian priors, matches cubature)
#[derive(Debug, Clone, Copy)]
pub struct UnscentedQuadrature {
    /// Primary scaling parameter (controls sigma point spread)
    ///
    /// Typical values: 1e-4 ≤ α ≤ 1. Smaller α puts sigma points closer
    /// to the mean.
    pub alpha: f64,

    /// Secondary scaling parameter (incorporates prior knowledge of the
    /// distribution). For Gaussian distributions β=2 is optimal.
    pub beta: f64,

    /// Tertiary scaling parameter. κ ≥ 0 preserves positive
    /// semi-definiteness of the recovered covariance.
    pub kappa: f64,
}

impl Default for UnscentedQuadrature {
    fn default() -> Self {
        Self {
            alpha: 1e-3,
            beta: 2.0,
            kappa: 0.0,
        }
    }
}

impl UnscentedQuadrature {
    /// Creates a quadrature rule.
    ///
    /// # Panics
    /// Panics if α ≤ 0.
    pub fn new(alpha: f64, beta: f64, kappa: f64) -> Self {
        assert!(alpha > 0.0, "alpha must be positive");
        Self { alpha, beta, kappa }
    }

    /// Computes the scaling parameter λ = α²(n + κ) - n
    #[inline]
    fn lambda(&self, n: usize) -> f64 {
        let n = n as f64;
        self.alpha * self.alpha * (n + self.kappa) - n
    }

    /// Computes γ = √(n + λ) used for sigma point generation
    #[inline]
    fn gamma(&self, n: usize) -> f64 {
        (n as f64 + self.lambda(n)).sqrt()
    }

    /// Generates the 2n+1 sigma points of a Gaussian.
    ///
    /// # Errors
    /// Returns [`TrackError::DegenerateBelief`] when the covariance admits
    /// no Cholesky factor (not positive definite).
    pub fn sigma_points(
        &self,
        mean: &DVector<f64>,
        covariance: &DMatrix<f64>,
    ) -> Result<SigmaPointSet> {
        let n = mean.len();
        let lambda = self.lambda(n);
        let gamma = self.gamma(n);

        let cholesky = covariance
            .clone()
            .cholesky()
            .ok_or_else(|| TrackError::DegenerateBelief {
                description: "covariance is not positive definite".into(),
            })?;
        let scaled_sqrt = cholesky.l() * gamma;

        let mut points = Vec::with_capacity(2 * n + 1);
        points.push(mean.clone());
        for i in 0..n {
            let offset = scaled_sqrt.column(i).into_owned();
            points.push(mean + &offset);
            points.push(mean - &offset);
        }

        let denom = n as f64 + lambda;
        Ok(SigmaPointSet {
            points,
            weight_mean_0: lambda / denom,
            weight_cov_0: lambda / denom + (1.0 - self.alpha * self.alpha + self.beta),
            weight_i: 1.0 / (2.0 * denom),
        })
    }
}

/// The 2n+1 weighted sigma points of one Gaussian.
#[derive(Debug, Clone)]
pub struct SigmaPointSet {
    points: Vec<DVector<f64>>,
    weight_mean_0: f64,
    weight_cov_0: f64,
    weight_i: f64,
}

impl SigmaPointSet {
    /// Number of sigma points (2n+1).
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the set is empty. Never true for generated sets.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The sigma points; index 0 is the central point.
    #[inline]
    pub fn points(&self) -> &[DVector<f64>] {
        &self.points
    }

    /// Mean-recovery weight of point `i`.
    #[inline]
    pub fn weight_mean(&self, i: usize) -> f64 {
        if i == 0 {
            self.weight_mean_0
        } else {
            self.weight_i
        }
    }

    /// Covariance-recovery weight of point `i`.
    #[inline]
    pub fn weight_cov(&self, i: usize) -> f64 {
        if i == 0 {
            self.weight_cov_0
        } else {
            self.weight_i
        }
    }

    /// Recovers the mean of transformed points.
    ///
    /// # Panics
    /// Panics if `transformed` does not hold one vector per sigma point.
    pub fn mean_of(&self, transformed: &[DVector<f64>]) -> DVector<f64> {
        assert_eq!(transformed.len(), self.points.len(), "one value per point");

        let mut mean = &transformed[0] * self.weight_mean_0;
        for value in transformed.iter().skip(1) {
            mean += value * self.weight_i;
        }
        mean
    }

    /// Recovers the covariance of transformed points around `mean`.
    ///
    /// # Panics
    /// Panics if `transformed` does not hold one vector per sigma point.
    pub fn covariance_of(
        &self,
        transformed: &[DVector<f64>],
        mean: &DVector<f64>,
    ) -> DMatrix<f64> {
        assert_eq!(transformed.len(), self.points.len(), "one value per point");

        let dim = mean.len();
        let mut cov = DMatrix::zeros(dim, dim);
        for (i, value) in transformed.iter().enumerate() {
            let diff = value - mean;
            cov += (&diff * diff.transpose()) * self.weight_cov(i);
        }
        cov
    }

    /// Recovers the cross-covariance between the sigma points and their
    /// transformed values.
    ///
    /// # Panics
    /// Panics if `transformed` does not hold one vector per sigma point.
    pub fn cross_covariance(
        &self,
        state_mean: &DVector<f64>,
        transformed: &[DVector<f64>],
        transformed_mean: &DVector<f64>,
    ) -> DMatrix<f64> {
        assert_eq!(transformed.len(), self.points.len(), "one value per point");

        let mut cross = DMatrix::zeros(state_mean.len(), transformed_mean.len());
        for (i, (point, value)) in self.points.iter().zip(transformed.iter()).enumerate() {
            let state_diff = point - state_mean;
            let value_diff = value - transformed_mean;
            cross += (state_diff * value_diff.transpose()) * self.weight_cov(i);
        }
        cross
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_gaussian() -> (DVector<f64>, DMatrix<f64>) {
        let mean = DVector::from_row_slice(&[1.0, -2.0, 0.5]);
        let covariance =
            DMatrix::from_row_slice(3, 3, &[0.5, 0.1, 0.0, 0.1, 0.8, 0.2, 0.0, 0.2, 1.2]);
        (mean, covariance)
    }

    #[test]
    fn test_point_count_and_center() {
        let (mean, cov) = example_gaussian();
        let set = UnscentedQuadrature::default().sigma_points(&mean, &cov).unwrap();

        assert_eq!(set.len(), 7);
        for i in 0..3 {
            assert!((set.points()[0][i] - mean[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_mean_weights_sum_to_one() {
        let (mean, cov) = example_gaussian();
        let set = UnscentedQuadrature::default().sigma_points(&mean, &cov).unwrap();

        let total: f64 = (0..set.len()).map(|i| set.weight_mean(i)).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_identity_transform_recovers_moments() {
        let (mean, cov) = example_gaussian();
        let set = UnscentedQuadrature::default().sigma_points(&mean, &cov).unwrap();

        let transformed: Vec<DVector<f64>> = set.points().to_vec();
        let recovered_mean = set.mean_of(&transformed);
        let recovered_cov = set.covariance_of(&transformed, &recovered_mean);

        for i in 0..3 {
            assert!((recovered_mean[i] - mean[i]).abs() < 1e-9);
            for j in 0..3 {
                assert!(
                    (recovered_cov[(i, j)] - cov[(i, j)]).abs() < 1e-6,
                    "cov[{},{}]: {} vs {}",
                    i,
                    j,
                    recovered_cov[(i, j)],
                    cov[(i, j)]
                );
            }
        }
    }

    #[test]
    fn test_linear_transform_recovers_projected_moments() {
        let (mean, cov) = example_gaussian();
        let set = UnscentedQuadrature::default().sigma_points(&mean, &cov).unwrap();

        // y = M x for a 2x3 projection
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 2.0, 0.0, 1.0, -1.0]);
        let transformed: Vec<DVector<f64>> = set.points().iter().map(|p| &m * p).collect();

        let y_mean = set.mean_of(&transformed);
        let y_cov = set.covariance_of(&transformed, &y_mean);
        let cross = set.cross_covariance(&mean, &transformed, &y_mean);

        let expected_mean = &m * &mean;
        let expected_cov = &m * &cov * m.transpose();
        let expected_cross = &cov * m.transpose();

        for i in 0..2 {
            assert!((y_mean[i] - expected_mean[i]).abs() < 1e-9);
            for j in 0..2 {
                assert!((y_cov[(i, j)] - expected_cov[(i, j)]).abs() < 1e-6);
            }
        }
        for i in 0..3 {
            for j in 0..2 {
                assert!((cross[(i, j)] - expected_cross[(i, j)]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_indefinite_covariance_rejected() {
        let mean = DVector::zeros(2);
        let indefinite = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);

        let result = UnscentedQuadrature::default().sigma_points(&mean, &indefinite);
        assert!(matches!(result, Err(TrackError::DegenerateBelief { .. })));
    }
}
