//! Numerical helpers shared by the filters
//!
//! Log-domain weight arithmetic, KL divergences for resampling decisions,
//! and covariance conditioning.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::Rng;

/// Computes log(sum(exp(values))) without overflow.
///
/// Returns negative infinity for an empty slice or when every entry is
/// negative infinity.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max_val.is_finite() {
        return f64::NEG_INFINITY;
    }

    let sum: f64 = values.iter().map(|v| (v - max_val).exp()).sum();
    max_val + sum.ln()
}

/// Converts log weights to normalized linear weights.
///
/// Returns `None` when the weights carry no probability mass (all entries
/// underflow to negative infinity, or any entry is NaN), so callers can
/// apply their degeneracy policy instead of propagating NaN.
pub fn normalize_log_weights(log_weights: &[f64]) -> Option<Vec<f64>> {
    if log_weights.iter().any(|w| w.is_nan()) {
        return None;
    }

    let log_sum = log_sum_exp(log_weights);
    if !log_sum.is_finite() {
        return None;
    }

    Some(log_weights.iter().map(|w| (w - log_sum).exp()).collect())
}

/// KL divergence from a normalized weight vector to the uniform distribution.
///
/// KL(w || u) = ln(n) + sum(w_i * ln(w_i)), with 0 * ln(0) taken as 0.
/// Ranges from 0 (uniform) to ln(n) (all mass on one particle).
pub fn kl_to_uniform(weights: &[f64]) -> f64 {
    if weights.is_empty() {
        return 0.0;
    }

    let n = weights.len() as f64;
    let entropy_term: f64 = weights
        .iter()
        .filter(|&&w| w > 0.0)
        .map(|&w| w * w.ln())
        .sum();

    (n.ln() + entropy_term).max(0.0)
}

/// KL divergence between two normalized weight vectors over the same support.
///
/// KL(p || q) = sum(p_i * ln(p_i / q_i)). Terms with p_i = 0 contribute
/// nothing; a term with p_i > 0 and q_i = 0 makes the divergence infinite.
///
/// # Panics
/// Panics if the vectors have different lengths.
pub fn kl_divergence(p: &[f64], q: &[f64]) -> f64 {
    assert_eq!(p.len(), q.len(), "KL divergence requires equal supports");

    let mut kl = 0.0;
    for (&pi, &qi) in p.iter().zip(q.iter()) {
        if pi <= 0.0 {
            continue;
        }
        if qi <= 0.0 {
            return f64::INFINITY;
        }
        kl += pi * (pi / qi).ln();
    }
    kl.max(0.0)
}

/// Draws resampling indices with the systematic (low-variance) scheme.
///
/// A single uniform offset is stratified across `count` evenly spaced
/// positions on the cumulative weight distribution, so particles with
/// weight above 1/count are kept with certainty.
///
/// # Arguments
/// - `weights`: normalized particle weights
/// - `count`: number of indices to draw (the post-resampling particle count)
pub fn systematic_resample_indices(
    weights: &[f64],
    count: usize,
    rng: &mut StdRng,
) -> Vec<usize> {
    let n = weights.len();
    let mut indices = Vec::with_capacity(count);
    if n == 0 || count == 0 {
        return indices;
    }

    let step = 1.0 / count as f64;
    let mut position = rng.gen_range(0.0..step);
    let mut cumulative = weights[0];
    let mut i = 0;

    for _ in 0..count {
        while position > cumulative && i + 1 < n {
            i += 1;
            cumulative += weights[i];
        }
        indices.push(i);
        position += step;
    }

    indices
}

/// Symmetrizes a matrix by averaging with its transpose.
pub fn symmetrize(matrix: &mut DMatrix<f64>) {
    let transposed = matrix.transpose();
    *matrix += transposed;
    *matrix *= 0.5;
}

/// Checks positive definiteness via Cholesky decomposition.
pub fn is_positive_definite(matrix: &DMatrix<f64>) -> bool {
    matrix.clone().cholesky().is_some()
}

/// Projects a symmetric matrix onto the nearest positive semi-definite
/// matrix by clamping negative eigenvalues.
///
/// Returns `None` when the matrix contains non-finite entries, which no
/// projection can repair.
pub fn nearest_psd(matrix: &DMatrix<f64>, floor: f64) -> Option<DMatrix<f64>> {
    if matrix.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let eigen = matrix.clone().symmetric_eigen();
    let clamped = eigen.eigenvalues.map(|v| v.max(floor));
    let reconstructed =
        &eigen.eigenvectors * DMatrix::from_diagonal(&clamped) * eigen.eigenvectors.transpose();

    Some(reconstructed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_log_sum_exp_matches_direct_sum() {
        let values: [f64; 3] = [-1.0, -2.0, -3.0];
        let direct: f64 = values.iter().map(|v| v.exp()).sum();

        assert!((log_sum_exp(&values) - direct.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_log_sum_exp_handles_large_magnitudes() {
        // Direct exponentiation would overflow here
        let values = [1000.0, 1000.0];

        assert!((log_sum_exp(&values) - (1000.0 + 2.0_f64.ln())).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_log_weights_sums_to_one() {
        let log_weights = [0.0, -1.0, -2.0, -0.5];
        let weights = normalize_log_weights(&log_weights).unwrap();

        let sum: f64 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!(weights.iter().all(|&w| w > 0.0));
    }

    #[test]
    fn test_normalize_log_weights_detects_underflow() {
        let log_weights = [f64::NEG_INFINITY, f64::NEG_INFINITY];

        assert!(normalize_log_weights(&log_weights).is_none());
    }

    #[test]
    fn test_kl_to_uniform_zero_for_uniform() {
        let weights = [0.25; 4];

        assert!(kl_to_uniform(&weights).abs() < 1e-12);
    }

    #[test]
    fn test_kl_to_uniform_max_for_degenerate() {
        // All mass on one particle gives KL = ln(n)
        let weights = [1.0, 0.0, 0.0, 0.0];

        assert!((kl_to_uniform(&weights) - 4.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_kl_divergence_zero_for_identical() {
        let p = [0.1, 0.2, 0.3, 0.4];

        assert!(kl_divergence(&p, &p).abs() < 1e-12);
    }

    #[test]
    fn test_kl_divergence_infinite_for_missing_support() {
        let p = [0.5, 0.5];
        let q = [1.0, 0.0];

        assert!(kl_divergence(&p, &q).is_infinite());
    }

    #[test]
    fn test_systematic_resample_respects_weights() {
        let mut rng = StdRng::seed_from_u64(7);
        // Third particle holds 90% of the mass
        let weights = [0.05, 0.05, 0.9];
        let indices = systematic_resample_indices(&weights, 100, &mut rng);

        assert_eq!(indices.len(), 100);
        let third_count = indices.iter().filter(|&&i| i == 2).count();
        assert!(third_count >= 85, "expected >= 85 copies, got {}", third_count);
    }

    #[test]
    fn test_systematic_resample_uniform_keeps_all() {
        let mut rng = StdRng::seed_from_u64(3);
        let weights = [0.25; 4];
        let indices = systematic_resample_indices(&weights, 4, &mut rng);

        // Uniform weights with matching count keep one copy of each particle
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_symmetrize() {
        let mut m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 4.0, 3.0]);
        symmetrize(&mut m);

        assert!((m[(0, 1)] - 3.0).abs() < 1e-12);
        assert!((m[(1, 0)] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_nearest_psd_clamps_negative_eigenvalues() {
        // Symmetric matrix with eigenvalues 3 and -1
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(!is_positive_definite(&m));

        let projected = nearest_psd(&m, 1e-9).unwrap();
        assert!(is_positive_definite(&projected));
    }

    #[test]
    fn test_nearest_psd_rejects_non_finite() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, f64::NAN, 1.0]);

        assert!(nearest_psd(&m, 0.0).is_none());
    }
}
