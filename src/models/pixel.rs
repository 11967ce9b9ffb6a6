//! Per-pixel body/tail likelihood mixture
//!
//! Each depth pixel is scored by a two-component mixture: a "body"
//! Gaussian centered on the rendered surface depth, and a "tail" uniform
//! over the sensor's depth range that absorbs occlusion, background and
//! sensor outliers. The tail keeps single mismatched pixels from vetoing
//! an otherwise good pose hypothesis.

use std::f64::consts::PI;

use crate::utils::log_sum_exp;

/// Log density of a scalar normal distribution with the given variance.
#[inline]
fn normal_log_pdf(x: f64, mean: f64, variance: f64) -> f64 {
    let diff = x - mean;
    -0.5 * ((2.0 * PI * variance).ln() + diff * diff / variance)
}

/// Robust per-pixel depth likelihood:
/// p(z | rendered) = (1 - w) * N(z; rendered, sigma^2) + w * U(z; range).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyTailPixelModel {
    body_sigma: f64,
    tail_weight: f64,
    min_depth: f64,
    max_depth: f64,
}

impl BodyTailPixelModel {
    /// Creates a pixel model.
    ///
    /// # Arguments
    /// - `body_sigma`: depth noise std around the rendered surface (must be > 0)
    /// - `tail_weight`: prior mass of the outlier component (must be in [0, 1])
    /// - `min_depth`, `max_depth`: sensor depth range for the uniform tail
    ///
    /// # Panics
    /// Panics if `body_sigma <= 0`, `tail_weight` is outside [0, 1], or the
    /// depth range is empty.
    pub fn new(body_sigma: f64, tail_weight: f64, min_depth: f64, max_depth: f64) -> Self {
        assert!(body_sigma > 0.0, "body sigma must be positive");
        assert!(
            (0.0..=1.0).contains(&tail_weight),
            "tail weight must be in [0, 1]"
        );
        assert!(max_depth > min_depth, "depth range must be non-empty");
        Self {
            body_sigma,
            tail_weight,
            min_depth,
            max_depth,
        }
    }

    /// Variance of the body component.
    #[inline]
    pub fn body_variance(&self) -> f64 {
        self.body_sigma * self.body_sigma
    }

    /// Prior mass of the tail component.
    #[inline]
    pub fn tail_weight(&self) -> f64 {
        self.tail_weight
    }

    /// Near end of the sensor's measurable range.
    #[inline]
    pub fn min_depth(&self) -> f64 {
        self.min_depth
    }

    /// Far end of the sensor's measurable range.
    #[inline]
    pub fn max_depth(&self) -> f64 {
        self.max_depth
    }

    /// Log density of the uniform tail at an observed depth.
    #[inline]
    pub fn tail_log_density(&self, observed: f64) -> f64 {
        if observed >= self.min_depth && observed <= self.max_depth {
            -(self.max_depth - self.min_depth).ln()
        } else {
            f64::NEG_INFINITY
        }
    }

    /// Log likelihood of an observed depth given the rendered depth.
    ///
    /// An invalid observation contributes nothing (log likelihood 0); a
    /// pixel the object does not cover is scored by the tail alone.
    pub fn log_density(&self, rendered: f64, observed: f64) -> f64 {
        if !observed.is_finite() {
            return 0.0;
        }
        if !rendered.is_finite() {
            return self.tail_log_density(observed);
        }

        let log_body =
            (1.0 - self.tail_weight).ln() + normal_log_pdf(observed, rendered, self.body_variance());
        let log_tail = self.tail_weight.ln() + self.tail_log_density(observed);
        log_sum_exp(&[log_body, log_tail])
    }

    /// Posterior probability that an observed depth came from the body
    /// component, given the predicted pixel moments.
    ///
    /// `predicted_var` is the full predicted variance at the pixel (the
    /// propagated state uncertainty plus the body variance). Returns 0 for
    /// invalid observations or a non-finite prediction, so such pixels
    /// contribute no correction.
    pub fn body_responsibility(
        &self,
        predicted_mean: f64,
        predicted_var: f64,
        observed: f64,
    ) -> f64 {
        if !observed.is_finite() || !predicted_mean.is_finite() || predicted_var <= 0.0 {
            return 0.0;
        }

        let log_body =
            (1.0 - self.tail_weight).ln() + normal_log_pdf(observed, predicted_mean, predicted_var);
        let log_tail = self.tail_weight.ln() + self.tail_log_density(observed);
        let log_total = log_sum_exp(&[log_body, log_tail]);
        if !log_total.is_finite() {
            return 0.0;
        }

        (log_body - log_total).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> BodyTailPixelModel {
        BodyTailPixelModel::new(0.02, 0.1, 0.2, 5.0)
    }

    #[test]
    fn test_matching_depth_beats_mismatch() {
        let m = model();

        let near = m.log_density(1.0, 1.005);
        let far = m.log_density(1.0, 1.5);
        assert!(near > far);
    }

    #[test]
    fn test_tail_floors_outlier_likelihood() {
        let m = model();

        // Even a gross mismatch keeps at least the tail mass
        let outlier = m.log_density(1.0, 4.0);
        let floor = m.tail_weight().ln() + m.tail_log_density(4.0);
        assert!(outlier >= floor - 1e-12);
        assert!(outlier.is_finite());
    }

    #[test]
    fn test_invalid_observation_contributes_nothing() {
        let m = model();

        assert!(m.log_density(1.0, f64::NAN).abs() < 1e-12);
    }

    #[test]
    fn test_uncovered_pixel_scored_by_tail() {
        let m = model();

        let expected = m.tail_log_density(2.0);
        assert!((m.log_density(f64::NAN, 2.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_observation_body_only() {
        let m = model();

        // Tail density is zero outside the range; the body term remains
        let score = m.log_density(6.0, 6.0);
        let body_only = (1.0 - m.tail_weight()).ln() + normal_log_pdf(6.0, 6.0, m.body_variance());
        assert!((score - body_only).abs() < 1e-9);
    }

    #[test]
    fn test_responsibility_high_on_surface() {
        let m = model();
        let var = m.body_variance();

        let resp = m.body_responsibility(1.0, var, 1.0);
        assert!(resp > 0.95, "responsibility {}", resp);
    }

    #[test]
    fn test_responsibility_low_for_outlier() {
        let m = model();
        let var = m.body_variance();

        let resp = m.body_responsibility(1.0, var, 3.5);
        assert!(resp < 0.05, "responsibility {}", resp);
    }

    #[test]
    fn test_responsibility_zero_for_invalid_inputs() {
        let m = model();

        assert!(m.body_responsibility(1.0, m.body_variance(), f64::NAN).abs() < 1e-12);
        assert!(m.body_responsibility(f64::NAN, m.body_variance(), 1.0).abs() < 1e-12);
        assert!(m.body_responsibility(1.0, 0.0, 1.0).abs() < 1e-12);
    }
}
