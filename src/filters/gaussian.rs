//! Robust Multi-Sensor Gaussian Filter
//!
//! Gaussian filter over the object pose that treats every depth pixel as
//! its own sensor. The prediction is closed form through the linear
//! transition model. The update renders the scene once per sigma point,
//! statistically linearizes each pixel's rendered depth around the prior,
//! and folds the pixels in as sequential scalar corrections, each gated
//! by the body-tail mixture's responsibility so that occluded and outlier
//! pixels carry no weight.
//!
//! Reference: Issac, J., Wuthrich, M., Garcia Cifuentes, C., Bohg, J.,
//! Trimpe, S., & Schaal, S. (2016). "Depth-Based Object Tracking Using a
//! Robust Gaussian Filter"
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use depthtrack::prelude::*;
//!
//! // Track a 15 cm sphere one meter in front of a small depth camera.
//! let camera = CameraData::new(32, 32, 30.0, 30.0, 16.0, 16.0);
//! let renderer = Arc::new(SphereRenderer::single(0.15));
//!
//! let mut tracker = GaussianTrackerBuilder::new(
//!     renderer.as_ref(),
//!     BrownianTransitionBuilder::new().linear_sigma(0.05),
//!     DepthObservationModelBuilder::new(Arc::clone(&renderer), camera),
//! )
//! .build()
//! .unwrap();
//!
//! let mut pose = StateVector::zeros(6);
//! pose[2] = 1.0;
//! tracker.on_initialize(&[pose.clone()]).unwrap();
//!
//! let frame = renderer.render(&pose, &camera);
//! let estimate = tracker.on_track(&frame).unwrap();
//! assert!((estimate[2] - 1.0).abs() < 0.1);
//! ```

use std::sync::Arc;

use log::{debug, trace};
use nalgebra::DVector;

use crate::filters::quadrature::UnscentedQuadrature;
use crate::filters::Filter;
use crate::models::{LinearTransitionModel, PixelwiseObservationModel};
use crate::types::belief::GaussianBelief;
use crate::types::image::DepthImage;
use crate::types::state::{InputVector, StateVector};
use crate::utils::symmetrize;
use crate::{Result, TrackError};

/// Pixels whose body responsibility falls below this carry no correction.
const MIN_RESPONSIBILITY: f64 = 1e-12;

// ============================================================================
// Robust Gaussian Filter
// ============================================================================

/// Unscented Gaussian filter with a per-pixel robust observation update.
///
/// The belief is a single Gaussian over the pose state. Each `update`
/// renders the observation model at every sigma point, derives a scalar
/// pseudo-sensor per pixel from the rendered statistics, and applies the
/// pixels one after another. Ill-conditioned posterior covariances are
/// projected back to the positive semi-definite cone.
pub struct RobustGaussianFilter<T, O>
where
    T: LinearTransitionModel,
    O: PixelwiseObservationModel,
{
    transition: Arc<T>,
    observation: Arc<O>,
    quadrature: UnscentedQuadrature,
    belief: Option<GaussianBelief>,
}

impl<T, O> RobustGaussianFilter<T, O>
where
    T: LinearTransitionModel,
    O: PixelwiseObservationModel,
{
    /// Creates a robust Gaussian filter.
    ///
    /// # Arguments
    /// - `transition`: linear process model, shared with its builder
    /// - `observation`: pixelwise likelihood model, shared with its builder
    /// - `quadrature`: sigma point rule for the observation update
    ///
    /// # Errors
    /// Returns [`TrackError::DimensionMismatch`] when the models disagree
    /// on the state dimension.
    pub fn new(
        transition: Arc<T>,
        observation: Arc<O>,
        quadrature: UnscentedQuadrature,
    ) -> Result<Self> {
        if transition.state_dimension() != observation.state_dimension() {
            return Err(TrackError::DimensionMismatch {
                expected: transition.state_dimension(),
                actual: observation.state_dimension(),
                context: "observation model state dimension".into(),
            });
        }
        Ok(Self {
            transition,
            observation,
            quadrature,
            belief: None,
        })
    }

    /// The current Gaussian belief, if initialized.
    #[inline]
    pub fn belief(&self) -> Option<&GaussianBelief> {
        self.belief.as_ref()
    }

    fn belief_mut(&mut self) -> Result<&mut GaussianBelief> {
        self.belief.as_mut().ok_or_else(|| TrackError::Configuration {
            description: "filter has no belief, call initialize first".into(),
        })
    }
}

impl<T, O> Filter for RobustGaussianFilter<T, O>
where
    T: LinearTransitionModel,
    O: PixelwiseObservationModel,
{
    fn initialize(&mut self, states: &[StateVector]) -> Result<()> {
        for state in states {
            if state.len() != self.transition.state_dimension() {
                return Err(TrackError::DimensionMismatch {
                    expected: self.transition.state_dimension(),
                    actual: state.len(),
                    context: "initial state".into(),
                });
            }
        }
        // The process noise floors the fitted covariance so a single
        // candidate still yields a proper Gaussian.
        let floor = self.transition.noise_covariance();
        self.belief = Some(GaussianBelief::fit(states, &floor)?);
        trace!("initialized Gaussian belief from {} candidates", states.len());
        Ok(())
    }

    fn predict(&mut self, input: &InputVector) -> Result<()> {
        if input.len() != self.transition.input_dimension() {
            return Err(TrackError::DimensionMismatch {
                expected: self.transition.input_dimension(),
                actual: input.len(),
                context: "control input".into(),
            });
        }
        let transition_matrix = self.transition.transition_matrix();
        let input_matrix = self.transition.input_matrix();
        let noise_covariance = self.transition.noise_covariance();

        let belief = self.belief_mut()?;
        belief.mean = &transition_matrix * &belief.mean + &input_matrix * input;
        belief.covariance =
            &transition_matrix * &belief.covariance * transition_matrix.transpose()
                + noise_covariance;
        belief.symmetrize();
        Ok(())
    }

    fn update(&mut self, observation: &DepthImage) -> Result<()> {
        if observation.pixel_count() != self.observation.obsrv_dimension() {
            return Err(TrackError::DimensionMismatch {
                expected: self.observation.obsrv_dimension(),
                actual: observation.pixel_count(),
                context: "observation image".into(),
            });
        }

        let pixel_count = observation.pixel_count();
        let max_depth = self.observation.pixel_model().max_depth();
        let body_variance = self.observation.pixel_model().body_variance();
        let quadrature = self.quadrature;
        let observation_model = Arc::clone(&self.observation);

        let belief = self.belief_mut()?;
        belief.ensure_positive_semidefinite()?;
        let prior_mean = belief.mean.clone();
        let prior_covariance = belief.covariance.clone();

        let sigma_points = quadrature.sigma_points(&prior_mean, &prior_covariance)?;

        // Render once per sigma point. Rays that miss the object read as
        // the far end of the sensor range so the silhouette stays
        // informative.
        let rendered: Vec<DVector<f64>> = sigma_points
            .points()
            .iter()
            .map(|point| {
                let mut depths = observation_model.predict_obsrv(point).as_vector().clone();
                for value in depths.iter_mut() {
                    if !value.is_finite() {
                        *value = max_depth;
                    }
                }
                depths
            })
            .collect();

        // Per-pixel predicted statistics across the sigma points.
        let predicted_mean = sigma_points.mean_of(&rendered);
        let mut rendered_variance = DVector::<f64>::zeros(pixel_count);
        for (j, depths) in rendered.iter().enumerate() {
            let weight = sigma_points.weight_cov(j);
            for i in 0..pixel_count {
                let deviation = depths[i] - predicted_mean[i];
                rendered_variance[i] += weight * deviation * deviation;
            }
        }
        let cross_covariance =
            sigma_points.cross_covariance(&prior_mean, &rendered, &predicted_mean);

        // Statistical linearization: pixel i behaves as the scalar sensor
        // y_i = predicted_mean_i + h_i^T (x - prior_mean) + v_i with
        // h_i = P^-1 c_i and noise variance R_i = s_i - c_i^T h_i.
        let cholesky = prior_covariance
            .clone()
            .cholesky()
            .ok_or_else(|| TrackError::DegenerateBelief {
                description: "prior covariance is not positive definite".into(),
            })?;
        let gains = cholesky.solve(&cross_covariance);

        let mut mean = prior_mean.clone();
        let mut covariance = prior_covariance;
        let mut used_pixels = 0_usize;

        for i in 0..pixel_count {
            let observed = observation.depth(i);
            if !observed.is_finite() {
                continue;
            }
            let pixel_mean = predicted_mean[i];
            let pixel_variance = rendered_variance[i] + body_variance;
            if !pixel_mean.is_finite() || !pixel_variance.is_finite() {
                continue;
            }

            let responsibility = observation_model
                .pixel_model()
                .body_responsibility(pixel_mean, pixel_variance, observed);
            if responsibility < MIN_RESPONSIBILITY {
                continue;
            }

            let h = gains.column(i).into_owned();
            let noise_variance =
                (pixel_variance - cross_covariance.column(i).dot(&h)).max(1e-12);
            // Low responsibility inflates the pixel's noise, fading the
            // correction out instead of switching it off.
            let effective_noise = noise_variance / responsibility;

            let projected = &covariance * &h;
            let innovation_variance = h.dot(&projected) + effective_noise;
            if !(innovation_variance.is_finite() && innovation_variance > 0.0) {
                continue;
            }

            let predicted = pixel_mean + h.dot(&(&mean - &prior_mean));
            let innovation = observed - predicted;
            let gain = &projected / innovation_variance;
            mean += &gain * innovation;
            covariance -= &gain * projected.transpose();
            used_pixels += 1;
        }

        symmetrize(&mut covariance);
        belief.mean = mean;
        belief.covariance = covariance;
        belief.ensure_positive_semidefinite()?;

        debug!(
            "gaussian update used {} of {} pixels ({} valid)",
            used_pixels,
            pixel_count,
            observation.valid_count()
        );
        Ok(())
    }

    fn estimate(&self) -> Result<StateVector> {
        self.belief
            .as_ref()
            .map(|belief| belief.mean.clone())
            .ok_or_else(|| TrackError::Configuration {
                description: "filter has no belief, call initialize first".into(),
            })
    }

    fn state_dimension(&self) -> usize {
        self.transition.state_dimension()
    }

    fn input_dimension(&self) -> usize {
        self.transition.input_dimension()
    }
}

// ============================================================================
// Tests
// ============================================================================
