//! Observation (sensor) models scoring depth images against pose hypotheses
//!
//! An observation model renders a pose hypothesis through its
//! [`DepthRenderer`](crate::models::DepthRenderer) and scores the real
//! depth image with the per-pixel body/tail mixture. The particle filter
//! consumes batch log-likelihoods; the Gaussian filter additionally needs
//! pixel-level access through [`PixelwiseObservationModel`].

use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::models::pixel::BodyTailPixelModel;
use crate::models::renderer::DepthRenderer;
use crate::types::image::{CameraData, DepthImage};
use crate::types::state::{StateVector, POSE_BLOCK_SIZE};
use crate::{Result, TrackError};

/// Trait for observation models over depth images.
pub trait ObservationModel: Send + Sync {
    /// Dimension of the state this model expects.
    fn state_dimension(&self) -> usize;

    /// Pixels per observation.
    fn obsrv_dimension(&self) -> usize;

    /// Renders the predicted depth image for one pose hypothesis.
    fn predict_obsrv(&self, state: &StateVector) -> DepthImage;

    /// Log-likelihood of the observation under each pose hypothesis.
    ///
    /// # Errors
    /// Returns [`TrackError::DimensionMismatch`] when the observation's
    /// pixel count differs from `obsrv_dimension()`; the observation is
    /// never truncated or padded.
    fn loglikes(&self, states: &[StateVector], observation: &DepthImage) -> Result<Vec<f64>>;
}

/// Pixel-level access for moment-matching filters.
///
/// The Gaussian filter treats every pixel as an independent scalar sensor
/// and needs the mixture parameters behind the image likelihood.
pub trait PixelwiseObservationModel: ObservationModel {
    /// The per-pixel body/tail mixture.
    fn pixel_model(&self) -> &BodyTailPixelModel;
}

// ============================================================================
// Depth Observation Model
// ============================================================================

/// The default depth-image observation model: renderer plus per-pixel
/// body/tail mixture.
#[derive(Debug, Clone)]
pub struct DepthObservationModel<R: DepthRenderer> {
    renderer: Arc<R>,
    camera: CameraData,
    pixel_model: BodyTailPixelModel,
    state_dimension: usize,
}

impl<R: DepthRenderer> DepthObservationModel<R> {
    /// Creates a depth observation model.
    ///
    /// # Arguments
    /// - `renderer`: rendering service shared with the caller
    /// - `camera`: camera the observations come from
    /// - `pixel_model`: per-pixel likelihood mixture
    /// - `parts`: rigid part count (fixes the expected state dimension)
    ///
    /// # Panics
    /// Panics if `parts` is zero.
    pub fn new(
        renderer: Arc<R>,
        camera: CameraData,
        pixel_model: BodyTailPixelModel,
        parts: usize,
    ) -> Self {
        assert!(parts >= 1, "at least one part is required");
        Self {
            renderer,
            camera,
            pixel_model,
            state_dimension: parts * POSE_BLOCK_SIZE,
        }
    }

    /// The camera this model renders for.
    #[inline]
    pub fn camera(&self) -> &CameraData {
        &self.camera
    }

    /// Log-likelihood of the observation under one hypothesis: the sum of
    /// per-pixel mixture log densities.
    fn loglike_one(&self, state: &StateVector, observation: &DepthImage) -> f64 {
        let rendered = self.renderer.render(state, &self.camera);

        let mut loglike = 0.0;
        for i in 0..observation.pixel_count() {
            loglike += self
                .pixel_model
                .log_density(rendered.depth(i), observation.depth(i));
        }
        loglike
    }

    fn check_observation(&self, observation: &DepthImage) -> Result<()> {
        if observation.pixel_count() != self.obsrv_dimension() {
            return Err(TrackError::DimensionMismatch {
                expected: self.obsrv_dimension(),
                actual: observation.pixel_count(),
                context: "observation image".into(),
            });
        }
        Ok(())
    }
}

impl<R: DepthRenderer> ObservationModel for DepthObservationModel<R> {
    fn state_dimension(&self) -> usize {
        self.state_dimension
    }

    fn obsrv_dimension(&self) -> usize {
        self.camera.pixel_count()
    }

    fn predict_obsrv(&self, state: &StateVector) -> DepthImage {
        self.renderer.render(state, &self.camera)
    }

    fn loglikes(&self, states: &[StateVector], observation: &DepthImage) -> Result<Vec<f64>> {
        self.check_observation(observation)?;

        // Hypotheses are independent; rendering dominates the cost
        #[cfg(feature = "rayon")]
        {
            Ok(states
                .par_iter()
                .map(|state| self.loglike_one(state, observation))
                .collect())
        }

        #[cfg(not(feature = "rayon"))]
        {
            Ok(states
                .iter()
                .map(|state| self.loglike_one(state, observation))
                .collect())
        }
    }
}

impl<R: DepthRenderer> PixelwiseObservationModel for DepthObservationModel<R> {
    fn pixel_model(&self) -> &BodyTailPixelModel {
        &self.pixel_model
    }
}
