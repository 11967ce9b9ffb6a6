//! Tracker and model builders
//!
//! Composition layer wiring transition models, observation models,
//! sampling blocks and a filter into a ready [`Tracker`]. All parameter
//! validation surfaces here, before any tracking starts.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::filters::coordinate::CoordinateParticleFilter;
use crate::filters::gaussian::RobustGaussianFilter;
use crate::filters::quadrature::UnscentedQuadrature;
use crate::models::{
    BodyTailPixelModel, BrownianPoseTransition, DepthObservationModel, DepthRenderer,
    LinearTransitionModel, ObjectModel, ObservationModel, PixelwiseObservationModel,
    TransitionModel,
};
use crate::tracker::Tracker;
use crate::types::image::CameraData;
use crate::types::state::SamplingBlocks;
use crate::{Result, TrackError};

// ============================================================================
// Tracker Parameters
// ============================================================================

/// Shared tracker configuration.
#[derive(Debug, Clone, Copy)]
pub struct TrackerParams {
    /// Particle count targeted by resampling, at least one. Consumed by
    /// the particle pipeline.
    pub evaluation_count: usize,
    /// Share of each new estimate entering the moving average, in (0, 1].
    pub moving_average_update_rate: f64,
    /// Weight shift threshold driving resampling and the adaptive
    /// evaluation count, finite and non-negative.
    pub max_kl_divergence: f64,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            evaluation_count: 100,
            moving_average_update_rate: 0.5,
            max_kl_divergence: 3.0,
        }
    }
}

impl TrackerParams {
    /// Checks every field against its allowed range.
    ///
    /// # Errors
    /// Returns [`TrackError::Configuration`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.evaluation_count == 0 {
            return Err(TrackError::Configuration {
                description: "evaluation count must be at least one".into(),
            });
        }
        if !(self.moving_average_update_rate > 0.0 && self.moving_average_update_rate <= 1.0) {
            return Err(TrackError::Configuration {
                description: format!(
                    "moving average update rate must lie in (0, 1], got {}",
                    self.moving_average_update_rate
                ),
            });
        }
        if !self.max_kl_divergence.is_finite() || self.max_kl_divergence < 0.0 {
            return Err(TrackError::Configuration {
                description: format!(
                    "max KL divergence must be finite and non-negative, got {}",
                    self.max_kl_divergence
                ),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Model Builder Traits
// ============================================================================

/// Builds a transition model instance.
pub trait TransitionModelBuilder {
    /// The model type this builder produces.
    type Model: TransitionModel;

    /// Validates the configuration and builds the model.
    ///
    /// # Errors
    /// Returns [`TrackError::Configuration`] for invalid parameters.
    fn build(&self) -> Result<Self::Model>;
}

/// Builds an observation model instance.
pub trait ObservationModelBuilder {
    /// The model type this builder produces.
    type Model: ObservationModel;

    /// Validates the configuration and builds the model.
    ///
    /// # Errors
    /// Returns [`TrackError::Configuration`] for invalid parameters and
    /// [`TrackError::UnsupportedCapability`] for an unavailable model
    /// capability.
    fn build(&self) -> Result<Self::Model>;
}

// ============================================================================
// Brownian Transition Builder
// ============================================================================

/// Builder for the Brownian pose transition model.
#[derive(Debug, Clone)]
pub struct BrownianTransitionBuilder {
    parts: usize,
    linear_sigma: f64,
    angular_sigma: f64,
}

impl BrownianTransitionBuilder {
    /// Starts from one part with mild per-step noise.
    pub fn new() -> Self {
        Self {
            parts: 1,
            linear_sigma: 0.01,
            angular_sigma: 0.02,
        }
    }

    /// Number of independently moving parts.
    pub fn parts(mut self, parts: usize) -> Self {
        self.parts = parts;
        self
    }

    /// Per-step standard deviation of the position random walk, in meters.
    pub fn linear_sigma(mut self, sigma: f64) -> Self {
        self.linear_sigma = sigma;
        self
    }

    /// Per-step standard deviation of the orientation random walk, in
    /// radians.
    pub fn angular_sigma(mut self, sigma: f64) -> Self {
        self.angular_sigma = sigma;
        self
    }
}

impl Default for BrownianTransitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionModelBuilder for BrownianTransitionBuilder {
    type Model = BrownianPoseTransition;

    fn build(&self) -> Result<Self::Model> {
        if self.parts == 0 {
            return Err(TrackError::Configuration {
                description: "transition model needs at least one part".into(),
            });
        }
        for (name, sigma) in [("linear", self.linear_sigma), ("angular", self.angular_sigma)] {
            if !sigma.is_finite() || sigma < 0.0 {
                return Err(TrackError::Configuration {
                    description: format!(
                        "{} sigma must be finite and non-negative, got {}",
                        name, sigma
                    ),
                });
            }
        }
        Ok(BrownianPoseTransition::new(
            self.parts,
            self.linear_sigma,
            self.angular_sigma,
        ))
    }
}

// ============================================================================
// Depth Observation Builder
// ============================================================================

/// Builder for the body-tail depth observation model.
///
/// Carries an explicit GPU capability pair: `use_gpu` states what the
/// caller wants, `gpu_available` states what the supplied renderer can
/// do. Requesting GPU evaluation without the capability fails at build
/// time instead of falling back silently.
pub struct DepthObservationModelBuilder<R> {
    renderer: Arc<R>,
    camera: CameraData,
    parts: usize,
    body_sigma: f64,
    tail_weight: f64,
    min_depth: f64,
    max_depth: f64,
    use_gpu: bool,
    gpu_available: bool,
}

impl<R: DepthRenderer> DepthObservationModelBuilder<R> {
    /// Starts from a renderer and camera with single-part defaults.
    pub fn new(renderer: Arc<R>, camera: CameraData) -> Self {
        Self {
            renderer,
            camera,
            parts: 1,
            body_sigma: 0.01,
            tail_weight: 0.05,
            min_depth: 0.4,
            max_depth: 4.0,
            use_gpu: false,
            gpu_available: false,
        }
    }

    /// Number of independently posed parts in the state.
    pub fn parts(mut self, parts: usize) -> Self {
        self.parts = parts;
        self
    }

    /// Standard deviation of the body component around the rendered
    /// depth, in meters.
    pub fn body_sigma(mut self, sigma: f64) -> Self {
        self.body_sigma = sigma;
        self
    }

    /// Prior mass of the uniform tail component.
    pub fn tail_weight(mut self, weight: f64) -> Self {
        self.tail_weight = weight;
        self
    }

    /// Measurable sensor range in meters.
    pub fn depth_range(mut self, min_depth: f64, max_depth: f64) -> Self {
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        self
    }

    /// Requests GPU likelihood evaluation.
    pub fn use_gpu(mut self, use_gpu: bool) -> Self {
        self.use_gpu = use_gpu;
        self
    }

    /// Declares that the supplied renderer is GPU resident.
    pub fn gpu_available(mut self, available: bool) -> Self {
        self.gpu_available = available;
        self
    }
}

impl<R> Clone for DepthObservationModelBuilder<R> {
    fn clone(&self) -> Self {
        Self {
            renderer: Arc::clone(&self.renderer),
            camera: self.camera,
            parts: self.parts,
            body_sigma: self.body_sigma,
            tail_weight: self.tail_weight,
            min_depth: self.min_depth,
            max_depth: self.max_depth,
            use_gpu: self.use_gpu,
            gpu_available: self.gpu_available,
        }
    }
}

impl<R: DepthRenderer> ObservationModelBuilder for DepthObservationModelBuilder<R> {
    type Model = DepthObservationModel<R>;

    fn build(&self) -> Result<Self::Model> {
        if self.use_gpu && !self.gpu_available {
            return Err(TrackError::UnsupportedCapability {
                capability: "gpu depth likelihood evaluation".into(),
            });
        }
        if self.parts == 0 {
            return Err(TrackError::Configuration {
                description: "observation model needs at least one part".into(),
            });
        }
        if !self.body_sigma.is_finite() || self.body_sigma <= 0.0 {
            return Err(TrackError::Configuration {
                description: format!(
                    "body sigma must be finite and positive, got {}",
                    self.body_sigma
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.tail_weight) {
            return Err(TrackError::Configuration {
                description: format!("tail weight must lie in [0, 1], got {}", self.tail_weight),
            });
        }
        if !(self.min_depth.is_finite()
            && self.max_depth.is_finite()
            && self.min_depth > 0.0
            && self.max_depth > self.min_depth)
        {
            return Err(TrackError::Configuration {
                description: format!(
                    "depth range must satisfy 0 < min < max, got [{}, {}]",
                    self.min_depth, self.max_depth
                ),
            });
        }

        let pixel_model = BodyTailPixelModel::new(
            self.body_sigma,
            self.tail_weight,
            self.min_depth,
            self.max_depth,
        );
        Ok(DepthObservationModel::new(
            Arc::clone(&self.renderer),
            self.camera,
            pixel_model,
            self.parts,
        ))
    }
}

// ============================================================================
// Particle Tracker Builder
// ============================================================================

/// Builds a [`Tracker`] around a coordinate particle filter.
pub struct ParticleTrackerBuilder<TB, OB> {
    transition_builder: TB,
    observation_builder: OB,
    object_parts: usize,
    params: TrackerParams,
    seed: Option<u64>,
}

impl<TB, OB> ParticleTrackerBuilder<TB, OB>
where
    TB: TransitionModelBuilder,
    OB: ObservationModelBuilder,
{
    /// Starts from an object model and the two model builders.
    pub fn new(object: &impl ObjectModel, transition_builder: TB, observation_builder: OB) -> Self {
        Self {
            transition_builder,
            observation_builder,
            object_parts: object.count_parts(),
            params: TrackerParams::default(),
            seed: None,
        }
    }

    /// Overrides the tracker parameters.
    pub fn params(mut self, params: TrackerParams) -> Self {
        self.params = params;
        self
    }

    /// Fixes the random seed for reproducible runs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builds models, sampling blocks, filter and tracker.
    ///
    /// # Errors
    /// Returns [`TrackError::Configuration`] for invalid parameters or a
    /// part count that does not tile the transition noise dimension, and
    /// propagates the model builders' errors.
    pub fn build(self) -> Result<Tracker<CoordinateParticleFilter<TB::Model, OB::Model>>> {
        self.params.validate()?;
        let transition = Arc::new(self.transition_builder.build()?);
        let observation = Arc::new(self.observation_builder.build()?);
        let blocks = SamplingBlocks::tile(self.object_parts, transition.noise_dimension())?;
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let filter = CoordinateParticleFilter::new(
            transition,
            observation,
            blocks,
            self.params.evaluation_count,
            self.params.max_kl_divergence,
            rng,
        )?;
        Tracker::new(filter, self.params.moving_average_update_rate)
    }
}

// ============================================================================
// Gaussian Tracker Builder
// ============================================================================

/// Builds a [`Tracker`] around the robust Gaussian filter.
pub struct GaussianTrackerBuilder<TB, OB> {
    transition_builder: TB,
    observation_builder: OB,
    object_parts: usize,
    params: TrackerParams,
    quadrature: UnscentedQuadrature,
}

impl<TB, OB> GaussianTrackerBuilder<TB, OB>
where
    TB: TransitionModelBuilder,
    TB::Model: LinearTransitionModel,
    OB: ObservationModelBuilder,
    OB::Model: PixelwiseObservationModel,
{
    /// Starts from an object model and the two model builders.
    pub fn new(object: &impl ObjectModel, transition_builder: TB, observation_builder: OB) -> Self {
        Self {
            transition_builder,
            observation_builder,
            object_parts: object.count_parts(),
            params: TrackerParams::default(),
            quadrature: UnscentedQuadrature::default(),
        }
    }

    /// Overrides the tracker parameters. The Gaussian pipeline consumes
    /// the smoothing rate; the remaining fields are validated uniformly.
    pub fn params(mut self, params: TrackerParams) -> Self {
        self.params = params;
        self
    }

    /// Overrides the sigma point rule.
    pub fn quadrature(mut self, quadrature: UnscentedQuadrature) -> Self {
        self.quadrature = quadrature;
        self
    }

    /// Builds models, filter and tracker.
    ///
    /// # Errors
    /// Returns [`TrackError::Configuration`] for invalid parameters or a
    /// part count that does not divide the state dimension, and
    /// propagates the model builders' errors.
    pub fn build(self) -> Result<Tracker<RobustGaussianFilter<TB::Model, OB::Model>>> {
        self.params.validate()?;
        let transition = Arc::new(self.transition_builder.build()?);
        let observation = Arc::new(self.observation_builder.build()?);
        if self.object_parts == 0 || transition.state_dimension() % self.object_parts != 0 {
            return Err(TrackError::Configuration {
                description: format!(
                    "{} object parts cannot tile a state of dimension {}",
                    self.object_parts,
                    transition.state_dimension()
                ),
            });
        }
        let filter = RobustGaussianFilter::new(transition, observation, self.quadrature)?;
        Tracker::new(filter, self.params.moving_average_update_rate)
    }
}

// ============================================================================
// Tests
// ============================================================================
