//! Coordinate Particle Filter
//!
//! Rao-Blackwellized particle filter for high dimensional states. The
//! prediction propagates every particle through the transition model at
//! once; the update then revisits the process noise one coordinate block
//! at a time, holding all other blocks fixed, and reweights against the
//! observation after each block. Marginalizing across blocks this way
//! keeps the required particle count far below what a joint sampler of
//! the same state dimension would need.
//!
//! Reference: Wuthrich, M., Bohg, J., Kappler, D., Pfreundt, C., &
//! Schaal, S. (2015). "The Coordinate Particle Filter - A novel Particle
//! Filter for High Dimensional Systems"
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
//! let mut tracker = ParticleTrackerBuilder::new(
//!     renderer.as_ref(),
//!     BrownianTransitionBuilder::new().linear_sigma(0.02),
//!     DepthObservationModelBuilder::new(Arc::clone(&renderer), camera),
//! )
//! .params(TrackerParams {
//!     evaluation_count: 30,
//!     ..TrackerParams::default()
//! })
//! .seed(1)
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

use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::filters::Filter;
use crate::models::{ObservationModel, TransitionModel};
use crate::types::belief::{Particle, ParticleBelief};
use crate::types::image::DepthImage;
use crate::types::state::{InputVector, NoiseVector, SamplingBlocks, StateVector};
use crate::utils::{
    kl_divergence, kl_to_uniform, normalize_log_weights, systematic_resample_indices,
};
use crate::{Result, TrackError};

/// Ceiling on adaptive growth, as a multiple of the configured count.
const MAX_GROWTH_FACTOR: usize = 8;

// ============================================================================
// Prediction Scratch
// ============================================================================

/// Per-particle data retained by `predict` so that `update` can redraw the
/// process noise block by block from the same prior states.
struct PredictScratch {
    prior_states: Vec<StateVector>,
    noises: Vec<NoiseVector>,
    input: InputVector,
}

// ============================================================================
// Coordinate Particle Filter
// ============================================================================

/// Block-coordinate particle filter over a weighted particle belief.
///
/// Each `update` pass walks the sampling blocks in order. For every block
/// it redraws that block's noise coordinates, re-propagates each particle
/// from its prior state, and reweights by the observation log-likelihood
/// relative to the baseline recorded at the last resample. Whenever the
/// weights drift too far from uniform (measured by KL divergence) the
/// belief is resampled systematically.
///
/// After a pass the filter compares the posterior weights against the
/// weights that entered the pass and adapts the evaluation count for the
/// next step: a large shift doubles the count (up to a ceiling), a small
/// one halves it (down to the configured base).
pub struct CoordinateParticleFilter<T, O>
where
    T: TransitionModel,
    O: ObservationModel,
{
    transition: Arc<T>,
    observation: Arc<O>,
    sampling_blocks: SamplingBlocks,
    belief: ParticleBelief,
    rng: StdRng,
    base_evaluation_count: usize,
    evaluation_count: usize,
    max_kl_divergence: f64,
    recover_on_degeneracy: bool,
    scratch: Option<PredictScratch>,
}

impl<T, O> CoordinateParticleFilter<T, O>
where
    T: TransitionModel,
    O: ObservationModel,
{
    /// Creates a coordinate particle filter.
    ///
    /// # Arguments
    /// - `transition`: process model, shared with the builder that made it
    /// - `observation`: likelihood model, shared with the builder that made it
    /// - `sampling_blocks`: partition of the transition noise dimensions
    /// - `evaluation_count`: particle count after resampling, at least one
    /// - `max_kl_divergence`: weight concentration threshold, finite and
    ///   non-negative
    /// - `rng`: seedable generator driving noise draws and resampling
    ///
    /// # Errors
    /// Returns [`TrackError::Configuration`] for an invalid count, an
    /// invalid threshold, or sampling blocks that do not tile the noise
    /// dimension, and [`TrackError::DimensionMismatch`] when the models
    /// disagree on the state dimension.
    pub fn new(
        transition: Arc<T>,
        observation: Arc<O>,
        sampling_blocks: SamplingBlocks,
        evaluation_count: usize,
        max_kl_divergence: f64,
        rng: StdRng,
    ) -> Result<Self> {
        if evaluation_count == 0 {
            return Err(TrackError::Configuration {
                description: "evaluation count must be at least one".into(),
            });
        }
        if !max_kl_divergence.is_finite() || max_kl_divergence < 0.0 {
            return Err(TrackError::Configuration {
                description: format!(
                    "max KL divergence must be finite and non-negative, got {}",
                    max_kl_divergence
                ),
            });
        }
        if sampling_blocks.state_dimension() != transition.noise_dimension() {
            return Err(TrackError::Configuration {
                description: format!(
                    "sampling blocks cover {} noise dimensions but the transition model has {}",
                    sampling_blocks.state_dimension(),
                    transition.noise_dimension()
                ),
            });
        }
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
            sampling_blocks,
            belief: ParticleBelief::empty(),
            rng,
            base_evaluation_count: evaluation_count,
            evaluation_count,
            max_kl_divergence,
            recover_on_degeneracy: true,
            scratch: None,
        })
    }

    /// The current particle belief.
    #[inline]
    pub fn belief(&self) -> &ParticleBelief {
        &self.belief
    }

    /// The evaluation count the next resampling will target.
    #[inline]
    pub fn evaluation_count(&self) -> usize {
        self.evaluation_count
    }

    /// Chooses what happens when every particle weight underflows.
    ///
    /// When enabled (the default) the filter resets the weights to uniform
    /// and keeps tracking; when disabled, a degenerate pass returns
    /// [`TrackError::DegenerateBelief`].
    pub fn set_recover_on_degeneracy(&mut self, enabled: bool) {
        self.recover_on_degeneracy = enabled;
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.belief.is_empty() {
            return Err(TrackError::Configuration {
                description: "filter has no belief, call initialize first".into(),
            });
        }
        Ok(())
    }

    fn standard_noise(&mut self, dimension: usize) -> NoiseVector {
        let mut noise = NoiseVector::zeros(dimension);
        for value in noise.iter_mut() {
            *value = self.rng.sample::<f64, _>(StandardNormal);
        }
        noise
    }

    /// Grows or shrinks the evaluation count from the weight shift of one
    /// update pass.
    fn adapt_evaluation_count(&mut self, divergence: f64) {
        let ceiling = self.base_evaluation_count * MAX_GROWTH_FACTOR;
        if divergence > self.max_kl_divergence && self.evaluation_count < ceiling {
            self.evaluation_count = (self.evaluation_count * 2).min(ceiling);
            debug!(
                "weights shifted by {:.3} nats, raising evaluation count to {}",
                divergence, self.evaluation_count
            );
        } else if divergence < 0.25 * self.max_kl_divergence
            && self.evaluation_count > self.base_evaluation_count
        {
            self.evaluation_count = (self.evaluation_count / 2).max(self.base_evaluation_count);
            debug!(
                "weights shifted by {:.3} nats, lowering evaluation count to {}",
                divergence, self.evaluation_count
            );
        }
    }
}

fn select<V: Clone>(values: &[V], indices: &[usize]) -> Vec<V> {
    indices.iter().map(|&i| values[i].clone()).collect()
}

impl<T, O> Filter for CoordinateParticleFilter<T, O>
where
    T: TransitionModel,
    O: ObservationModel,
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
        self.belief = ParticleBelief::from_states(states, self.evaluation_count)?;
        self.scratch = None;
        trace!(
            "initialized particle belief with {} particles from {} candidates",
            self.belief.len(),
            states.len()
        );
        Ok(())
    }

    fn predict(&mut self, input: &InputVector) -> Result<()> {
        self.ensure_initialized()?;
        if input.len() != self.transition.input_dimension() {
            return Err(TrackError::DimensionMismatch {
                expected: self.transition.input_dimension(),
                actual: input.len(),
                context: "control input".into(),
            });
        }

        let noise_dimension = self.transition.noise_dimension();
        let prior_states = self.belief.states();
        let log_weights = self.belief.log_weights();

        let mut noises = Vec::with_capacity(prior_states.len());
        let mut particles = Vec::with_capacity(prior_states.len());
        for (state, log_weight) in prior_states.iter().zip(log_weights) {
            let noise = self.standard_noise(noise_dimension);
            let propagated = self.transition.sample(state, &noise, input);
            particles.push(Particle::new(propagated, log_weight));
            noises.push(noise);
        }
        // Weights are untouched; prediction only moves the states.
        self.belief.set_particles(particles)?;
        self.scratch = Some(PredictScratch {
            prior_states,
            noises,
            input: input.clone(),
        });
        Ok(())
    }

    fn update(&mut self, observation: &DepthImage) -> Result<()> {
        self.ensure_initialized()?;

        let noise_dimension = self.transition.noise_dimension();
        let count = self.belief.len();

        // Without a preceding predict the pass starts from the current
        // states with zero noise, which folds prediction and update into
        // the same block sweep.
        let (mut prior_states, mut noises, input) = match self.scratch.take() {
            Some(scratch) => (scratch.prior_states, scratch.noises, scratch.input),
            None => (
                self.belief.states(),
                vec![NoiseVector::zeros(noise_dimension); count],
                InputVector::zeros(self.transition.input_dimension()),
            ),
        };

        let mut states = self.belief.states();
        let mut log_weights = self.belief.log_weights();
        let mut resample_count = 0_usize;
        // Resampling resets the weights to uniform, so the shift has to be
        // sampled at each resample point as well as at the end of the pass.
        let mut pass_divergence = 0.0_f64;

        // Weights entering the pass, carried through resampling ancestry so
        // the posterior can be compared against them afterwards.
        let mut pre_weights = match normalize_log_weights(&log_weights) {
            Some(weights) => weights,
            None => {
                if !self.recover_on_degeneracy {
                    return Err(TrackError::DegenerateBelief {
                        description: "particle weights are not normalizable".into(),
                    });
                }
                warn!("particle weights degenerate before update, resetting to uniform");
                log_weights = vec![0.0; count];
                vec![1.0 / count as f64; count]
            }
        };

        // Every block reweights against the baseline taken at the start of
        // the pass or at the last resample. The baseline log-likelihoods
        // are finite, so a rejected hypothesis gets a minus infinity log
        // weight rather than a NaN, and dies at the next resample.
        let mut base_log_weights = log_weights.clone();
        let mut base_loglikes = vec![0.0; count];

        for block_index in 0..self.sampling_blocks.count() {
            for i in 0..states.len() {
                for &dim in self.sampling_blocks.block(block_index) {
                    noises[i][dim] = self.rng.sample::<f64, _>(StandardNormal);
                }
                states[i] = self.transition.sample(&prior_states[i], &noises[i], &input);
            }

            let loglikes = self.observation.loglikes(&states, observation)?;
            for i in 0..states.len() {
                log_weights[i] = base_log_weights[i] + loglikes[i] - base_loglikes[i];
            }

            let weights = match normalize_log_weights(&log_weights) {
                Some(weights) => weights,
                None => {
                    if !self.recover_on_degeneracy {
                        return Err(TrackError::DegenerateBelief {
                            description: format!(
                                "all particle weights underflowed in block {}",
                                block_index
                            ),
                        });
                    }
                    warn!(
                        "all particle weights underflowed in block {}, resetting to uniform",
                        block_index
                    );
                    log_weights = vec![0.0; states.len()];
                    base_log_weights = vec![0.0; states.len()];
                    base_loglikes = vec![0.0; states.len()];
                    continue;
                }
            };

            if kl_to_uniform(&weights) > self.max_kl_divergence {
                pass_divergence = pass_divergence.max(kl_divergence(&weights, &pre_weights));
                let indices =
                    systematic_resample_indices(&weights, self.evaluation_count, &mut self.rng);
                states = select(&states, &indices);
                prior_states = select(&prior_states, &indices);
                noises = select(&noises, &indices);
                // Survivors carry positive weight, so their block
                // log-likelihoods are finite and can serve as the next
                // baseline.
                base_loglikes = select(&loglikes, &indices);
                pre_weights = select(&pre_weights, &indices);
                let total: f64 = pre_weights.iter().sum();
                if total > 0.0 {
                    for weight in pre_weights.iter_mut() {
                        *weight /= total;
                    }
                } else {
                    pre_weights = vec![1.0 / indices.len() as f64; indices.len()];
                }
                log_weights = vec![0.0; indices.len()];
                base_log_weights = vec![0.0; indices.len()];
                resample_count += 1;
                trace!(
                    "block {}: resampled to {} particles",
                    block_index,
                    indices.len()
                );
            }
        }

        let particles = states
            .into_iter()
            .zip(log_weights.iter().copied())
            .map(|(state, log_weight)| Particle::new(state, log_weight))
            .collect();
        self.belief.set_particles(particles)?;

        let post_weights = match self.belief.normalized_weights() {
            Some(weights) => weights,
            None => {
                if !self.recover_on_degeneracy {
                    return Err(TrackError::DegenerateBelief {
                        description: "particle weights degenerate after update".into(),
                    });
                }
                warn!("particle weights degenerate after update, resetting to uniform");
                self.belief.reset_weights();
                return Ok(());
            }
        };

        let divergence = pass_divergence.max(kl_divergence(&post_weights, &pre_weights));
        debug!(
            "update pass over {} blocks: {} particles, {} resamples, weight shift {:.3} nats",
            self.sampling_blocks.count(),
            self.belief.len(),
            resample_count,
            divergence
        );
        self.adapt_evaluation_count(divergence);
        Ok(())
    }

    fn estimate(&self) -> Result<StateVector> {
        // Highest-weight particle; the weighted mean blurs across modes
        // when the belief is multi-modal.
        self.belief
            .mode()
            .map(|particle| particle.state.clone())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BrownianPoseTransition;
    use crate::types::state::POSE_BLOCK_SIZE;
    use rand::SeedableRng;

    /// Likelihood peaked around a target state, with the sharpness read
    /// from pixel 0 of the observation.
    struct NearTargetObservation {
        target: StateVector,
    }

    impl ObservationModel for NearTargetObservation {
        fn state_dimension(&self) -> usize {
            self.target.len()
        }

        fn obsrv_dimension(&self) -> usize {
            1
        }

        fn predict_obsrv(&self, _state: &StateVector) -> DepthImage {
            DepthImage::from_fn(1, 1, |_, _| 1.0)
        }

        fn loglikes(
            &self,
            states: &[StateVector],
            observation: &DepthImage,
        ) -> Result<Vec<f64>> {
            let scale = observation.depth(0);
            Ok(states
                .iter()
                .map(|state| -scale * (state - &self.target).norm_squared())
                .collect())
        }
    }

    /// Likelihood that rejects any hypothesis whose second pose block has
    /// drifted and accepts everything else with likelihood one.
    struct SecondPartGateObservation {
        dimension: usize,
    }

    impl ObservationModel for SecondPartGateObservation {
        fn state_dimension(&self) -> usize {
            self.dimension
        }

        fn obsrv_dimension(&self) -> usize {
            1
        }

        fn predict_obsrv(&self, _state: &StateVector) -> DepthImage {
            DepthImage::from_fn(1, 1, |_, _| 1.0)
        }

        fn loglikes(
            &self,
            states: &[StateVector],
            _observation: &DepthImage,
        ) -> Result<Vec<f64>> {
            Ok(states
                .iter()
                .map(|state| {
                    if state[POSE_BLOCK_SIZE] > 0.5 {
                        f64::NEG_INFINITY
                    } else {
                        0.0
                    }
                })
                .collect())
        }
    }

    /// Likelihood that rejects every hypothesis outright.
    struct RejectAllObservation {
        dimension: usize,
    }

    impl ObservationModel for RejectAllObservation {
        fn state_dimension(&self) -> usize {
            self.dimension
        }

        fn obsrv_dimension(&self) -> usize {
            1
        }

        fn predict_obsrv(&self, _state: &StateVector) -> DepthImage {
            DepthImage::from_fn(1, 1, |_, _| 1.0)
        }

        fn loglikes(
            &self,
            states: &[StateVector],
            _observation: &DepthImage,
        ) -> Result<Vec<f64>> {
            Ok(vec![f64::NEG_INFINITY; states.len()])
        }
    }

    fn sharpness_image(scale: f64) -> DepthImage {
        DepthImage::from_fn(1, 1, move |_, _| scale)
    }

    fn target_state() -> StateVector {
        StateVector::from_row_slice(&[0.4, -0.2, 1.0, 0.0, 0.1, 0.0])
    }

    fn spread_candidates(target: &StateVector, count: usize) -> Vec<StateVector> {
        (0..count)
            .map(|i| {
                let offset = -1.5 + 3.0 * (i as f64) / (count as f64 - 1.0);
                let mut state = target.clone();
                state[0] += offset;
                state[1] -= 0.5 * offset;
                state
            })
            .collect()
    }

    fn near_target_filter(
        linear_sigma: f64,
        evaluation_count: usize,
        max_kl_divergence: f64,
    ) -> CoordinateParticleFilter<BrownianPoseTransition, NearTargetObservation> {
        let transition = Arc::new(BrownianPoseTransition::new(1, linear_sigma, linear_sigma));
        let observation = Arc::new(NearTargetObservation {
            target: target_state(),
        });
        let blocks = SamplingBlocks::tile(1, transition.noise_dimension()).unwrap();
        CoordinateParticleFilter::new(
            transition,
            observation,
            blocks,
            evaluation_count,
            max_kl_divergence,
            StdRng::seed_from_u64(7),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_zero_evaluation_count() {
        let transition = Arc::new(BrownianPoseTransition::new(1, 0.1, 0.1));
        let observation = Arc::new(NearTargetObservation {
            target: target_state(),
        });
        let blocks = SamplingBlocks::tile(1, POSE_BLOCK_SIZE).unwrap();

        let result = CoordinateParticleFilter::new(
            transition,
            observation,
            blocks,
            0,
            2.0,
            StdRng::seed_from_u64(0),
        );
        assert!(matches!(result, Err(TrackError::Configuration { .. })));
    }

    #[test]
    fn test_new_rejects_mismatched_blocks() {
        let transition = Arc::new(BrownianPoseTransition::new(2, 0.1, 0.1));
        let observation = Arc::new(NearTargetObservation {
            target: StateVector::zeros(2 * POSE_BLOCK_SIZE),
        });
        // One block of six indices cannot cover a twelve dimensional noise.
        let blocks = SamplingBlocks::tile(1, POSE_BLOCK_SIZE).unwrap();

        let result = CoordinateParticleFilter::new(
            transition,
            observation,
            blocks,
            10,
            2.0,
            StdRng::seed_from_u64(0),
        );
        assert!(matches!(result, Err(TrackError::Configuration { .. })));
    }

    #[test]
    fn test_update_before_initialize_fails() {
        let mut filter = near_target_filter(0.1, 10, 2.0);
        let result = filter.update(&sharpness_image(1.0));
        assert!(matches!(result, Err(TrackError::Configuration { .. })));
    }

    #[test]
    fn test_initialize_rejects_wrong_state_dimension() {
        let mut filter = near_target_filter(0.1, 10, 2.0);
        let result = filter.initialize(&[StateVector::zeros(4)]);
        assert!(matches!(result, Err(TrackError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_predict_preserves_weights() {
        let mut filter = near_target_filter(0.0, 16, 1e3);
        let candidates = spread_candidates(&target_state(), 16);
        filter.initialize(&candidates).unwrap();

        // Skew the weights first so invariance is meaningful.
        filter.update(&sharpness_image(2.0)).unwrap();
        let weights_before = filter.belief().log_weights();
        let states_before = filter.belief().states();

        let input = InputVector::from_element(POSE_BLOCK_SIZE, 0.25);
        filter.predict(&input).unwrap();

        let weights_after = filter.belief().log_weights();
        let states_after = filter.belief().states();
        for (before, after) in weights_before.iter().zip(weights_after.iter()) {
            assert!((before - after).abs() < 1e-15, "weights must not change");
        }
        // Zero process noise, so states move by exactly the input.
        for (before, after) in states_before.iter().zip(states_after.iter()) {
            for d in 0..POSE_BLOCK_SIZE {
                assert!((after[d] - before[d] - 0.25).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_predict_rejects_wrong_input_dimension() {
        let mut filter = near_target_filter(0.1, 10, 2.0);
        filter
            .initialize(&spread_candidates(&target_state(), 10))
            .unwrap();

        let result = filter.predict(&InputVector::zeros(3));
        assert!(matches!(result, Err(TrackError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_update_concentrates_weight_near_target() {
        let mut filter = near_target_filter(0.02, 30, 1e3);
        let target = target_state();
        filter.initialize(&spread_candidates(&target, 30)).unwrap();

        for _ in 0..4 {
            filter.update(&sharpness_image(50.0)).unwrap();
        }

        let weights = filter.belief().normalized_weights().unwrap();
        let states = filter.belief().states();
        let near_mass: f64 = weights
            .iter()
            .zip(states.iter())
            .filter(|(_, state)| (*state - &target).norm() < 0.5)
            .map(|(weight, _)| weight)
            .sum();
        assert!(
            near_mass >= 0.95,
            "mass near target should dominate, got {}",
            near_mass
        );

        let estimate = filter.estimate().unwrap();
        assert!((estimate - target).norm() < 0.5);
    }

    #[test]
    fn test_concentrated_weights_trigger_resampling() {
        let mut filter = near_target_filter(0.02, 20, 0.5);
        filter
            .initialize(&spread_candidates(&target_state(), 20))
            .unwrap();

        filter.update(&sharpness_image(100.0)).unwrap();

        // A sharp likelihood forces at least one systematic resample, after
        // which the surviving particles cluster near the target.
        let states = filter.belief().states();
        let target = target_state();
        let near = states
            .iter()
            .filter(|state| (*state - &target).norm() < 0.5)
            .count();
        assert!(near * 2 > states.len(), "resampling should favor the mode");
    }

    #[test]
    fn test_adaptive_count_grows_then_recovers() {
        let mut filter = near_target_filter(0.02, 20, 0.5);
        filter
            .initialize(&spread_candidates(&target_state(), 20))
            .unwrap();

        // Sharp observation: posterior far from the entering weights.
        filter.update(&sharpness_image(100.0)).unwrap();
        assert!(filter.evaluation_count() > 20);

        // Flat observations: weights stop moving and the count decays back.
        for _ in 0..8 {
            filter.update(&sharpness_image(0.0)).unwrap();
        }
        assert_eq!(filter.evaluation_count(), 20);
    }

    #[test]
    fn test_adaptive_count_honors_ceiling() {
        let mut filter = near_target_filter(0.02, 4, 0.05);
        filter
            .initialize(&spread_candidates(&target_state(), 4))
            .unwrap();

        for _ in 0..12 {
            filter.update(&sharpness_image(100.0)).unwrap();
        }
        assert!(filter.evaluation_count() <= 4 * MAX_GROWTH_FACTOR);
    }

    #[test]
    fn test_rejected_particle_loses_weight_without_degenerating() {
        // Two part object, two blocks: one hypothesis sits inside the
        // gate, one outside. The outside hypothesis is rejected in every
        // block, but the belief as a whole is healthy, so the update must
        // hand the surviving particle the full weight instead of taking
        // the degeneracy branch.
        let transition = Arc::new(BrownianPoseTransition::new(2, 0.01, 0.01));
        let observation = Arc::new(SecondPartGateObservation {
            dimension: 2 * POSE_BLOCK_SIZE,
        });
        let blocks = SamplingBlocks::tile(2, transition.noise_dimension()).unwrap();
        let mut filter = CoordinateParticleFilter::new(
            transition,
            observation,
            blocks,
            2,
            1e3,
            StdRng::seed_from_u64(21),
        )
        .unwrap();
        filter.set_recover_on_degeneracy(false);

        let inside = StateVector::zeros(2 * POSE_BLOCK_SIZE);
        let mut outside = StateVector::zeros(2 * POSE_BLOCK_SIZE);
        outside[POSE_BLOCK_SIZE] = 1.0;
        filter.initialize(&[inside, outside]).unwrap();

        // Two consecutive updates, so the minus infinity weight left by
        // the first pass also enters the second pass cleanly.
        for _ in 0..2 {
            filter.update(&sharpness_image(1.0)).unwrap();

            let weights = filter.belief().normalized_weights().unwrap();
            assert!(
                (weights[0] - 1.0).abs() < 1e-12,
                "surviving particle should hold all mass, got {}",
                weights[0]
            );
            assert!(weights[1].abs() < 1e-12);
        }

        let estimate = filter.estimate().unwrap();
        assert!(estimate[POSE_BLOCK_SIZE] < 0.5);
    }

    #[test]
    fn test_degenerate_update_recovers_with_uniform_weights() {
        let transition = Arc::new(BrownianPoseTransition::new(1, 0.1, 0.1));
        let observation = Arc::new(RejectAllObservation {
            dimension: POSE_BLOCK_SIZE,
        });
        let blocks = SamplingBlocks::tile(1, transition.noise_dimension()).unwrap();
        let mut filter = CoordinateParticleFilter::new(
            transition,
            observation,
            blocks,
            8,
            2.0,
            StdRng::seed_from_u64(3),
        )
        .unwrap();
        filter
            .initialize(&[StateVector::zeros(POSE_BLOCK_SIZE)])
            .unwrap();

        filter.update(&sharpness_image(1.0)).unwrap();

        let weights = filter.belief().normalized_weights().unwrap();
        for weight in weights {
            assert!((weight - 1.0 / 8.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_degenerate_update_fails_when_recovery_disabled() {
        let transition = Arc::new(BrownianPoseTransition::new(1, 0.1, 0.1));
        let observation = Arc::new(RejectAllObservation {
            dimension: POSE_BLOCK_SIZE,
        });
        let blocks = SamplingBlocks::tile(1, transition.noise_dimension()).unwrap();
        let mut filter = CoordinateParticleFilter::new(
            transition,
            observation,
            blocks,
            8,
            2.0,
            StdRng::seed_from_u64(3),
        )
        .unwrap();
        filter.set_recover_on_degeneracy(false);
        filter
            .initialize(&[StateVector::zeros(POSE_BLOCK_SIZE)])
            .unwrap();

        let result = filter.update(&sharpness_image(1.0));
        assert!(matches!(result, Err(TrackError::DegenerateBelief { .. })));
    }

    #[test]
    fn test_estimate_returns_highest_weight_particle() {
        let mut filter = near_target_filter(0.0, 8, 1e3);
        let target = target_state();
        filter.initialize(&spread_candidates(&target, 8)).unwrap();
        filter.update(&sharpness_image(10.0)).unwrap();

        let estimate = filter.estimate().unwrap();
        let weights = filter.belief().normalized_weights().unwrap();
        let states = filter.belief().states();
        let best = weights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert!((estimate - &states[best]).norm() < 1e-12);
    }
}
