//! Transition (motion) models for object pose dynamics
//!
//! Describes how object pose evolves from one observation to the next.

use nalgebra::DMatrix;

use crate::types::state::{InputVector, NoiseVector, StateVector, POSE_BLOCK_SIZE};

/// Trait for stochastic state-evolution models.
///
/// Describes object dynamics in the form:
/// x_{k+1} = f(x_k, w_k, u_k)
///
/// where:
/// - w_k is a standard-normal noise vector of `noise_dimension()` entries
/// - u_k is a control input of `input_dimension()` entries
///
/// The noise vector is consumed per call and never retained, so redrawing a
/// subset of its coordinates and re-sampling from the same prior state
/// yields a conditional redraw of that coordinate block.
pub trait TransitionModel: Send + Sync {
    /// Dimension of the state vector.
    fn state_dimension(&self) -> usize;

    /// Dimension of the noise vector `sample` consumes.
    fn noise_dimension(&self) -> usize;

    /// Dimension of the control input `sample` consumes.
    fn input_dimension(&self) -> usize;

    /// Draws the next state given the previous state, a standard-normal
    /// noise vector and a control input.
    fn sample(&self, state: &StateVector, noise: &NoiseVector, input: &InputVector)
        -> StateVector;
}

/// Trait for transition models that are linear in state, input and noise:
///
/// x_{k+1} = A * x_k + B * u_k + w,  w ~ N(0, Q)
///
/// Required by the Gaussian filter's closed-form prediction.
pub trait LinearTransitionModel: TransitionModel {
    /// The state transition matrix A.
    fn transition_matrix(&self) -> DMatrix<f64>;

    /// The input matrix B.
    fn input_matrix(&self) -> DMatrix<f64>;

    /// The process noise covariance Q.
    fn noise_covariance(&self) -> DMatrix<f64>;
}

// ============================================================================
// Brownian Pose Transition
// ============================================================================

/// Brownian pose motion per rigid part.
///
/// Each 6-dof pose block follows
/// x' = x + u + L * w
/// with L diagonal: the first three coordinates of every block (translation)
/// get `linear_sigma`, the last three (orientation) get `angular_sigma`.
/// The input is a commanded per-step pose delta.
///
/// Sigmas are per observation step; the model carries no explicit time step.
#[derive(Debug, Clone)]
pub struct BrownianPoseTransition {
    parts: usize,
    /// Per-step translation noise std in meters
    pub linear_sigma: f64,
    /// Per-step orientation noise std in radians
    pub angular_sigma: f64,
}

impl BrownianPoseTransition {
    /// Creates a Brownian pose model for `parts` rigid parts.
    ///
    /// # Arguments
    /// - `parts`: number of tracked parts (must be >= 1)
    /// - `linear_sigma`: per-step translation noise std (must be >= 0)
    /// - `angular_sigma`: per-step orientation noise std (must be >= 0)
    ///
    /// # Panics
    /// Panics if `parts` is zero or a sigma is negative. Zero sigmas are
    /// allowed and make the model deterministic.
    pub fn new(parts: usize, linear_sigma: f64, angular_sigma: f64) -> Self {
        assert!(parts >= 1, "at least one part is required");
        assert!(linear_sigma >= 0.0, "linear sigma must be non-negative");
        assert!(angular_sigma >= 0.0, "angular sigma must be non-negative");
        Self {
            parts,
            linear_sigma,
            angular_sigma,
        }
    }

    /// Noise std for one state dimension.
    #[inline]
    fn sigma_for(&self, dim: usize) -> f64 {
        if dim % POSE_BLOCK_SIZE < 3 {
            self.linear_sigma
        } else {
            self.angular_sigma
        }
    }
}

impl TransitionModel for BrownianPoseTransition {
    fn state_dimension(&self) -> usize {
        self.parts * POSE_BLOCK_SIZE
    }

    fn noise_dimension(&self) -> usize {
        self.parts * POSE_BLOCK_SIZE
    }

    fn input_dimension(&self) -> usize {
        self.parts * POSE_BLOCK_SIZE
    }

    fn sample(
        &self,
        state: &StateVector,
        noise: &NoiseVector,
        input: &InputVector,
    ) -> StateVector {
        assert_eq!(state.len(), self.state_dimension(), "state dimension");
        assert_eq!(noise.len(), self.noise_dimension(), "noise dimension");
        assert_eq!(input.len(), self.input_dimension(), "input dimension");

        let mut next = state + input;
        for dim in 0..next.len() {
            next[dim] += self.sigma_for(dim) * noise[dim];
        }
        next
    }
}

impl LinearTransitionModel for BrownianPoseTransition {
    fn transition_matrix(&self) -> DMatrix<f64> {
        DMatrix::identity(self.state_dimension(), self.state_dimension())
    }

    fn input_matrix(&self) -> DMatrix<f64> {
        DMatrix::identity(self.state_dimension(), self.input_dimension())
    }

    fn noise_covariance(&self) -> DMatrix<f64> {
        let dim = self.state_dimension();
        DMatrix::from_fn(dim, dim, |r, c| {
            if r == c {
                let sigma = self.sigma_for(r);
                sigma * sigma
            } else {
                0.0
            }
        })
    }
}
