//! Depth-image pose filters
//!
//! Recursive Bayesian filters over a rigid object's pose.
//!
//! # Filters
//!
//! - [`coordinate::CoordinateParticleFilter`]: Rao-Blackwellized particle
//!   filter sampling one coordinate block at a time
//! - [`gaussian::RobustGaussianFilter`]: unscented Gaussian filter with a
//!   per-pixel robust observation update
//!
//! Both run through the [`Filter`] trait, so trackers and builders stay
//! agnostic of the belief representation.

pub mod coordinate;
pub mod gaussian;
pub mod quadrature;

use crate::types::image::DepthImage;
use crate::types::state::{InputVector, StateVector};
use crate::Result;

/// One recursive Bayesian filtering pipeline.
///
/// The call sequence is `initialize` once, then any number of
/// `predict`/`update` cycles. An `update` without a preceding `predict`
/// folds the prediction into the same pass.
pub trait Filter {
    /// Seeds the belief from candidate states.
    ///
    /// # Errors
    /// Returns [`crate::TrackError::DimensionMismatch`] when a candidate
    /// does not match the state dimension and
    /// [`crate::TrackError::Configuration`] when no candidate is given.
    fn initialize(&mut self, states: &[StateVector]) -> Result<()>;

    /// Propagates the belief through the transition model.
    ///
    /// # Errors
    /// Returns [`crate::TrackError::Configuration`] before `initialize`
    /// and [`crate::TrackError::DimensionMismatch`] for a wrongly sized
    /// input.
    fn predict(&mut self, input: &InputVector) -> Result<()>;

    /// Folds one depth image into the belief.
    ///
    /// # Errors
    /// Returns [`crate::TrackError::Configuration`] before `initialize`,
    /// [`crate::TrackError::DimensionMismatch`] for a wrongly shaped
    /// image, and [`crate::TrackError::DegenerateBelief`] when the belief
    /// collapses and recovery is disabled.
    fn update(&mut self, observation: &DepthImage) -> Result<()>;

    /// The current point estimate of the state.
    ///
    /// # Errors
    /// Returns [`crate::TrackError::Configuration`] before `initialize`.
    fn estimate(&self) -> Result<StateVector>;

    /// Dimension of the state vector.
    fn state_dimension(&self) -> usize;

    /// Dimension of the control input vector.
    fn input_dimension(&self) -> usize;
}
