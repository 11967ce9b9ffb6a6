//! Object tracker front end
//!
//! Wraps a [`Filter`] in the step-per-observation interface a camera
//! loop calls into: seed once with candidate poses, then feed one depth
//! image at a time and read back a smoothed pose estimate.

mod builder;

pub use builder::*;

use log::trace;

use crate::filters::Filter;
use crate::types::image::DepthImage;
use crate::types::state::{InputVector, StateVector};
use crate::{Result, TrackError};

// ============================================================================
// Tracker
// ============================================================================

/// Single-object tracker around one filtering pipeline.
///
/// The tracker owns its filter exclusively. Raw per-step estimates are
/// blended into an exponential moving average to suppress frame-to-frame
/// jitter; an update rate of one disables the smoothing.
pub struct Tracker<F: Filter> {
    filter: F,
    moving_average: Option<StateVector>,
    update_rate: f64,
}

impl<F: Filter> Tracker<F> {
    /// Creates a tracker around a filter.
    ///
    /// # Arguments
    /// - `filter`: the filtering pipeline to drive
    /// - `moving_average_update_rate`: smoothing rate in (0, 1], the
    ///   share of each new estimate entering the moving average
    ///
    /// # Errors
    /// Returns [`TrackError::Configuration`] for a rate outside (0, 1].
    pub fn new(filter: F, moving_average_update_rate: f64) -> Result<Self> {
        if !(moving_average_update_rate > 0.0 && moving_average_update_rate <= 1.0) {
            return Err(TrackError::Configuration {
                description: format!(
                    "moving average update rate must lie in (0, 1], got {}",
                    moving_average_update_rate
                ),
            });
        }
        Ok(Self {
            filter,
            moving_average: None,
            update_rate: moving_average_update_rate,
        })
    }

    /// The wrapped filter.
    #[inline]
    pub fn filter(&self) -> &F {
        &self.filter
    }

    /// Mutable access to the wrapped filter.
    #[inline]
    pub fn filter_mut(&mut self) -> &mut F {
        &mut self.filter
    }

    /// The most recent smoothed estimate, if any.
    #[inline]
    pub fn current_estimate(&self) -> Option<&StateVector> {
        self.moving_average.as_ref()
    }

    /// Seeds the filter belief from candidate poses and returns the
    /// initial estimate.
    ///
    /// # Errors
    /// Propagates the filter's `initialize` and `estimate` errors.
    pub fn on_initialize(&mut self, initial_states: &[StateVector]) -> Result<StateVector> {
        self.filter.initialize(initial_states)?;
        let estimate = self.filter.estimate()?;
        self.moving_average = Some(estimate.clone());
        trace!("tracker initialized from {} candidates", initial_states.len());
        Ok(estimate)
    }

    /// Advances the tracker by one depth image without control input.
    ///
    /// # Errors
    /// Returns [`TrackError::Configuration`] before `on_initialize`, and
    /// propagates the filter's step errors.
    pub fn on_track(&mut self, observation: &DepthImage) -> Result<StateVector> {
        let input = InputVector::zeros(self.filter.input_dimension());
        self.on_track_with_input(observation, &input)
    }

    /// Advances the tracker by one depth image and control input.
    ///
    /// Runs one predict and update cycle on the filter, then blends the
    /// raw estimate into the moving average. Orientation components are
    /// blended componentwise in their axis-angle form.
    ///
    /// # Errors
    /// Returns [`TrackError::Configuration`] before `on_initialize`, and
    /// propagates the filter's step errors.
    pub fn on_track_with_input(
        &mut self,
        observation: &DepthImage,
        input: &InputVector,
    ) -> Result<StateVector> {
        let smoothed = self
            .moving_average
            .as_ref()
            .ok_or_else(|| TrackError::Configuration {
                description: "tracker has no belief, call on_initialize first".into(),
            })?
            .clone();

        self.filter.predict(input)?;
        self.filter.update(observation)?;
        let estimate = self.filter.estimate()?;

        let smoothed = smoothed * (1.0 - self.update_rate) + &estimate * self.update_rate;
        self.moving_average = Some(smoothed.clone());
        Ok(smoothed)
    }
}

// ============================================================================
// Tests
// ============================================================================
