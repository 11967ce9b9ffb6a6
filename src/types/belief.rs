//! Belief representations over object state
//!
//! A filter's belief is either a weighted particle set or a Gaussian given
//! by its first two moments. Both expose a point estimate and the
//! bookkeeping the filters need to keep their invariants: particle weights
//! stay finite and normalizable, Gaussian covariances stay symmetric
//! positive semi-definite.

use std::cmp::Ordering;

use nalgebra::{DMatrix, DVector};

use crate::types::state::StateVector;
use crate::utils::{is_positive_definite, nearest_psd, normalize_log_weights, symmetrize};
use crate::{Result, TrackError};

// ============================================================================
// Particle Belief
// ============================================================================

/// One weighted state hypothesis.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// Pose hypothesis
    pub state: StateVector,
    /// Unnormalized log weight
    pub log_weight: f64,
}

impl Particle {
    /// Creates a particle with the given state and log weight.
    #[inline]
    pub fn new(state: StateVector, log_weight: f64) -> Self {
        Self { state, log_weight }
    }
}

/// A particle-set belief: ordered (state, log-weight) pairs.
///
/// Log weights are unnormalized; [`ParticleBelief::normalized_weights`]
/// produces the linear distribution on demand and reports degeneracy
/// instead of emitting NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleBelief {
    particles: Vec<Particle>,
}

impl ParticleBelief {
    /// Creates an empty belief, to be seeded later via a filter's
    /// `initialize`.
    pub fn empty() -> Self {
        Self {
            particles: Vec::new(),
        }
    }

    /// Seeds `count` equally weighted particles from candidate states,
    /// replicated round-robin.
    ///
    /// # Errors
    /// Returns [`TrackError::Configuration`] when no candidates are given or
    /// `count` is zero, and [`TrackError::DimensionMismatch`] when the
    /// candidates disagree on dimension.
    pub fn from_states(states: &[StateVector], count: usize) -> Result<Self> {
        if states.is_empty() {
            return Err(TrackError::Configuration {
                description: "particle belief requires at least one candidate state".into(),
            });
        }
        if count == 0 {
            return Err(TrackError::Configuration {
                description: "particle belief requires a positive particle count".into(),
            });
        }

        let dim = states[0].len();
        for state in states.iter().skip(1) {
            if state.len() != dim {
                return Err(TrackError::DimensionMismatch {
                    expected: dim,
                    actual: state.len(),
                    context: "candidate state".into(),
                });
            }
        }

        let particles = (0..count)
            .map(|i| Particle::new(states[i % states.len()].clone(), 0.0))
            .collect();

        Ok(Self { particles })
    }

    /// Number of particles.
    #[inline]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Whether the belief holds no particles yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// State dimension, or 0 for an empty belief.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.particles.first().map_or(0, |p| p.state.len())
    }

    /// The particles in order.
    #[inline]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Clones the particle states into a batch for likelihood evaluation.
    pub fn states(&self) -> Vec<StateVector> {
        self.particles.iter().map(|p| p.state.clone()).collect()
    }

    /// The unnormalized log weights in particle order.
    pub fn log_weights(&self) -> Vec<f64> {
        self.particles.iter().map(|p| p.log_weight).collect()
    }

    /// Replaces the particle set.
    ///
    /// # Errors
    /// Returns [`TrackError::Configuration`] for an empty replacement and
    /// [`TrackError::DimensionMismatch`] when particle dimensions disagree.
    pub fn set_particles(&mut self, particles: Vec<Particle>) -> Result<()> {
        if particles.is_empty() {
            return Err(TrackError::Configuration {
                description: "cannot replace belief with an empty particle set".into(),
            });
        }
        let dim = particles[0].state.len();
        for p in particles.iter().skip(1) {
            if p.state.len() != dim {
                return Err(TrackError::DimensionMismatch {
                    expected: dim,
                    actual: p.state.len(),
                    context: "replacement particle".into(),
                });
            }
        }

        self.particles = particles;
        Ok(())
    }

    /// Resets every particle to the same weight.
    pub fn reset_weights(&mut self) {
        for p in &mut self.particles {
            p.log_weight = 0.0;
        }
    }

    /// Normalized linear weights, or `None` when the weights carry no
    /// probability mass (degenerate belief).
    pub fn normalized_weights(&self) -> Option<Vec<f64>> {
        if self.particles.is_empty() {
            return None;
        }
        normalize_log_weights(&self.log_weights())
    }

    /// Effective sample size 1 / sum(w_i^2), between 1 and the particle
    /// count. Returns 0 for a degenerate belief.
    pub fn effective_sample_size(&self) -> f64 {
        match self.normalized_weights() {
            Some(weights) => {
                let sum_sq: f64 = weights.iter().map(|w| w * w).sum();
                if sum_sq > 0.0 {
                    1.0 / sum_sq
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    /// The highest-weight particle, the point-estimate policy of this
    /// library: robust when the belief is multi-modal.
    pub fn mode(&self) -> Option<&Particle> {
        self.particles.iter().max_by(|a, b| {
            a.log_weight
                .partial_cmp(&b.log_weight)
                .unwrap_or(Ordering::Less)
        })
    }

    /// The weighted mean state, or `None` for an empty or degenerate
    /// belief.
    pub fn weighted_mean(&self) -> Option<StateVector> {
        let weights = self.normalized_weights()?;
        let mut mean = DVector::zeros(self.dimension());
        for (p, w) in self.particles.iter().zip(weights.iter()) {
            mean += &p.state * *w;
        }
        Some(mean)
    }
}

// ============================================================================
// Gaussian Belief
// ============================================================================

/// A Gaussian belief: mean and covariance over the full state.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianBelief {
    /// Mean state
    pub mean: StateVector,
    /// State covariance, kept symmetric positive semi-definite
    pub covariance: DMatrix<f64>,
}

impl GaussianBelief {
    /// Creates a Gaussian belief.
    ///
    /// # Errors
    /// Returns [`TrackError::DimensionMismatch`] when the covariance is not
    /// square with the mean's dimension.
    pub fn new(mean: StateVector, covariance: DMatrix<f64>) -> Result<Self> {
        let dim = mean.len();
        if covariance.nrows() != dim || covariance.ncols() != dim {
            return Err(TrackError::DimensionMismatch {
                expected: dim,
                actual: covariance.nrows().max(covariance.ncols()),
                context: "belief covariance".into(),
            });
        }

        Ok(Self { mean, covariance })
    }

    /// Fits a Gaussian to candidate states: sample mean plus scatter, with
    /// `floor` added so a single candidate still yields usable spread.
    ///
    /// # Errors
    /// Returns [`TrackError::Configuration`] when no candidates are given
    /// and [`TrackError::DimensionMismatch`] when dimensions disagree.
    pub fn fit(states: &[StateVector], floor: &DMatrix<f64>) -> Result<Self> {
        if states.is_empty() {
            return Err(TrackError::Configuration {
                description: "gaussian belief requires at least one candidate state".into(),
            });
        }

        let dim = states[0].len();
        for state in states.iter().skip(1) {
            if state.len() != dim {
                return Err(TrackError::DimensionMismatch {
                    expected: dim,
                    actual: state.len(),
                    context: "candidate state".into(),
                });
            }
        }
        if floor.nrows() != dim || floor.ncols() != dim {
            return Err(TrackError::DimensionMismatch {
                expected: dim,
                actual: floor.nrows().max(floor.ncols()),
                context: "covariance floor".into(),
            });
        }

        let n = states.len() as f64;
        let mut mean = DVector::zeros(dim);
        for state in states {
            mean += state;
        }
        mean /= n;

        let mut covariance = floor.clone();
        for state in states {
            let diff = state - &mean;
            covariance += (&diff * diff.transpose()) / n;
        }

        Self::new(mean, covariance)
    }

    /// State dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Re-establishes covariance symmetry after accumulated rounding.
    pub fn symmetrize(&mut self) {
        symmetrize(&mut self.covariance);
    }

    /// Repairs the covariance to positive semi-definite form, projecting
    /// onto the nearest PSD matrix when an update pushed it outside.
    ///
    /// # Errors
    /// Returns [`TrackError::DegenerateBelief`] when the mean or covariance
    /// contains non-finite entries.
    pub fn ensure_positive_semidefinite(&mut self) -> Result<()> {
        if self.mean.iter().any(|v| !v.is_finite()) {
            return Err(TrackError::DegenerateBelief {
                description: "belief mean contains non-finite entries".into(),
            });
        }

        self.symmetrize();
        if is_positive_definite(&self.covariance) {
            return Ok(());
        }

        match nearest_psd(&self.covariance, 1e-12) {
            Some(projected) => {
                self.covariance = projected;
                Ok(())
            }
            None => Err(TrackError::DegenerateBelief {
                description: "belief covariance contains non-finite entries".into(),
            }),
        }
    }
}
