//! depthtrack: Depth-Based Object Pose Tracking
//!
//! Recursive Bayesian filters that infer the 6-DoF pose of rigid objects
//! from depth images.
//!
//! # Features
//!
//! - **Coordinate Particle Filter**: Rao-Blackwellized block-wise sampling
//!   keeps particle counts tractable in high dimensional pose spaces
//! - **Robust Gaussian Filter**: sigma-point update fusing every depth
//!   pixel as its own body-tail gated sensor
//! - **Pluggable Models**: transition, observation and rendering seams are
//!   traits, so geometry and dynamics swap without touching the filters

pub mod types;
pub mod models;
pub mod filters;
pub mod tracker;
pub mod utils;

pub mod prelude {
    pub use crate::filters::coordinate::*;
    pub use crate::filters::gaussian::*;
    pub use crate::filters::quadrature::*;
    pub use crate::filters::Filter;
    pub use crate::models::*;
    pub use crate::tracker::*;
    pub use crate::types::belief::*;
    pub use crate::types::image::*;
    pub use crate::types::state::*;
    pub use crate::utils::*;
}

/// Error types for the library
#[derive(Debug, Clone, PartialEq)]
pub enum TrackError {
    /// Invalid parameter or model composition, caught before tracking
    Configuration {
        /// What was configured wrongly
        description: String,
    },
    /// A requested model capability is not available
    UnsupportedCapability {
        /// The capability that was requested
        capability: String,
    },
    /// The belief collapsed numerically
    DegenerateBelief {
        /// How the collapse manifested
        description: String,
    },
    /// A vector or image does not have the expected dimension
    DimensionMismatch {
        /// Dimension the callee expected
        expected: usize,
        /// Dimension it was handed
        actual: usize,
        /// Which argument mismatched
        context: String,
    },
}

impl std::error::Error for TrackError {}

impl std::fmt::Display for TrackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackError::Configuration { description } => {
                write!(f, "invalid configuration: {}", description)
            }
            TrackError::UnsupportedCapability { capability } => {
                write!(f, "unsupported capability: {}", capability)
            }
            TrackError::DegenerateBelief { description } => {
                write!(f, "degenerate belief: {}", description)
            }
            TrackError::DimensionMismatch {
                expected,
                actual,
                context,
            } => {
                write!(
                    f,
                    "dimension mismatch in {}: expected {}, got {}",
                    context, expected, actual
                )
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackError>;
