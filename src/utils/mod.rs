//! Utility functions for depth-image tracking
//!
//! Log-weight arithmetic, resampling index generation, and covariance
//! conditioning helpers.

mod numeric;

pub use numeric::*;
