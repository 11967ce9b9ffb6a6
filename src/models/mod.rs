//! Model traits for depth-image object tracking
//!
//! This module defines the core traits that describe object pose dynamics,
//! the rendering seam, and the robust depth-image likelihood.

mod transition;
mod observation;
mod pixel;
mod renderer;

pub use transition::*;
pub use observation::*;
pub use pixel::*;
pub use renderer::*;
