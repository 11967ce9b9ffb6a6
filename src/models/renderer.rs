//! Object geometry and rendering contracts
//!
//! Rendering is an external service to the filters: an observation model
//! hands a full pose hypothesis to a [`DepthRenderer`] and receives the
//! predicted depth image. Mesh handling and rasterization internals stay
//! behind this seam.

use crate::types::image::{CameraData, DepthImage, INVALID_DEPTH};
use crate::types::state::{StateVector, POSE_BLOCK_SIZE};

/// Geometry description of the tracked object.
///
/// The filtering core only needs the number of independently tracked rigid
/// parts; everything else about the geometry belongs to the renderer.
pub trait ObjectModel {
    /// Number of rigid parts, each contributing one 6-dof pose block.
    fn count_parts(&self) -> usize;
}

/// Renders a pose hypothesis into the depth image a camera would see.
///
/// Pixels the object does not cover carry [`INVALID_DEPTH`].
pub trait DepthRenderer: Send + Sync {
    /// Predicted depth image for the full state under the given camera.
    fn render(&self, state: &StateVector, camera: &CameraData) -> DepthImage;
}

/// A synthetic renderer: one rigid sphere per part, pinhole-projected.
///
/// Spheres are rotation-invariant, so the orientation half of each pose
/// block is carried through the filters but does not alter the image.
/// Useful for tests and demos without any mesh machinery.
#[derive(Debug, Clone)]
pub struct SphereRenderer {
    radii: Vec<f64>,
}

impl SphereRenderer {
    /// Creates a renderer for one sphere per part.
    ///
    /// # Panics
    /// Panics if no radius is given or a radius is not positive.
    pub fn new(radii: Vec<f64>) -> Self {
        assert!(!radii.is_empty(), "at least one sphere is required");
        assert!(
            radii.iter().all(|&r| r > 0.0),
            "sphere radii must be positive"
        );
        Self { radii }
    }

    /// Convenience constructor for a single sphere.
    pub fn single(radius: f64) -> Self {
        Self::new(vec![radius])
    }

    /// z-depth at which the pixel ray hits the sphere, if it does.
    fn hit_depth(center: &[f64], radius: f64, dx: f64, dy: f64) -> Option<f64> {
        // Ray p(t) = t * [dx, dy, 1]; solve |p(t) - center|^2 = radius^2
        let a = dx * dx + dy * dy + 1.0;
        let b = dx * center[0] + dy * center[1] + center[2];
        let c = center[0] * center[0] + center[1] * center[1] + center[2] * center[2]
            - radius * radius;

        let discriminant = b * b - a * c;
        if discriminant < 0.0 {
            return None;
        }

        let t = (b - discriminant.sqrt()) / a;
        if t > 0.0 {
            Some(t)
        } else {
            None
        }
    }
}

impl ObjectModel for SphereRenderer {
    fn count_parts(&self) -> usize {
        self.radii.len()
    }
}

impl DepthRenderer for SphereRenderer {
    fn render(&self, state: &StateVector, camera: &CameraData) -> DepthImage {
        assert_eq!(
            state.len(),
            self.radii.len() * POSE_BLOCK_SIZE,
            "state dimension does not match part count"
        );

        DepthImage::from_fn(camera.width, camera.height, |x, y| {
            // Ray through the pixel center in camera coordinates
            let dx = (x as f64 + 0.5 - camera.cx) / camera.fx;
            let dy = (y as f64 + 0.5 - camera.cy) / camera.fy;

            let mut depth = INVALID_DEPTH;
            for (part, &radius) in self.radii.iter().enumerate() {
                let offset = part * POSE_BLOCK_SIZE;
                let center = [state[offset], state[offset + 1], state[offset + 2]];
                if let Some(t) = Self::hit_depth(&center, radius, dx, dy) {
                    if !depth.is_finite() || t < depth {
                        depth = t;
                    }
                }
            }
            depth
        })
    }
}
