//! Depth images and camera data
//!
//! The observation consumed by every filter step is a row-major depth image.
//! Pixels the sensor could not resolve carry NaN as the invalid marker.

use nalgebra::DVector;

use crate::{Result, TrackError};

/// Marker for pixels without a valid depth measurement.
pub const INVALID_DEPTH: f64 = f64::NAN;

/// A row-major depth image in meters.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    width: usize,
    height: usize,
    depths: DVector<f64>,
}

impl DepthImage {
    /// Creates a depth image from a row-major depth vector.
    ///
    /// # Errors
    /// Returns [`TrackError::DimensionMismatch`] when the vector length does
    /// not equal `width * height`.
    pub fn new(width: usize, height: usize, depths: DVector<f64>) -> Result<Self> {
        let expected = width * height;
        if depths.len() != expected {
            return Err(TrackError::DimensionMismatch {
                expected,
                actual: depths.len(),
                context: "depth image buffer".into(),
            });
        }

        Ok(Self {
            width,
            height,
            depths,
        })
    }

    /// Builds an image by evaluating `f(x, y)` for every pixel in row-major
    /// order.
    pub fn from_fn<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        let depths = DVector::from_fn(width * height, |i, _| f(i % width, i / width));
        Self {
            width,
            height,
            depths,
        }
    }

    /// Image width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Total pixel count.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.depths.len()
    }

    /// Depth at a row-major pixel index.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    #[inline]
    pub fn depth(&self, index: usize) -> f64 {
        self.depths[index]
    }

    /// Depth at image coordinates.
    ///
    /// # Panics
    /// Panics if the coordinates are out of range.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f64 {
        assert!(x < self.width && y < self.height, "pixel out of range");
        self.depths[y * self.width + x]
    }

    /// Whether the pixel holds a usable depth value.
    #[inline]
    pub fn is_valid(&self, index: usize) -> bool {
        self.depths[index].is_finite()
    }

    /// Number of pixels with a valid depth.
    pub fn valid_count(&self) -> usize {
        self.depths.iter().filter(|d| d.is_finite()).count()
    }

    /// The underlying row-major depth vector.
    #[inline]
    pub fn as_vector(&self) -> &DVector<f64> {
        &self.depths
    }
}

/// Pinhole camera description.
///
/// The core uses it to size observations and to project object geometry;
/// acquiring images is the caller's concern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraData {
    /// Image width in pixels
    pub width: usize,
    /// Image height in pixels
    pub height: usize,
    /// Focal length along x, in pixels
    pub fx: f64,
    /// Focal length along y, in pixels
    pub fy: f64,
    /// Principal point x, in pixels
    pub cx: f64,
    /// Principal point y, in pixels
    pub cy: f64,
}

impl CameraData {
    /// Creates camera data for a pinhole model.
    ///
    /// # Panics
    /// Panics if the resolution is zero or a focal length is not positive.
    pub fn new(width: usize, height: usize, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        assert!(width > 0 && height > 0, "resolution must be positive");
        assert!(fx > 0.0 && fy > 0.0, "focal lengths must be positive");
        Self {
            width,
            height,
            fx,
            fy,
            cx,
            cy,
        }
    }

    /// Pixels per image for this camera.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}
