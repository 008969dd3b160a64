use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::GroundPlaneError;

/// Pixel dimensions of the sensor frame.
///
/// All coordinate-center assumptions (image center, half widths, the 4:3
/// target rectangle) are derived from this value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl Default for FrameDimensions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

impl FrameDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Reject frames with a zero dimension.
    pub fn validate(&self) -> Result<(), GroundPlaneError> {
        if self.width == 0 || self.height == 0 {
            return Err(GroundPlaneError::degenerate(format!(
                "frame dimensions must be non-zero (width={}, height={})",
                self.width, self.height
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn half_width(&self) -> f64 {
        self.width as f64 / 2.0
    }

    #[inline]
    pub fn half_height(&self) -> f64 {
        self.height as f64 / 2.0
    }

    #[inline]
    pub fn center(&self) -> Point2<f64> {
        Point2::new(self.half_width(), self.half_height())
    }

    /// Integer pixel at the frame center, used to read the calibration depth sample.
    #[inline]
    pub fn center_pixel(&self) -> (u32, u32) {
        (self.width / 2, self.height / 2)
    }

    /// Height over width (0.75 for the default 640x480 frame).
    #[inline]
    pub fn aspect(&self) -> f64 {
        self.height as f64 / self.width as f64
    }
}
