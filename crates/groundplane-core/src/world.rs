//! Composition of ground distance and image offset into absolute world coordinates.
//!
//! Heading `θ` rotates three vectors:
//! - frame edge: `(sin θ, cos θ) * half_width`
//! - on-image lateral offset: `(sin θ, cos θ) * x_on_image`
//! - forward distance: `(cos θ, -sin θ) * distance`
//!
//! The lateral vectors use sine for x and cosine for y, a 90° phase shift
//! with respect to the forward vector that matches the sensor's axes.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::ensure_finite;
use crate::{FrameDimensions, GroundPlaneError};

/// Conversion from accumulated centimeter vectors to output units.
pub const DEFAULT_OUTPUT_SCALE: f64 = 0.1;

/// Absolute position and heading of the sensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DevicePose {
    pub origin: Point2<f64>,
    pub heading_rad: f64,
}

impl Default for DevicePose {
    fn default() -> Self {
        Self {
            origin: Point2::origin(),
            heading_rad: 0.0,
        }
    }
}

impl DevicePose {
    pub fn new(origin: Point2<f64>, heading_rad: f64) -> Self {
        Self {
            origin,
            heading_rad,
        }
    }
}

/// Where `x_on_image_px` is measured from.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateralReference {
    /// Offset from the frame edge; the half-width edge vector is added.
    #[default]
    FrameEdge,
    /// Signed offset from the optical axis; no edge vector.
    FrameCenter,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldMapper {
    pub frame: FrameDimensions,
    pub output_scale: f64,
    pub lateral_reference: LateralReference,
}

impl Default for WorldMapper {
    fn default() -> Self {
        Self {
            frame: FrameDimensions::default(),
            output_scale: DEFAULT_OUTPUT_SCALE,
            lateral_reference: LateralReference::default(),
        }
    }
}

impl WorldMapper {
    pub fn new(frame: FrameDimensions) -> Self {
        Self {
            frame,
            ..Self::default()
        }
    }

    pub fn with_lateral_reference(mut self, lateral_reference: LateralReference) -> Self {
        self.lateral_reference = lateral_reference;
        self
    }

    #[inline]
    pub fn left_frame_edge_vector(&self, heading_rad: f64) -> Vector2<f64> {
        lateral(heading_rad) * self.frame.half_width()
    }

    #[inline]
    pub fn on_image_vector(&self, x_on_image_px: f64, heading_rad: f64) -> Vector2<f64> {
        lateral(heading_rad) * x_on_image_px
    }

    #[inline]
    pub fn to_position_vector(&self, distance_cm: f64, heading_rad: f64) -> Vector2<f64> {
        Vector2::new(heading_rad.cos(), -heading_rad.sin()) * distance_cm
    }

    pub fn map(
        &self,
        ground_distance_cm: f64,
        x_on_image_px: f64,
        pose: &DevicePose,
    ) -> Result<Point2<f64>, GroundPlaneError> {
        ensure_finite(ground_distance_cm, "ground distance")?;
        ensure_finite(x_on_image_px, "image x offset")?;
        ensure_finite(pose.heading_rad, "view heading")?;
        ensure_finite(pose.origin.x, "device origin x")?;
        ensure_finite(pose.origin.y, "device origin y")?;
        ensure_finite(self.output_scale, "output scale")?;

        let heading = pose.heading_rad;
        let mut offset = self.on_image_vector(x_on_image_px, heading)
            + self.to_position_vector(ground_distance_cm, heading);
        if self.lateral_reference == LateralReference::FrameEdge {
            offset += self.left_frame_edge_vector(heading);
        }

        Ok((pose.origin + offset) * self.output_scale)
    }
}

#[inline]
fn lateral(heading_rad: f64) -> Vector2<f64> {
    Vector2::new(heading_rad.sin(), heading_rad.cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn zero_heading_centered_point_is_purely_forward() {
        let mapper = WorldMapper::default().with_lateral_reference(LateralReference::FrameCenter);
        let p = mapper.map(100.0, 0.0, &DevicePose::default()).unwrap();
        assert_relative_eq!(p.x, 10.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn frame_edge_reference_adds_half_width() {
        let mapper = WorldMapper::default();
        let p = mapper.map(100.0, 0.0, &DevicePose::default()).unwrap();
        assert_relative_eq!(p.x, 10.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 32.0, epsilon = 1e-12);

        let q = mapper.map(100.0, 80.0, &DevicePose::default()).unwrap();
        assert_relative_eq!(q.y, 40.0, epsilon = 1e-12);
    }

    #[test]
    fn quarter_turn_swaps_axes() {
        let mapper = WorldMapper::default().with_lateral_reference(LateralReference::FrameCenter);
        let pose = DevicePose::new(Point2::new(50.0, -20.0), FRAC_PI_2);
        let p = mapper.map(100.0, 30.0, &pose).unwrap();
        // forward -> (0, -100), lateral -> (30, 0)
        assert_relative_eq!(p.x, (50.0 + 30.0) * 0.1, epsilon = 1e-9);
        assert_relative_eq!(p.y, (-20.0 - 100.0) * 0.1, epsilon = 1e-9);
    }

    #[test]
    fn origin_is_scaled_with_the_offsets() {
        let mapper = WorldMapper::default().with_lateral_reference(LateralReference::FrameCenter);
        let pose = DevicePose::new(Point2::new(1000.0, 2000.0), 0.0);
        let p = mapper.map(0.0, 0.0, &pose).unwrap();
        assert_relative_eq!(p.x, 100.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 200.0, epsilon = 1e-12);
    }

    #[test]
    fn non_finite_inputs_are_rejected() {
        let mapper = WorldMapper::default();
        assert_eq!(
            mapper.map(f64::INFINITY, 0.0, &DevicePose::default()),
            Err(GroundPlaneError::NonFiniteInput("ground distance"))
        );
        assert_eq!(
            mapper.map(10.0, 0.0, &DevicePose::new(Point2::origin(), f64::NAN)),
            Err(GroundPlaneError::NonFiniteInput("view heading"))
        );
    }
}
