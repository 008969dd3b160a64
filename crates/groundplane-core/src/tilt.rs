//! Tilt/height-derived viewport scale.
//!
//! The sensor looks down at the floor at `tilt` degrees from horizontal.
//! A first geometric estimate of the view-plane distance comes from the
//! mounting height; it is then superseded by the slant distance measured at
//! the frame center. Pixel-per-centimeter scales are derived from the
//! measured distance and the half field of view.

use log::{debug, info};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::ensure_finite;
use crate::{DepthModel, FrameDimensions, GroundPlaneError};

/// Full horizontal field of view of the reference sensor.
pub const DEFAULT_FOV_DEG: f64 = 62.7;

/// Source of the device tilt angle.
pub trait TiltSensor {
    /// Current tilt in degrees, `None` if the device did not report one.
    fn tilt_degrees(&mut self) -> Option<f64>;
}

/// Tilt sensor that always reports the same angle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedTilt(pub f64);

impl TiltSensor for FixedTilt {
    fn tilt_degrees(&mut self) -> Option<f64> {
        Some(self.0)
    }
}

/// Viewport calibration derived from tilt, mounting height and the center depth sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TiltCalibration {
    pub tilt_rad: f64,
    /// Raw depth sample at the frame center this calibration was derived from.
    pub center_raw_depth: f64,
    /// `sin(tilt) * height`, the purely geometric estimate.
    pub estimated_view_plane_distance_cm: f64,
    /// Slant distance measured at the frame center; used for all scales.
    pub measured_view_plane_distance_cm: f64,
    pub vertical_px_per_cm: f64,
    pub horizontal_px_per_cm: f64,
    /// Floor depth hidden below the lower frame edge, in centimeters.
    pub additional_depth_cm: f64,
    /// `additional_depth_cm` expressed in vertical pixels.
    pub vertical_pixel_offset: f64,
}

impl TiltCalibration {
    /// Whether this calibration was derived from exactly these readings.
    pub fn matches_inputs(&self, tilt_deg: f64, center_raw_depth: f64) -> bool {
        self.tilt_rad == tilt_deg.to_radians() && self.center_raw_depth == center_raw_depth
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TiltCalibrator {
    pub depth: DepthModel,
    pub fov_deg: f64,
    pub frame: FrameDimensions,
}

impl Default for TiltCalibrator {
    fn default() -> Self {
        Self {
            depth: DepthModel::default(),
            fov_deg: DEFAULT_FOV_DEG,
            frame: FrameDimensions::default(),
        }
    }
}

impl TiltCalibrator {
    pub fn new(depth: DepthModel, fov_deg: f64, frame: FrameDimensions) -> Self {
        Self {
            depth,
            fov_deg,
            frame,
        }
    }

    #[inline]
    pub fn half_fov_rad(&self) -> f64 {
        (self.fov_deg / 2.0).to_radians()
    }

    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn calibrate(
        &self,
        tilt_deg: f64,
        center_raw_depth: f64,
    ) -> Result<TiltCalibration, GroundPlaneError> {
        ensure_finite(tilt_deg, "tilt angle")?;
        ensure_finite(center_raw_depth, "center depth sample")?;
        ensure_finite(self.depth.height_cm, "mounting height")?;
        self.frame.validate()?;

        if tilt_deg <= 0.0 || tilt_deg >= 90.0 {
            return Err(GroundPlaneError::degenerate(format!(
                "tilt must lie strictly between 0 and 90 degrees, got {tilt_deg}"
            )));
        }
        if !(self.fov_deg > 0.0 && self.fov_deg < 180.0) {
            return Err(GroundPlaneError::degenerate(format!(
                "field of view must lie strictly between 0 and 180 degrees, got {}",
                self.fov_deg
            )));
        }

        let tilt_rad = tilt_deg.to_radians();
        let tan_half_fov = self.half_fov_rad().tan();

        let estimated = tilt_rad.sin() * self.depth.height_cm;
        let additional_depth_cm = estimated * (1.0 / tilt_rad.tan() - tan_half_fov);
        debug!("estimated view-plane distance {estimated:.3} cm");

        let measured = self.depth.direct_distance_cm(center_raw_depth);
        let half_extent_cm = measured * tan_half_fov;
        if !half_extent_cm.is_finite() || half_extent_cm.abs() < 1e-9 {
            return Err(GroundPlaneError::degenerate(format!(
                "measured view-plane distance {measured:.3} cm yields no usable viewport"
            )));
        }

        let vertical_px_per_cm = (self.frame.half_height() / half_extent_cm).abs();
        let horizontal_px_per_cm = (self.frame.half_width() / half_extent_cm).abs();
        let vertical_pixel_offset = additional_depth_cm * vertical_px_per_cm;

        info!(
            "viewport calibrated: {vertical_px_per_cm:.4} px/cm vertical, \
             {horizontal_px_per_cm:.4} px/cm horizontal, view plane {measured:.2} cm, \
             {vertical_pixel_offset:.2} additional vertical px"
        );

        Ok(TiltCalibration {
            tilt_rad,
            center_raw_depth,
            estimated_view_plane_distance_cm: estimated,
            measured_view_plane_distance_cm: measured,
            vertical_px_per_cm,
            horizontal_px_per_cm,
            additional_depth_cm,
            vertical_pixel_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn forty_five_degrees_at_reference_height() {
        let calibrator = TiltCalibrator::default();
        let cal = calibrator.calibrate(45.0, 600.0).unwrap();

        assert_relative_eq!(cal.estimated_view_plane_distance_cm, 26.870057685, epsilon = 1e-6);

        let measured = calibrator.depth.direct_distance_cm(600.0);
        assert_relative_eq!(cal.measured_view_plane_distance_cm, measured, epsilon = 1e-12);

        let tan_half = (31.35_f64).to_radians().tan();
        assert_relative_eq!(cal.vertical_px_per_cm, 240.0 / (measured * tan_half), epsilon = 1e-9);
        assert_relative_eq!(
            cal.horizontal_px_per_cm,
            320.0 / (measured * tan_half),
            epsilon = 1e-9
        );

        let add_cm = cal.estimated_view_plane_distance_cm * (1.0 - tan_half);
        assert_relative_eq!(cal.additional_depth_cm, add_cm, epsilon = 1e-9);
        assert_relative_eq!(
            cal.vertical_pixel_offset,
            add_cm * cal.vertical_px_per_cm,
            epsilon = 1e-9
        );
    }

    #[test]
    fn horizontal_scale_follows_frame_aspect() {
        let cal = TiltCalibrator::default().calibrate(30.0, 500.0).unwrap();
        assert_relative_eq!(
            cal.horizontal_px_per_cm / cal.vertical_px_per_cm,
            320.0 / 240.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn level_and_vertical_tilts_are_rejected() {
        let calibrator = TiltCalibrator::default();
        for tilt in [0.0, 90.0, -10.0, 120.0] {
            assert!(
                matches!(
                    calibrator.calibrate(tilt, 600.0),
                    Err(GroundPlaneError::DegenerateGeometry(_))
                ),
                "tilt={tilt}"
            );
        }
    }

    #[test]
    fn nan_tilt_is_rejected() {
        assert_eq!(
            TiltCalibrator::default().calibrate(f64::NAN, 600.0),
            Err(GroundPlaneError::NonFiniteInput("tilt angle"))
        );
    }

    #[test]
    fn fixed_tilt_reports_its_angle() {
        let mut sensor = FixedTilt(27.5);
        assert_eq!(sensor.tilt_degrees(), Some(27.5));
    }

    #[test]
    fn calibration_remembers_its_inputs() {
        let cal = TiltCalibrator::default().calibrate(45.0, 600.0).unwrap();
        assert!(cal.matches_inputs(45.0, 600.0));
        assert!(!cal.matches_inputs(30.0, 600.0));
        assert!(!cal.matches_inputs(45.0, 700.0));
    }
}
