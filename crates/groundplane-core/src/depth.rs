//! Raw depth sample to metric distance conversion.

use serde::{Deserialize, Serialize};

use crate::error::ensure_finite;
use crate::GroundPlaneError;

/// Empirical response curve of the sensor: `tan(raw / SCALE + PHASE) * GAIN + OFFSET`.
const RESPONSE_SCALE: f64 = 1024.0;
const RESPONSE_PHASE: f64 = 0.5;
const RESPONSE_GAIN_CM: f64 = 33.825;
const RESPONSE_OFFSET_CM: f64 = 5.7;

/// Mounting height used by the reference rig.
pub const DEFAULT_HEIGHT_CM: f64 = 38.0;

/// Source of raw depth samples, addressed by pixel.
pub trait DepthFrame {
    /// Raw sensor value at `(x, y)`, or `None` when the pixel is outside the
    /// frame or carries no reading.
    fn raw_depth(&self, x: u32, y: u32) -> Option<f64>;
}

/// Row-major 11-bit depth frame held in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepthImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u16>,
}

impl DepthImage {
    /// Sensor code for "no reading".
    pub const NO_READING: u16 = 2047;

    /// Build a frame by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> u16) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn filled(width: u32, height: u32, value: u16) -> Self {
        Self::from_fn(width, height, |_, _| value)
    }
}

impl DepthFrame for DepthImage {
    fn raw_depth(&self, x: u32, y: u32) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.width as usize + x as usize;
        match self.data.get(idx).copied()? {
            Self::NO_READING => None,
            v => Some(v as f64),
        }
    }
}

/// Converts raw samples into slant and ground distances for a sensor
/// mounted `height_cm` above the floor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepthModel {
    pub height_cm: f64,
}

impl Default for DepthModel {
    fn default() -> Self {
        Self {
            height_cm: DEFAULT_HEIGHT_CM,
        }
    }
}

impl DepthModel {
    pub fn new(height_cm: f64) -> Self {
        Self { height_cm }
    }

    /// Distance along the line of sight, in centimeters.
    #[inline]
    pub fn direct_distance_cm(&self, raw: f64) -> f64 {
        (raw / RESPONSE_SCALE + RESPONSE_PHASE).tan() * RESPONSE_GAIN_CM + RESPONSE_OFFSET_CM
    }

    /// Horizontal distance from the sensor's floor projection to the observed point.
    pub fn ground_distance_cm(&self, raw: f64) -> Result<f64, GroundPlaneError> {
        ensure_finite(raw, "raw depth sample")?;
        ensure_finite(self.height_cm, "mounting height")?;

        let direct = self.direct_distance_cm(raw);
        if !direct.is_finite() || direct < self.height_cm {
            return Err(GroundPlaneError::degenerate(format!(
                "direct distance {direct:.2} cm is shorter than mounting height {:.2} cm",
                self.height_cm
            )));
        }
        Ok((direct * direct - self.height_cm * self.height_cm).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn direct_distance_follows_response_curve() {
        let model = DepthModel::default();
        let expected = (600.0_f64 / 1024.0 + 0.5).tan() * 33.825 + 5.7;
        assert_relative_eq!(model.direct_distance_cm(600.0), expected, epsilon = 1e-12);
    }

    #[test]
    fn ground_distance_is_pythagorean() {
        let model = DepthModel::default();
        let direct = model.direct_distance_cm(600.0);
        let ground = model.ground_distance_cm(600.0).unwrap();
        assert!(ground >= 0.0);
        assert_relative_eq!(ground * ground + 38.0 * 38.0, direct * direct, epsilon = 1e-9);
    }

    #[test]
    fn ground_distance_fails_below_mounting_height() {
        let model = DepthModel::default();
        // tan(200/1024 + 0.5) * 33.825 + 5.7 ~ 34 cm < 38 cm
        assert!(model.direct_distance_cm(200.0) < model.height_cm);
        assert!(matches!(
            model.ground_distance_cm(200.0),
            Err(GroundPlaneError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn ground_distance_defined_whenever_direct_exceeds_height() {
        let model = DepthModel::default();
        for raw in (0..1000).step_by(25) {
            let raw = raw as f64;
            let direct = model.direct_distance_cm(raw);
            let ground = model.ground_distance_cm(raw);
            if direct < model.height_cm {
                assert!(ground.is_err(), "raw={raw}");
            } else {
                assert!(ground.unwrap() >= 0.0, "raw={raw}");
            }
        }
    }

    #[test]
    fn nan_sample_is_rejected() {
        let model = DepthModel::default();
        assert_eq!(
            model.ground_distance_cm(f64::NAN),
            Err(GroundPlaneError::NonFiniteInput("raw depth sample"))
        );
    }

    #[test]
    fn depth_image_lookup_respects_bounds_and_no_reading() {
        let img = DepthImage::from_fn(4, 3, |x, y| if x == 3 { 2047 } else { (y * 10 + x) as u16 });
        assert_eq!(img.raw_depth(1, 2), Some(21.0));
        assert_eq!(img.raw_depth(3, 0), None);
        assert_eq!(img.raw_depth(4, 0), None);
        assert_eq!(img.raw_depth(0, 3), None);
    }
}
