use serde::{Deserialize, Serialize};

/// Which half of the frame a calibration point falls into.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum FrameSide {
    Left,
    Right,
}

impl std::fmt::Display for FrameSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameSide::Left => f.write_str("left"),
            FrameSide::Right => f.write_str("right"),
        }
    }
}

/// Errors returned by the calibration and mapping primitives.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GroundPlaneError {
    #[error("incomplete calibration input (expected 4 classified corners, got {found})")]
    IncompleteCalibrationInput { found: usize },

    #[error("ambiguous calibration input ({count} points on the {side} side of the frame)")]
    AmbiguousCalibrationInput { side: FrameSide, count: usize },

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("projection singularity at ({x:.3}, {y:.3})")]
    ProjectionSingularity { x: f64, y: f64 },

    #[error("non-finite input: {0}")]
    NonFiniteInput(&'static str),

    #[error("no depth sample available at pixel ({x}, {y})")]
    DepthSampleUnavailable { x: u32, y: u32 },

    #[error("tilt reading unavailable")]
    TiltUnavailable,
}

impl GroundPlaneError {
    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateGeometry(reason.into())
    }
}

pub(crate) fn ensure_finite(value: f64, what: &'static str) -> Result<f64, GroundPlaneError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(GroundPlaneError::NonFiniteInput(what))
    }
}
