//! Projection of image points into rectified space, snapped to a coarse grid.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::ensure_finite;
use crate::{CalibrationQuadrilateral, FrameDimensions, GroundPlaneError, ProjectiveTransform};

/// Number of grid cells across the quadrilateral in each direction.
pub const DEFAULT_RASTER_DIVISIONS: u32 = 4;

/// Quantization grid derived from the calibration quadrilateral.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RasterGrid {
    pub cell_x: f64,
    pub cell_y: f64,
}

impl RasterGrid {
    /// Cell size is the mean quadrilateral width/height divided by `divisions`.
    pub fn from_quad(
        quad: &CalibrationQuadrilateral,
        frame: &FrameDimensions,
        divisions: u32,
    ) -> Result<Self, GroundPlaneError> {
        if divisions == 0 {
            return Err(GroundPlaneError::degenerate("raster divisions must be positive"));
        }
        let n = divisions as f64;
        let cell_x = (quad.right_x(frame)? - quad.left_x(frame)?).abs() / n;
        let cell_y = (quad.lower_y(frame)? - quad.upper_y(frame)?).abs() / n;
        if !(cell_x > 0.0 && cell_y > 0.0) {
            return Err(GroundPlaneError::degenerate(format!(
                "raster cell has zero extent ({cell_x:.3} x {cell_y:.3})"
            )));
        }
        Ok(Self { cell_x, cell_y })
    }

    /// Floor each coordinate to the nearest lower multiple of the cell size.
    #[inline]
    pub fn snap(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new(
            (p.x / self.cell_x).floor() * self.cell_x,
            (p.y / self.cell_y).floor() * self.cell_y,
        )
    }
}

/// Maps image points through a rectifying transform and rasterizes the result.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointProjector {
    pub transform: ProjectiveTransform,
    pub grid: RasterGrid,
}

impl PointProjector {
    pub fn new(
        transform: ProjectiveTransform,
        quad: &CalibrationQuadrilateral,
        frame: &FrameDimensions,
        divisions: u32,
    ) -> Result<Self, GroundPlaneError> {
        Ok(Self {
            transform,
            grid: RasterGrid::from_quad(quad, frame, divisions)?,
        })
    }

    pub fn project(&self, point: Point2<f64>) -> Result<Point2<f64>, GroundPlaneError> {
        ensure_finite(point.x, "image point x")?;
        ensure_finite(point.y, "image point y")?;
        let rectified = self.transform.apply(point)?;
        Ok(self.grid.snap(rectified))
    }
}

/// One-shot projection with the default grid resolution.
pub fn project(
    point: Point2<f64>,
    transform: &ProjectiveTransform,
    quad: &CalibrationQuadrilateral,
    frame: &FrameDimensions,
) -> Result<Point2<f64>, GroundPlaneError> {
    PointProjector::new(*transform, quad, frame, DEFAULT_RASTER_DIVISIONS)?.project(point)
}
