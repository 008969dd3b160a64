use log::info;
use nalgebra::Point2;

use crate::{CalibrationQuadrilateral, Corner, FrameDimensions, GroundPlaneError};

/// Estimate the vanishing point by extending the right edge (TR -> BR) of
/// the quadrilateral up to the vertical centerline of the frame.
///
/// A right edge parallel to the centerline never reaches it; in that case
/// no extrapolation is applied and the vanishing point sits at the height
/// of the top-right corner.
pub fn estimate_vanishing_point(
    quad: &CalibrationQuadrilateral,
    frame: &FrameDimensions,
) -> Result<Point2<f64>, GroundPlaneError> {
    frame.validate()?;
    let (top_right, bottom_right) = match (
        quad.corner(Corner::TopRight),
        quad.corner(Corner::BottomRight),
    ) {
        (Some(tr), Some(br)) if quad.is_complete() => (tr, br),
        _ => {
            return Err(GroundPlaneError::IncompleteCalibrationInput {
                found: quad.assigned_count(),
            })
        }
    };

    let edge = bottom_right - top_right;
    if edge.norm() < 1e-9 {
        return Err(GroundPlaneError::degenerate(
            "top-right and bottom-right corners coincide",
        ));
    }

    let center_x = frame.half_width();
    let dy_to_center = if edge.x.abs() < 1e-9 {
        0.0
    } else {
        let run_to_center = top_right.x - center_x;
        edge.y * (run_to_center / edge.x)
    };

    let vp = Point2::new(center_x, top_right.y - dy_to_center);
    info!("vanishing point at ({:.2}, {:.2})", vp.x, vp.y);
    Ok(vp)
}
