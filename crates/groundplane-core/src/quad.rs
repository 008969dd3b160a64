//! Assignment of the four user-picked floor points to quadrilateral corners.
//!
//! Points are split only by their position relative to the vertical
//! centerline of the frame. Within a side, the first point encountered
//! becomes the top corner and the second the bottom corner; no y-based
//! disambiguation is performed.

use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::ensure_finite;
use crate::{canonical_order, FrameDimensions, FrameSide, GroundPlaneError};

/// Logical corner of the calibration quadrilateral.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    /// Canonical row-major order.
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    #[inline]
    fn index(self) -> usize {
        match self {
            Corner::TopLeft => 0,
            Corner::TopRight => 1,
            Corner::BottomLeft => 2,
            Corner::BottomRight => 3,
        }
    }
}

/// What to do when more than two points fall on the same side of the frame.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideOverflowPolicy {
    /// Keep the first two points per side and drop the rest.
    #[default]
    Truncate,
    /// Fail with [`GroundPlaneError::AmbiguousCalibrationInput`].
    Reject,
}

/// Four calibration points plus their corner assignment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationQuadrilateral {
    points: Vec<Point2<f64>>,
    corners: [Option<Point2<f64>>; 4],
}

impl CalibrationQuadrilateral {
    /// Assign corners without requiring the result to be complete.
    ///
    /// Points exactly on the centerline belong to neither side and stay
    /// unassigned.
    pub fn from_points(
        points: &[Point2<f64>],
        frame: &FrameDimensions,
        policy: SideOverflowPolicy,
    ) -> Result<Self, GroundPlaneError> {
        frame.validate()?;
        let center_x = frame.half_width();

        let mut corners = [None; 4];
        let mut left = 0usize;
        let mut right = 0usize;

        for p in points {
            ensure_finite(p.x, "calibration point x")?;
            ensure_finite(p.y, "calibration point y")?;

            let (slots, count) = if p.x > center_x {
                ([Corner::TopRight, Corner::BottomRight], &mut right)
            } else if p.x < center_x {
                ([Corner::TopLeft, Corner::BottomLeft], &mut left)
            } else {
                debug!("calibration point ({:.1}, {:.1}) lies on the centerline", p.x, p.y);
                continue;
            };

            *count += 1;
            match slots.get(*count - 1) {
                Some(corner) => corners[corner.index()] = Some(*p),
                None => debug!(
                    "dropping calibration point ({:.1}, {:.1}): side already has two points",
                    p.x, p.y
                ),
            }
        }

        if policy == SideOverflowPolicy::Reject {
            for (side, count) in [(FrameSide::Left, left), (FrameSide::Right, right)] {
                if count > 2 {
                    return Err(GroundPlaneError::AmbiguousCalibrationInput { side, count });
                }
            }
        }

        Ok(Self {
            points: points.to_vec(),
            corners,
        })
    }

    /// Input points in the order they were supplied.
    pub fn raw_points(&self) -> &[Point2<f64>] {
        &self.points
    }

    pub fn corner(&self, corner: Corner) -> Option<Point2<f64>> {
        self.corners[corner.index()]
    }

    pub fn assigned_count(&self) -> usize {
        self.corners.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.assigned_count() == 4
    }

    /// Classified corners as `[TL, TR, BL, BR]`, in encounter order within each side.
    pub fn corners(&self) -> Result<[Point2<f64>; 4], GroundPlaneError> {
        match self.corners {
            [Some(tl), Some(tr), Some(bl), Some(br)] => Ok([tl, tr, bl, br]),
            _ => Err(GroundPlaneError::IncompleteCalibrationInput {
                found: self.assigned_count(),
            }),
        }
    }

    /// Input points sorted into TL, TR, BL, BR by position.
    ///
    /// Unlike [`corners`](Self::corners) this does not depend on the order
    /// the points were supplied in.
    pub fn ordered_corners(
        &self,
        frame: &FrameDimensions,
    ) -> Result<[Point2<f64>; 4], GroundPlaneError> {
        if !self.is_complete() {
            return Err(GroundPlaneError::IncompleteCalibrationInput {
                found: self.assigned_count(),
            });
        }
        let raw: &[Point2<f64>; 4] = self.points.as_slice().try_into().map_err(|_| {
            GroundPlaneError::IncompleteCalibrationInput {
                found: self.points.len(),
            }
        })?;
        Ok(canonical_order(raw, frame))
    }

    /// Mean x of the left edge.
    pub fn left_x(&self, frame: &FrameDimensions) -> Result<f64, GroundPlaneError> {
        let [tl, _, bl, _] = self.ordered_corners(frame)?;
        Ok((tl.x + bl.x) / 2.0)
    }

    /// Mean x of the right edge.
    pub fn right_x(&self, frame: &FrameDimensions) -> Result<f64, GroundPlaneError> {
        let [_, tr, _, br] = self.ordered_corners(frame)?;
        Ok((tr.x + br.x) / 2.0)
    }

    /// Mean y of the upper edge.
    pub fn upper_y(&self, frame: &FrameDimensions) -> Result<f64, GroundPlaneError> {
        let [tl, tr, _, _] = self.ordered_corners(frame)?;
        Ok((tl.y + tr.y) / 2.0)
    }

    /// Mean y of the lower edge.
    pub fn lower_y(&self, frame: &FrameDimensions) -> Result<f64, GroundPlaneError> {
        let [_, _, bl, br] = self.ordered_corners(frame)?;
        Ok((bl.y + br.y) / 2.0)
    }
}

/// Classify exactly four points into a complete quadrilateral.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(frame)))]
pub fn classify(
    points: &[Point2<f64>],
    frame: &FrameDimensions,
    policy: SideOverflowPolicy,
) -> Result<CalibrationQuadrilateral, GroundPlaneError> {
    if points.len() != 4 {
        return Err(GroundPlaneError::IncompleteCalibrationInput {
            found: points.len(),
        });
    }
    let quad = CalibrationQuadrilateral::from_points(points, frame, policy)?;
    if !quad.is_complete() {
        return Err(GroundPlaneError::IncompleteCalibrationInput {
            found: quad.assigned_count(),
        });
    }
    Ok(quad)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(raw: &[(f64, f64)]) -> Vec<Point2<f64>> {
        raw.iter().map(|&(x, y)| Point2::new(x, y)).collect()
    }

    #[test]
    fn assigns_axis_aligned_rectangle() {
        let frame = FrameDimensions::default();
        let points = pts(&[(100.0, 100.0), (500.0, 100.0), (100.0, 400.0), (500.0, 400.0)]);
        let quad = classify(&points, &frame, SideOverflowPolicy::Truncate).unwrap();

        assert_eq!(quad.corner(Corner::TopLeft), Some(Point2::new(100.0, 100.0)));
        assert_eq!(quad.corner(Corner::TopRight), Some(Point2::new(500.0, 100.0)));
        assert_eq!(quad.corner(Corner::BottomLeft), Some(Point2::new(100.0, 400.0)));
        assert_eq!(quad.corner(Corner::BottomRight), Some(Point2::new(500.0, 400.0)));
    }

    #[test]
    fn encounter_order_decides_top_and_bottom() {
        // No y-based disambiguation: the first right-hand point is "top".
        let frame = FrameDimensions::default();
        let points = pts(&[(500.0, 400.0), (100.0, 100.0), (500.0, 100.0), (100.0, 400.0)]);
        let quad = classify(&points, &frame, SideOverflowPolicy::Truncate).unwrap();

        assert_eq!(quad.corner(Corner::TopRight), Some(Point2::new(500.0, 400.0)));
        assert_eq!(quad.corner(Corner::BottomRight), Some(Point2::new(500.0, 100.0)));
    }

    #[test]
    fn three_on_one_side_is_truncated_by_default() {
        let frame = FrameDimensions::default();
        let points = pts(&[(400.0, 100.0), (450.0, 200.0), (500.0, 300.0), (100.0, 100.0)]);

        let quad =
            CalibrationQuadrilateral::from_points(&points, &frame, SideOverflowPolicy::Truncate)
                .unwrap();
        assert_eq!(quad.assigned_count(), 3);
        assert_eq!(quad.corner(Corner::BottomLeft), None);

        let err = classify(&points, &frame, SideOverflowPolicy::Truncate).unwrap_err();
        assert_eq!(err, GroundPlaneError::IncompleteCalibrationInput { found: 3 });
    }

    #[test]
    fn three_on_one_side_can_be_rejected() {
        let frame = FrameDimensions::default();
        let points = pts(&[(400.0, 100.0), (450.0, 200.0), (500.0, 300.0), (100.0, 100.0)]);
        let err = classify(&points, &frame, SideOverflowPolicy::Reject).unwrap_err();
        assert_eq!(
            err,
            GroundPlaneError::AmbiguousCalibrationInput {
                side: FrameSide::Right,
                count: 3
            }
        );
    }

    #[test]
    fn wrong_point_count_is_incomplete() {
        let frame = FrameDimensions::default();
        let points = pts(&[(100.0, 100.0), (500.0, 100.0), (100.0, 400.0)]);
        let err = classify(&points, &frame, SideOverflowPolicy::Truncate).unwrap_err();
        assert_eq!(err, GroundPlaneError::IncompleteCalibrationInput { found: 3 });
    }

    #[test]
    fn centerline_points_stay_unassigned() {
        let frame = FrameDimensions::default();
        let points = pts(&[(320.0, 100.0), (320.0, 400.0), (100.0, 100.0), (500.0, 100.0)]);
        let err = classify(&points, &frame, SideOverflowPolicy::Truncate).unwrap_err();
        assert_eq!(err, GroundPlaneError::IncompleteCalibrationInput { found: 2 });
    }

    #[test]
    fn edge_midpoints_average_corner_pairs() {
        let frame = FrameDimensions::default();
        let points = pts(&[(120.0, 90.0), (520.0, 110.0), (80.0, 410.0), (560.0, 390.0)]);
        let quad = classify(&points, &frame, SideOverflowPolicy::Truncate).unwrap();
        assert_eq!(quad.left_x(&frame).unwrap(), 100.0);
        assert_eq!(quad.right_x(&frame).unwrap(), 540.0);
        assert_eq!(quad.upper_y(&frame).unwrap(), 100.0);
        assert_eq!(quad.lower_y(&frame).unwrap(), 400.0);
    }

    #[test]
    fn edge_midpoints_ignore_encounter_order() {
        let frame = FrameDimensions::default();
        // Bottom-right entered before top-right: the classifier swaps them.
        let points = pts(&[(120.0, 90.0), (560.0, 390.0), (80.0, 410.0), (520.0, 110.0)]);
        let quad = classify(&points, &frame, SideOverflowPolicy::Truncate).unwrap();
        assert_eq!(quad.corner(Corner::TopRight), Some(Point2::new(560.0, 390.0)));
        assert_eq!(
            quad.ordered_corners(&frame).unwrap(),
            [points[0], points[3], points[2], points[1]]
        );
        assert_eq!(quad.upper_y(&frame).unwrap(), 100.0);
        assert_eq!(quad.lower_y(&frame).unwrap(), 400.0);
    }
}
