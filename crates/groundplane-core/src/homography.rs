use log::{debug, info};
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{CalibrationQuadrilateral, FrameDimensions, GroundPlaneError};

const DENOMINATOR_EPS: f64 = 1e-10;
const COLLINEAR_REL_EPS: f64 = 1e-6;
const RESIDUAL_REL_EPS: f64 = 1e-6;

/// 8-parameter projective transform
///
/// `x' = (a x + b y + c) / (g x + h y + 1)`,
/// `y' = (d x + e y + f) / (g x + h y + 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectiveTransform {
    coefficients: [f64; 8],
}

impl ProjectiveTransform {
    pub fn from_coefficients(coefficients: [f64; 8]) -> Self {
        Self { coefficients }
    }

    pub fn identity() -> Self {
        Self::from_coefficients([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0])
    }

    /// Build from a 3x3 matrix, rescaling so that `m[(2, 2)] == 1`.
    pub fn from_matrix(m: &Matrix3<f64>) -> Option<Self> {
        let s = m[(2, 2)];
        if s.abs() < 1e-12 {
            return None;
        }
        let m = m / s;
        Some(Self::from_coefficients([
            m[(0, 0)],
            m[(0, 1)],
            m[(0, 2)],
            m[(1, 0)],
            m[(1, 1)],
            m[(1, 2)],
            m[(2, 0)],
            m[(2, 1)],
        ]))
    }

    /// Coefficients `(a, b, c, d, e, f, g, h)`.
    pub fn coefficients(&self) -> [f64; 8] {
        self.coefficients
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        let [a, b, c, d, e, f, g, h] = self.coefficients;
        Matrix3::new(
            a, b, c, //
            d, e, f, //
            g, h, 1.0,
        )
    }

    pub fn inverse(&self) -> Option<Self> {
        self.to_matrix()
            .try_inverse()
            .and_then(|m| Self::from_matrix(&m))
    }

    /// Map a point without any quantization.
    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Result<Point2<f64>, GroundPlaneError> {
        let [a, b, c, d, e, f, g, h] = self.coefficients;
        let w = g * p.x + h * p.y + 1.0;
        if !w.is_finite() || w.abs() < DENOMINATOR_EPS {
            return Err(GroundPlaneError::ProjectionSingularity { x: p.x, y: p.y });
        }
        Ok(Point2::new(
            (a * p.x + b * p.y + c) / w,
            (d * p.x + e * p.y + f) / w,
        ))
    }
}

/// Sort four points into row-major order: top-left, top-right, bottom-left,
/// bottom-right.
///
/// Points are first ordered by `x + y * K` with `K` wider than the frame so
/// that the two upper points come first; each row is then ordered by x.
pub fn canonical_order(points: &[Point2<f64>; 4], frame: &FrameDimensions) -> [Point2<f64>; 4] {
    let k = (frame.width as f64 + 1.0).max(1000.0);
    let mut sorted = *points;
    sorted.sort_by(|p, q| (p.x + p.y * k).total_cmp(&(q.x + q.y * k)));
    if sorted[1].x < sorted[0].x {
        sorted.swap(0, 1);
    }
    if sorted[3].x < sorted[2].x {
        sorted.swap(2, 3);
    }
    sorted
}

/// Axis-aligned target rectangle for canonically ordered source points.
///
/// Left and right sides sit at the mean x of the corresponding quadrilateral
/// edges, the top at the mean y of the upper edge, and the height keeps the
/// frame aspect ratio.
pub fn target_rectangle(
    ordered: &[Point2<f64>; 4],
    frame: &FrameDimensions,
) -> Result<[Point2<f64>; 4], GroundPlaneError> {
    frame.validate()?;
    let [tl, tr, bl, br] = ordered;
    let left = (tl.x + bl.x) / 2.0;
    let right = (tr.x + br.x) / 2.0;
    let top = (tl.y + tr.y) / 2.0;

    let width = right - left;
    if !(width > 0.0) {
        return Err(GroundPlaneError::degenerate(format!(
            "target rectangle has non-positive width {width:.3}"
        )));
    }
    let height = width * frame.aspect();

    Ok([
        Point2::new(left, top),
        Point2::new(right, top),
        Point2::new(left, top + height),
        Point2::new(right, top + height),
    ])
}

/// Solve the transform that rectifies the calibration quadrilateral onto
/// its target rectangle.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn solve_homography(
    quad: &CalibrationQuadrilateral,
    frame: &FrameDimensions,
) -> Result<ProjectiveTransform, GroundPlaneError> {
    let src = quad.ordered_corners(frame)?;
    let dst = target_rectangle(&src, frame)?;
    debug!("homography target rectangle {dst:?}");

    let transform = homography_from_4pt(&src, &dst)?;
    info!("homography solved: {:?}", transform.coefficients());
    Ok(transform)
}

/// Compute the transform with `dst ~ T * src` from four correspondences.
///
/// Corner order must be consistent between `src` and `dst`.
pub fn homography_from_4pt(
    src: &[Point2<f64>; 4],
    dst: &[Point2<f64>; 4],
) -> Result<ProjectiveTransform, GroundPlaneError> {
    for p in src.iter().chain(dst.iter()) {
        if !(p.x.is_finite() && p.y.is_finite()) {
            return Err(GroundPlaneError::NonFiniteInput("homography correspondence"));
        }
    }
    ensure_no_collinear_triple(src)?;
    ensure_no_collinear_triple(dst)?;

    // Unknowns: [a b c d e f g h]
    // a x + b y + c - u g x - u h y = u
    // d x + e y + f - v g x - v h y = v
    let (src_n, t_src) = normalize_points4(src);
    let (dst_n, t_dst) = normalize_points4(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let x = src_n[k].x;
        let y = src_n[k].y;
        let u = dst_n[k].x;
        let v = dst_n[k].y;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a
        .lu()
        .solve(&b)
        .ok_or_else(|| GroundPlaneError::degenerate("singular 8x8 homography system"))?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let h = t_dst
        .try_inverse()
        .map(|t_dst_inv| t_dst_inv * hn * t_src)
        .and_then(|h| ProjectiveTransform::from_matrix(&h))
        .ok_or_else(|| GroundPlaneError::degenerate("homography denormalization failed"))?;

    if h.coefficients.iter().any(|c| !c.is_finite()) {
        return Err(GroundPlaneError::degenerate("non-finite homography coefficients"));
    }
    check_residuals(&h, src, dst)?;
    Ok(h)
}

fn check_residuals(
    h: &ProjectiveTransform,
    src: &[Point2<f64>; 4],
    dst: &[Point2<f64>; 4],
) -> Result<(), GroundPlaneError> {
    let tol = RESIDUAL_REL_EPS * max_extent(dst).max(1.0);
    for (s, d) in src.iter().zip(dst) {
        let mapped = h
            .apply(*s)
            .map_err(|_| GroundPlaneError::degenerate("calibration point maps to infinity"))?;
        let err = (mapped - *d).norm();
        if !(err <= tol) {
            return Err(GroundPlaneError::degenerate(format!(
                "homography is numerically unstable (residual {err:.3e} px)"
            )));
        }
    }
    Ok(())
}

fn max_extent(pts: &[Point2<f64>; 4]) -> f64 {
    let mut best = 0.0_f64;
    for (i, p) in pts.iter().enumerate() {
        for q in &pts[i + 1..] {
            best = best.max((*p - *q).norm());
        }
    }
    best
}

fn ensure_no_collinear_triple(pts: &[Point2<f64>; 4]) -> Result<(), GroundPlaneError> {
    let scale = max_extent(pts);
    if scale < 1e-12 {
        return Err(GroundPlaneError::degenerate("calibration points coincide"));
    }
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    for [i, j, k] in TRIPLES {
        let u = pts[j] - pts[i];
        let v = pts[k] - pts[i];
        let area2 = (u.x * v.y - u.y * v.x).abs();
        if area2 < COLLINEAR_REL_EPS * scale * scale {
            return Err(GroundPlaneError::degenerate(format!(
                "points {i}, {j} and {k} are collinear"
            )));
        }
    }
    Ok(())
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points4(pts: &[Point2<f64>; 4]) -> ([Point2<f64>; 4], Matrix3<f64>) {
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / 4.0;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = (*pts).map(|p| {
        let v = t * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0], v[1])
    });
    (out, t)
}
