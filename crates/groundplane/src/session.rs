//! Calibration session: the explicit state machine around the core primitives.
//!
//! Artifacts are computed once and cached. Each operation is gated on the
//! stage it needs; a failed step leaves the session untouched.

use groundplane_core::{
    classify, estimate_vanishing_point, solve_homography, CalibrationQuadrilateral, DepthFrame,
    DepthModel, DevicePose, GroundPlaneError, PointProjector, ProjectiveTransform, TiltCalibration,
    TiltCalibrator, TiltSensor, WorldMapper,
};
use log::{info, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::SessionConfig;

/// Calibration progress, in the order the stages are reached.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStage {
    Uninitialized,
    TiltCalibrated,
    QuadrilateralClassified,
    VanishingPointKnown,
    HomographyReady,
}

impl std::fmt::Display for CalibrationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CalibrationStage::Uninitialized => "uninitialized",
            CalibrationStage::TiltCalibrated => "tilt calibrated",
            CalibrationStage::QuadrilateralClassified => "quadrilateral classified",
            CalibrationStage::VanishingPointKnown => "vanishing point known",
            CalibrationStage::HomographyReady => "homography ready",
        };
        f.write_str(name)
    }
}

/// Errors returned by [`CalibrationSession`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("operation requires stage '{required}', session is at '{current}'")]
    StageNotReached {
        required: CalibrationStage,
        current: CalibrationStage,
    },
    #[error(transparent)]
    Geometry(#[from] GroundPlaneError),
}

/// Serializable copy of every cached artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    pub config: SessionConfig,
    pub pose: DevicePose,
    pub tilt: Option<TiltCalibration>,
    pub quadrilateral: Option<CalibrationQuadrilateral>,
    pub vanishing_point: Option<Point2<f64>>,
    pub projector: Option<PointProjector>,
}

#[derive(Clone, Debug)]
pub struct CalibrationSession {
    config: SessionConfig,
    pose: DevicePose,
    tilt: Option<TiltCalibration>,
    quadrilateral: Option<CalibrationQuadrilateral>,
    vanishing_point: Option<Point2<f64>>,
    projector: Option<PointProjector>,
}

impl Default for CalibrationSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl CalibrationSession {
    pub fn new(config: SessionConfig) -> Self {
        let pose = config.initial_pose();
        Self {
            config,
            pose,
            tilt: None,
            quadrilateral: None,
            vanishing_point: None,
            projector: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stage(&self) -> CalibrationStage {
        if self.tilt.is_none() {
            CalibrationStage::Uninitialized
        } else if self.quadrilateral.is_none() {
            CalibrationStage::TiltCalibrated
        } else if self.vanishing_point.is_none() {
            CalibrationStage::QuadrilateralClassified
        } else if self.projector.is_none() {
            CalibrationStage::VanishingPointKnown
        } else {
            CalibrationStage::HomographyReady
        }
    }

    fn not_reached(&self, required: CalibrationStage) -> SessionError {
        SessionError::StageNotReached {
            required,
            current: self.stage(),
        }
    }

    fn require(&self, required: CalibrationStage) -> Result<(), SessionError> {
        if self.stage() < required {
            return Err(self.not_reached(required));
        }
        Ok(())
    }

    pub fn tilt(&self) -> Option<&TiltCalibration> {
        self.tilt.as_ref()
    }

    pub fn quadrilateral(&self) -> Option<&CalibrationQuadrilateral> {
        self.quadrilateral.as_ref()
    }

    pub fn vanishing_point(&self) -> Option<Point2<f64>> {
        self.vanishing_point
    }

    pub fn projector(&self) -> Option<&PointProjector> {
        self.projector.as_ref()
    }

    pub fn transform(&self) -> Option<&ProjectiveTransform> {
        self.projector.as_ref().map(|p| &p.transform)
    }

    pub fn pose(&self) -> &DevicePose {
        &self.pose
    }

    pub fn set_heading(&mut self, heading_rad: f64) {
        self.pose.heading_rad = heading_rad;
    }

    pub fn set_origin(&mut self, origin: Point2<f64>) {
        self.pose.origin = origin;
    }

    /// Drop every calibration artifact; the device pose is kept.
    pub fn reset(&mut self) {
        self.tilt = None;
        self.reset_quadrilateral();
    }

    /// Drop the quadrilateral and everything derived from it.
    pub fn reset_quadrilateral(&mut self) {
        self.quadrilateral = None;
        self.vanishing_point = None;
        self.projector = None;
    }

    fn depth_model(&self) -> DepthModel {
        DepthModel::new(self.config.height_cm)
    }

    fn world_mapper(&self) -> WorldMapper {
        WorldMapper {
            frame: self.config.frame,
            output_scale: self.config.output_scale,
            lateral_reference: self.config.lateral_reference,
        }
    }

    /// Derive the viewport scale from tilt and the frame-center depth sample.
    ///
    /// Returns the cached result once calibrated.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn calibrate_tilt(
        &mut self,
        tilt_deg: f64,
        center_raw_depth: f64,
    ) -> Result<TiltCalibration, SessionError> {
        if let Some(cached) = self.tilt {
            if !cached.matches_inputs(tilt_deg, center_raw_depth) {
                warn!(
                    "viewport already calibrated; ignoring tilt {tilt_deg} deg \
                     with center sample {center_raw_depth}"
                );
            }
            return Ok(cached);
        }
        let calibrator =
            TiltCalibrator::new(self.depth_model(), self.config.fov_deg, self.config.frame);
        let cal = calibrator.calibrate(tilt_deg, center_raw_depth)?;
        self.tilt = Some(cal);
        Ok(cal)
    }

    /// Read tilt and the frame-center sample from the device and calibrate.
    pub fn calibrate_from_sensors(
        &mut self,
        tilt: &mut impl TiltSensor,
        depth: &impl DepthFrame,
    ) -> Result<TiltCalibration, SessionError> {
        if let Some(cached) = self.tilt {
            return Ok(cached);
        }
        let tilt_deg = tilt.tilt_degrees().ok_or(GroundPlaneError::TiltUnavailable)?;
        let (cx, cy) = self.config.frame.center_pixel();
        let center = depth
            .raw_depth(cx, cy)
            .ok_or(GroundPlaneError::DepthSampleUnavailable { x: cx, y: cy })?;
        self.calibrate_tilt(tilt_deg, center)
    }

    /// Assign the four floor points to corners.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn classify_points(
        &mut self,
        points: &[Point2<f64>],
    ) -> Result<CalibrationQuadrilateral, SessionError> {
        self.require(CalibrationStage::TiltCalibrated)?;
        if let Some(existing) = &self.quadrilateral {
            if existing.raw_points() != points {
                warn!("quadrilateral already classified; ignoring new calibration points");
            }
            return Ok(existing.clone());
        }
        let quad = classify(points, &self.config.frame, self.config.classifier_policy)?;
        info!("calibration quadrilateral classified");
        self.quadrilateral = Some(quad.clone());
        Ok(quad)
    }

    pub fn estimate_vanishing_point(&mut self) -> Result<Point2<f64>, SessionError> {
        if let Some(vp) = self.vanishing_point {
            return Ok(vp);
        }
        let Some(quad) = self.quadrilateral.as_ref() else {
            return Err(self.not_reached(CalibrationStage::QuadrilateralClassified));
        };
        let vp = estimate_vanishing_point(quad, &self.config.frame)?;
        self.vanishing_point = Some(vp);
        Ok(vp)
    }

    pub fn solve_homography(&mut self) -> Result<ProjectiveTransform, SessionError> {
        if let Some(projector) = &self.projector {
            return Ok(projector.transform);
        }
        self.require(CalibrationStage::VanishingPointKnown)?;
        let Some(quad) = self.quadrilateral.as_ref() else {
            return Err(self.not_reached(CalibrationStage::QuadrilateralClassified));
        };
        let transform = solve_homography(quad, &self.config.frame)?;
        let projector = PointProjector::new(
            transform,
            quad,
            &self.config.frame,
            self.config.raster_divisions,
        )?;
        self.projector = Some(projector);
        Ok(transform)
    }

    /// Classify, estimate the vanishing point and solve the homography.
    ///
    /// On failure the quadrilateral stages are rolled back so the caller can
    /// retry with corrected points.
    pub fn calibrate_quadrilateral(
        &mut self,
        points: &[Point2<f64>],
    ) -> Result<ProjectiveTransform, SessionError> {
        let already_classified = self.quadrilateral.is_some();
        let result = self.run_quadrilateral_steps(points);
        if result.is_err() && !already_classified {
            self.reset_quadrilateral();
        }
        result
    }

    fn run_quadrilateral_steps(
        &mut self,
        points: &[Point2<f64>],
    ) -> Result<ProjectiveTransform, SessionError> {
        self.classify_points(points)?;
        self.estimate_vanishing_point()?;
        self.solve_homography()
    }

    /// Rectified, rasterized position of an image point.
    pub fn project(&self, point: Point2<f64>) -> Result<Point2<f64>, SessionError> {
        let Some(projector) = self.projector.as_ref() else {
            return Err(self.not_reached(CalibrationStage::HomographyReady));
        };
        Ok(projector.project(point)?)
    }

    /// Horizontal position where the ray from the vanishing point through
    /// `point` meets the frame bottom, extended by the tilt pixel offset.
    pub fn perspective_frame_offset(&self, point: Point2<f64>) -> Result<f64, SessionError> {
        let (Some(vp), Some(tilt)) = (self.vanishing_point, self.tilt) else {
            return Err(self.not_reached(CalibrationStage::VanishingPointKnown));
        };
        let delta = point - vp;
        if delta.y.abs() < 1e-12 {
            return Err(GroundPlaneError::ProjectionSingularity {
                x: point.x,
                y: point.y,
            }
            .into());
        }
        let bottom = self.config.frame.height as f64 + tilt.vertical_pixel_offset;
        Ok((bottom - vp.y) * (delta.x / delta.y))
    }

    /// World position for a ground distance and horizontal image offset.
    pub fn map_to_world(
        &self,
        ground_distance_cm: f64,
        x_on_image_px: f64,
    ) -> Result<Point2<f64>, SessionError> {
        self.require(CalibrationStage::TiltCalibrated)?;
        Ok(self
            .world_mapper()
            .map(ground_distance_cm, x_on_image_px, &self.pose)?)
    }

    /// Raw depth sample -> ground distance -> world position.
    pub fn map_depth_sample_to_world(
        &self,
        raw_depth: f64,
        x_on_image_px: f64,
    ) -> Result<Point2<f64>, SessionError> {
        self.require(CalibrationStage::TiltCalibrated)?;
        let ground = self.depth_model().ground_distance_cm(raw_depth)?;
        self.map_to_world(ground, x_on_image_px)
    }

    /// Read the sample at `(x, y)` from a depth frame and map it to the world.
    pub fn map_pixel_to_world(
        &self,
        depth: &impl DepthFrame,
        x: u32,
        y: u32,
    ) -> Result<Point2<f64>, SessionError> {
        let raw = depth
            .raw_depth(x, y)
            .ok_or(GroundPlaneError::DepthSampleUnavailable { x, y })?;
        self.map_depth_sample_to_world(raw, x as f64)
    }

    pub fn snapshot(&self) -> CalibrationSnapshot {
        CalibrationSnapshot {
            config: self.config.clone(),
            pose: self.pose,
            tilt: self.tilt,
            quadrilateral: self.quadrilateral.clone(),
            vanishing_point: self.vanishing_point,
            projector: self.projector,
        }
    }

    /// Rebuild a session from a snapshot.
    ///
    /// Artifacts after the first missing one are dropped so the stage
    /// ordering still holds.
    pub fn restore(snapshot: CalibrationSnapshot) -> Self {
        let mut session = Self::new(snapshot.config);
        session.pose = snapshot.pose;
        session.tilt = snapshot.tilt;
        if session.tilt.is_some() {
            session.quadrilateral = snapshot.quadrilateral;
        }
        if session.quadrilateral.is_some() {
            session.vanishing_point = snapshot.vanishing_point;
        }
        if session.vanishing_point.is_some() {
            session.projector = snapshot.projector;
        }
        session
    }
}
