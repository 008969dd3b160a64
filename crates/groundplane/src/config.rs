//! JSON configuration, calibration jobs and reports.

use groundplane_core::{
    Corner, DevicePose, FrameDimensions, LateralReference, SideOverflowPolicy, DEFAULT_FOV_DEG,
    DEFAULT_HEIGHT_CM, DEFAULT_OUTPUT_SCALE, DEFAULT_RASTER_DIVISIONS,
};
use log::{info, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{CalibrationSession, CalibrationSnapshot, CalibrationStage, SessionError};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Sensor geometry and mapping options for a calibration session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub frame: FrameDimensions,
    /// Mounting height above the floor.
    pub height_cm: f64,
    /// Full field of view.
    pub fov_deg: f64,
    /// Grid cells across the quadrilateral used for rasterization.
    pub raster_divisions: u32,
    /// Scale applied to world coordinates (0.1 turns cm into output units).
    pub output_scale: f64,
    pub classifier_policy: SideOverflowPolicy,
    pub lateral_reference: LateralReference,
    pub heading_deg: f64,
    pub origin: Point2<f64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame: FrameDimensions::default(),
            height_cm: DEFAULT_HEIGHT_CM,
            fov_deg: DEFAULT_FOV_DEG,
            raster_divisions: DEFAULT_RASTER_DIVISIONS,
            output_scale: DEFAULT_OUTPUT_SCALE,
            classifier_policy: SideOverflowPolicy::default(),
            lateral_reference: LateralReference::default(),
            heading_deg: 0.0,
            origin: Point2::origin(),
        }
    }
}

impl SessionConfig {
    pub fn initial_pose(&self) -> DevicePose {
        DevicePose::new(self.origin, self.heading_deg.to_radians())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Depth reading to be mapped into world coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepthQuery {
    pub raw_depth: f64,
    pub x_on_image_px: f64,
}

/// Everything needed for one offline calibration run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationJob {
    #[serde(default)]
    pub config: SessionConfig,
    pub tilt_deg: f64,
    /// Raw depth sample at the frame center.
    pub center_raw_depth: f64,
    /// The four floor points picked in the image.
    pub points: Vec<Point2<f64>>,
    /// Image points to rectify.
    #[serde(default)]
    pub image_queries: Vec<Point2<f64>>,
    #[serde(default)]
    pub depth_queries: Vec<DepthQuery>,
    #[serde(default)]
    pub output_path: Option<String>,
}

impl CalibrationJob {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Where the report goes; `None` means stdout.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.output_path.as_ref().map(PathBuf::from)
    }

    /// Calibrate a fresh session and evaluate every query.
    ///
    /// Calibration failures are recorded in the report; queries are only
    /// evaluated against a fully calibrated session.
    pub fn run(&self) -> CalibrationReport {
        let mut session = CalibrationSession::new(self.config.clone());
        let calibrated = session
            .calibrate_tilt(self.tilt_deg, self.center_raw_depth)
            .and_then(|_| session.calibrate_quadrilateral(&self.points));

        let mut report = CalibrationReport::new(&session);
        if let Err(err) = calibrated {
            warn!("calibration failed: {err}");
            report.error = Some(err.to_string());
            return report;
        }
        info!("calibration complete");

        report.image_queries = self
            .image_queries
            .iter()
            .map(|&p| ImageQueryResult::evaluate(&session, p))
            .collect();
        report.depth_queries = self
            .depth_queries
            .iter()
            .map(|&q| DepthQueryResult::evaluate(&session, q))
            .collect();
        report
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageQueryResult {
    pub input: Point2<f64>,
    #[serde(default)]
    pub rectified: Option<Point2<f64>>,
    #[serde(default)]
    pub perspective_frame_x: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ImageQueryResult {
    fn evaluate(session: &CalibrationSession, input: Point2<f64>) -> Self {
        let mut errors = Vec::new();
        let rectified = record(session.project(input), &mut errors);
        let perspective_frame_x = record(session.perspective_frame_offset(input), &mut errors);
        Self {
            input,
            rectified,
            perspective_frame_x,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepthQueryResult {
    pub query: DepthQuery,
    #[serde(default)]
    pub world: Option<Point2<f64>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DepthQueryResult {
    fn evaluate(session: &CalibrationSession, query: DepthQuery) -> Self {
        let mut errors = Vec::new();
        let world = record(
            session.map_depth_sample_to_world(query.raw_depth, query.x_on_image_px),
            &mut errors,
        );
        Self {
            query,
            world,
            error: errors.pop(),
        }
    }
}

fn record<T>(result: Result<T, SessionError>, errors: &mut Vec<String>) -> Option<T> {
    result.map_err(|err| errors.push(err.to_string())).ok()
}

/// Output of a calibration run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub stage: CalibrationStage,
    #[serde(default)]
    pub error: Option<String>,
    /// Classified corners in TL, TR, BL, BR order.
    #[serde(default)]
    pub corners: Option<[Point2<f64>; 4]>,
    /// Transform coefficients `(a, b, c, d, e, f, g, h)`.
    #[serde(default)]
    pub transform: Option<[f64; 8]>,
    pub snapshot: CalibrationSnapshot,
    #[serde(default)]
    pub image_queries: Vec<ImageQueryResult>,
    #[serde(default)]
    pub depth_queries: Vec<DepthQueryResult>,
}

impl CalibrationReport {
    pub fn new(session: &CalibrationSession) -> Self {
        let corners = session.quadrilateral().and_then(|q| {
            let [tl, tr, bl, br] = Corner::ALL.map(|c| q.corner(c));
            Some([tl?, tr?, bl?, br?])
        });
        Self {
            stage: session.stage(),
            error: None,
            corners,
            transform: session.transform().map(|t| t.coefficients()),
            snapshot: session.snapshot(),
            image_queries: Vec::new(),
            depth_queries: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_reference_rig_defaults() {
        let cfg: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, SessionConfig::default());
        assert_eq!(cfg.frame, FrameDimensions::new(640, 480));
        assert_eq!(cfg.height_cm, 38.0);
        assert_eq!(cfg.fov_deg, 62.7);
        assert_eq!(cfg.raster_divisions, 4);
        assert_eq!(cfg.output_scale, 0.1);
    }

    #[test]
    fn enums_use_snake_case() {
        let cfg: SessionConfig = serde_json::from_str(
            r#"{ "classifier_policy": "reject", "lateral_reference": "frame_center" }"#,
        )
        .unwrap();
        assert_eq!(cfg.classifier_policy, SideOverflowPolicy::Reject);
        assert_eq!(cfg.lateral_reference, LateralReference::FrameCenter);
    }

    #[test]
    fn job_runs_and_reports_failures() {
        let job = CalibrationJob {
            config: SessionConfig::default(),
            tilt_deg: 0.0,
            center_raw_depth: 600.0,
            points: vec![],
            image_queries: vec![Point2::new(1.0, 1.0)],
            depth_queries: vec![],
            output_path: None,
        };
        let report = job.run();
        assert!(!report.is_success());
        assert_eq!(report.stage, CalibrationStage::Uninitialized);
        assert!(report.image_queries.is_empty());
    }

    #[test]
    fn minimal_job_uses_defaults() {
        let job: CalibrationJob = serde_json::from_str(
            r#"{ "tilt_deg": 45.0, "center_raw_depth": 600.0, "points": [] }"#,
        )
        .unwrap();
        assert_eq!(job.config, SessionConfig::default());
        assert!(job.image_queries.is_empty());
        assert!(job.output_path().is_none());
    }
}
