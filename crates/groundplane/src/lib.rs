//! Ground-plane calibration for a tilted overhead depth sensor.
//!
//! This crate wraps the numerical primitives of [`groundplane_core`] in a
//! [`CalibrationSession`] that walks through the calibration stages in
//! order, plus a JSON job/report layer used by the `groundplane` CLI.
//!
//! ## Quickstart
//!
//! ```
//! use groundplane::{CalibrationSession, SessionConfig};
//! use nalgebra::Point2;
//!
//! # fn main() -> Result<(), groundplane::SessionError> {
//! let mut session = CalibrationSession::new(SessionConfig::default());
//! session.calibrate_tilt(45.0, 600.0)?;
//! session.calibrate_quadrilateral(&[
//!     Point2::new(250.0, 180.0),
//!     Point2::new(410.0, 185.0),
//!     Point2::new(90.0, 420.0),
//!     Point2::new(560.0, 410.0),
//! ])?;
//!
//! let rectified = session.project(Point2::new(320.0, 300.0))?;
//! let world = session.map_depth_sample_to_world(650.0, 120.0)?;
//! println!("{rectified:?} {world:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `groundplane::core`: depth model, classifier, homography, projector, world mapper.
//! - [`CalibrationSession`]: staged calibration with cached artifacts.
//! - [`CalibrationJob`] / [`CalibrationReport`]: JSON input and output of the CLI.

pub use groundplane_core as core;

pub use groundplane_core::{
    Corner, DevicePose, FrameDimensions, GroundPlaneError, LateralReference, ProjectiveTransform,
    SideOverflowPolicy, TiltCalibration,
};

mod config;
mod session;

pub use config::{
    CalibrationJob, CalibrationReport, ConfigError, DepthQuery, DepthQueryResult,
    ImageQueryResult, SessionConfig,
};
pub use session::{CalibrationSession, CalibrationSnapshot, CalibrationStage, SessionError};
