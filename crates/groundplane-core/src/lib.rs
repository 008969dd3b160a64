//! Perspective calibration and ground-plane coordinate mapping for an
//! overhead depth sensor looking at the floor through a tilted view.
//!
//! This crate is purely numerical. Depth frames and tilt readings come in
//! through the [`DepthFrame`] and [`TiltSensor`] traits; nothing here talks
//! to a device or draws on an image.
//!
//! Pipeline, leaves first:
//! - [`classify`] assigns four floor points to quadrilateral corners.
//! - [`DepthModel`] turns raw depth samples into slant and ground distances.
//! - [`TiltCalibrator`] derives pixel-per-centimeter scales from tilt and height.
//! - [`estimate_vanishing_point`] extends the right floor edge to the centerline.
//! - [`solve_homography`] rectifies the quadrilateral onto an upright rectangle.
//! - [`PointProjector`] maps image points through it and snaps them to a grid.
//! - [`WorldMapper`] combines distance, image offset and device pose.

mod depth;
mod error;
mod frame;
mod homography;
mod logger;
mod quad;
mod raster;
mod tilt;
mod vanishing;
mod world;

pub use depth::{DepthFrame, DepthImage, DepthModel, DEFAULT_HEIGHT_CM};
pub use error::{FrameSide, GroundPlaneError};
pub use frame::FrameDimensions;
pub use homography::{
    canonical_order, homography_from_4pt, solve_homography, target_rectangle, ProjectiveTransform,
};
pub use quad::{classify, CalibrationQuadrilateral, Corner, SideOverflowPolicy};
pub use raster::{project, PointProjector, RasterGrid, DEFAULT_RASTER_DIVISIONS};
pub use tilt::{FixedTilt, TiltCalibration, TiltCalibrator, TiltSensor, DEFAULT_FOV_DEG};
pub use vanishing::estimate_vanishing_point;
pub use world::{DevicePose, LateralReference, WorldMapper, DEFAULT_OUTPUT_SCALE};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{filter_directive, init_with_level, init_with_verbosity, level_for_verbosity};
