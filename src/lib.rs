//! Mono Rectify
//!
//! Batch image rectification for monocular dataset sequences. A sequence is a
//! directory of ordered raw frames plus one calibration descriptor; this crate
//! loads the calibration, precomputes a per-pixel rectification map and
//! resamples every frame into a geometrically undistorted output written to a
//! `rect/` subdirectory of the sequence.
//!
//! The crate is organized leaf to root:
//! - [`camera`]: camera model trait and implementations (pinhole,
//!   radial-tangential, FOV/ATAN)
//! - [`calib`]: per-sequence calibration descriptor parsing
//! - [`rectify`]: rectification map construction and frame resampling
//! - [`sequence`]: per-sequence batch runner and multi-sequence dispatch

pub mod calib;
pub mod camera;
pub mod rectify;
pub mod sequence;

// Re-export commonly used types
pub use calib::{load_calibration, OutputMode, OutputSpec, SequenceCalibration};
pub use camera::{
    CameraModel, CameraModelError, FovModel, Intrinsics, PinholeModel, RadTanModel, Resolution,
};
pub use rectify::{InterpolationMethod, RectificationMap, RectifyError};
pub use sequence::{
    rectify_batch, FrameFailure, RectifyConfig, SequenceRectifier, SequenceSummary,
};
