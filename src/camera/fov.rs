//! Field-of-View (FOV) camera model implementation.
//!
//! The single-parameter wide-angle model of Devernay and Faugeras, often
//! called the ATAN model. It is the calibration model used by monocular
//! dataset recordings with fisheye-like lenses and adheres to the
//! [`CameraModel`] trait defined in the parent `camera` module.
//!
//! # References
//!
//! Devernay, F., Faugeras, O. (2001). Straight lines have to be straight.
//! Machine Vision and Applications 13, 14-24.

use crate::camera::{validation, CameraModel, CameraModelError, Intrinsics, Resolution};
use log::info;
use nalgebra::{DVector, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Implements the Field-of-View camera model for wide-angle/fisheye lenses.
///
/// The model represents the camera using standard intrinsic parameters
/// ([`Intrinsics`]: fx, fy, cx, cy), the image [`Resolution`], and one
/// distortion parameter `w` controlling the field-of-view distortion
/// characteristic. `w` must lie in the range (ε, 3.0).
#[derive(Clone, Serialize, Deserialize)]
pub struct FovModel {
    /// Camera intrinsic parameters: `fx`, `fy`, `cx`, `cy`.
    pub intrinsics: Intrinsics,
    /// Image resolution as width and height in pixels.
    pub resolution: Resolution,
    /// Field-of-view distortion parameter.
    pub w: f64,
}

impl FovModel {
    /// Creates a new [`FovModel`] from a parameter vector `[fx, fy, cx, cy, w]`.
    ///
    /// The resolution is initialized to 0x0 and should be set explicitly or by
    /// loading from a calibration file.
    pub fn new(parameters: &DVector<f64>) -> Result<Self, CameraModelError> {
        if parameters.len() != 5 {
            return Err(CameraModelError::InvalidParams(format!(
                "Expected 5 parameters (fx, fy, cx, cy, w), got {}",
                parameters.len()
            )));
        }

        let model = FovModel {
            intrinsics: Intrinsics {
                fx: parameters[0],
                fy: parameters[1],
                cx: parameters[2],
                cy: parameters[3],
            },
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            w: parameters[4],
        };

        info!("new FOV model is: {model:?}");
        Ok(model)
    }
}

impl fmt::Debug for FovModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FOV [fx: {} fy: {} cx: {} cy: {} w: {}]",
            self.intrinsics.fx, self.intrinsics.fy, self.intrinsics.cx, self.intrinsics.cy, self.w
        )
    }
}

impl CameraModel for FovModel {
    /// Projects a 3D point from camera coordinates to 2D image coordinates.
    ///
    /// Computes the radial distance, applies the FOV distortion function using
    /// the `w` parameter, then scales by focal lengths and adds the principal
    /// point offset.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::PointAtCameraCenter`] if the point's z-coordinate
    ///   is too close to zero.
    fn project(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError> {
        let x = point_3d.x;
        let y = point_3d.y;
        let z = point_3d.z;

        if z < f64::EPSILON.sqrt() {
            return Err(CameraModelError::PointAtCameraCenter);
        }

        let r2 = x * x + y * y;
        let r = r2.sqrt();

        let tan_w_half = (self.w / 2.0).tan();
        let atan_wrd = (2.0 * tan_w_half * r).atan2(z);

        let eps_sqrt = f64::EPSILON.sqrt();

        let rd = if r2 < eps_sqrt {
            // For points very close to the optical axis, use the limit value
            2.0 * tan_w_half / self.w
        } else {
            atan_wrd / (r * self.w)
        };

        let mx = x * rd;
        let my = y * rd;

        let projected_x = self.intrinsics.fx * mx + self.intrinsics.cx;
        let projected_y = self.intrinsics.fy * my + self.intrinsics.cy;

        Ok(Vector2::new(projected_x, projected_y))
    }

    /// Unprojects a 2D image point to a normalized 3D ray in camera coordinates.
    ///
    /// Applies the inverse FOV distortion to the normalized image-plane
    /// coordinates and normalizes the resulting direction vector.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::PointIsOutSideImage`] if the pixel lies outside
    ///   the lens's image circle (distorted angle at or beyond 90 degrees);
    ///   with wide-angle calibrations this happens at the sensor corners.
    fn unproject(&self, point_2d: &Vector2<f64>) -> Result<Vector3<f64>, CameraModelError> {
        let u = point_2d.x;
        let v = point_2d.y;

        let tan_w_2 = (self.w / 2.0).tan();
        let mul2tanwby2 = tan_w_2 * 2.0;

        let mx = (u - self.intrinsics.cx) / self.intrinsics.fx;
        let my = (v - self.intrinsics.cy) / self.intrinsics.fy;

        let r2 = mx * mx + my * my;
        let rd = r2.sqrt();

        if rd * self.w >= std::f64::consts::FRAC_PI_2 {
            return Err(CameraModelError::PointIsOutSideImage);
        }

        let eps_sqrt = f64::EPSILON.sqrt();

        let (x, y, z) = if mul2tanwby2 > eps_sqrt && rd > eps_sqrt {
            let sin_rd_w = (rd * self.w).sin();
            let cos_rd_w = (rd * self.w).cos();
            let ru = sin_rd_w / (rd * mul2tanwby2);

            (mx * ru / cos_rd_w, my * ru / cos_rd_w, 1.0)
        } else {
            (mx, my, 1.0)
        };

        let point3d = Vector3::new(x, y, z);
        Ok(point3d.normalize())
    }

    /// Loads [`FovModel`] parameters from a YAML file.
    ///
    /// The intrinsics array is expected to be `[fx, fy, cx, cy, w]` under the
    /// `cam0` node, with the resolution alongside.
    fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        use crate::camera::yaml_io;

        let (intrinsics, resolution, extra_params) = yaml_io::parse_yaml_camera(path, 5)?;

        if extra_params.len() != 1 {
            return Err(CameraModelError::InvalidParams(format!(
                "FOV model expects exactly 5 parameters (fx, fy, cx, cy, w), got {}",
                4 + extra_params.len()
            )));
        }

        let model = FovModel {
            intrinsics,
            resolution,
            w: extra_params[0],
        };

        model.validate_params()?;
        Ok(model)
    }

    /// Saves the [`FovModel`] parameters to a YAML file, `w` as the fifth
    /// entry of the intrinsics array.
    fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        use crate::camera::yaml_io;

        yaml_io::save_yaml_camera(path, "fov", &self.intrinsics, &self.resolution, &[self.w])
    }

    /// Validates intrinsics and checks that `w` lies in (ε, 3.0].
    fn validate_params(&self) -> Result<(), CameraModelError> {
        validation::validate_intrinsics(&self.intrinsics)?;

        if !self.w.is_finite() || self.w <= f64::EPSILON || self.w > 3.0 {
            return Err(CameraModelError::InvalidParams(format!(
                "w must be in range (epsilon, 3.0], got {}",
                self.w
            )));
        }

        Ok(())
    }

    fn get_resolution(&self) -> Resolution {
        self.resolution
    }

    fn get_intrinsics(&self) -> Intrinsics {
        self.intrinsics.clone()
    }

    fn get_distortion(&self) -> Vec<f64> {
        vec![self.w]
    }

    fn get_model_name(&self) -> &'static str {
        "fov"
    }
}
