//! Pinhole camera model implementation.
//!
//! The distortion-free projective model. Besides describing already-rectified
//! cameras it doubles as the target model of the rectification map: output
//! pixels are back-projected through a pinhole before being pushed through the
//! distorted source model.

use crate::camera::{validation, CameraModel, CameraModelError, Intrinsics, Resolution};
use log::info;
use nalgebra::{DVector, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Implements the pinhole camera model without lens distortion.
///
/// The model is fully described by the standard intrinsic parameters
/// ([`Intrinsics`]: fx, fy, cx, cy) and the image [`Resolution`].
#[derive(Clone, Serialize, Deserialize)]
pub struct PinholeModel {
    /// Camera intrinsic parameters: `fx`, `fy`, `cx`, `cy`.
    pub intrinsics: Intrinsics,
    /// Image resolution as width and height in pixels.
    pub resolution: Resolution,
}

impl PinholeModel {
    /// Creates a new [`PinholeModel`] from a parameter vector `[fx, fy, cx, cy]`.
    ///
    /// The resolution is initialized to 0x0 and should be set explicitly or by
    /// loading from a calibration file.
    pub fn new(parameters: &DVector<f64>) -> Result<Self, CameraModelError> {
        if parameters.len() != 4 {
            return Err(CameraModelError::InvalidParams(format!(
                "Expected 4 parameters (fx, fy, cx, cy), got {}",
                parameters.len()
            )));
        }

        let model = PinholeModel {
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
        };

        info!("new pinhole model is: {model:?}");
        Ok(model)
    }

    /// Creates a pinhole model directly from intrinsics and resolution.
    pub fn from_parts(intrinsics: Intrinsics, resolution: Resolution) -> Self {
        PinholeModel {
            intrinsics,
            resolution,
        }
    }
}

impl fmt::Debug for PinholeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pinhole [fx: {} fy: {} cx: {} cy: {}]",
            self.intrinsics.fx, self.intrinsics.fy, self.intrinsics.cx, self.intrinsics.cy
        )
    }
}

impl CameraModel for PinholeModel {
    /// Projects a 3D point by perspective division and focal scaling.
    fn project(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError> {
        if point_3d.z < f64::EPSILON.sqrt() {
            return Err(CameraModelError::PointAtCameraCenter);
        }

        let x_prime = point_3d.x / point_3d.z;
        let y_prime = point_3d.y / point_3d.z;

        let u = self.intrinsics.fx * x_prime + self.intrinsics.cx;
        let v = self.intrinsics.fy * y_prime + self.intrinsics.cy;

        Ok(Vector2::new(u, v))
    }

    /// Unprojects a pixel to the normalized ray `((u-cx)/fx, (v-cy)/fy, 1)`.
    fn unproject(&self, point_2d: &Vector2<f64>) -> Result<Vector3<f64>, CameraModelError> {
        let mx = (point_2d.x - self.intrinsics.cx) / self.intrinsics.fx;
        let my = (point_2d.y - self.intrinsics.cy) / self.intrinsics.fy;

        Ok(Vector3::new(mx, my, 1.0).normalize())
    }

    fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        use crate::camera::yaml_io;

        let (intrinsics, resolution, extra_params) = yaml_io::parse_yaml_camera(path, 4)?;

        if !extra_params.is_empty() && extra_params.iter().any(|p| *p != 0.0) {
            return Err(CameraModelError::InvalidParams(format!(
                "Pinhole model expects exactly 4 parameters (fx, fy, cx, cy), got {}",
                4 + extra_params.len()
            )));
        }

        let model = PinholeModel {
            intrinsics,
            resolution,
        };

        model.validate_params()?;
        Ok(model)
    }

    fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        use crate::camera::yaml_io;

        yaml_io::save_yaml_camera(path, "pinhole", &self.intrinsics, &self.resolution, &[])
    }

    fn validate_params(&self) -> Result<(), CameraModelError> {
        validation::validate_intrinsics(&self.intrinsics)
    }

    fn get_resolution(&self) -> Resolution {
        self.resolution
    }

    fn get_intrinsics(&self) -> Intrinsics {
        self.intrinsics.clone()
    }

    fn get_distortion(&self) -> Vec<f64> {
        Vec::new()
    }

    fn get_model_name(&self) -> &'static str {
        "pinhole"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn get_sample_model() -> PinholeModel {
        PinholeModel {
            intrinsics: Intrinsics {
                fx: 460.0,
                fy: 460.0,
                cx: 320.0,
                cy: 240.0,
            },
            resolution: Resolution {
                width: 640,
                height: 480,
            },
        }
    }

    #[test]
    fn test_project_unproject() {
        let model = get_sample_model();

        let point_3d = Vector3::new(0.2, -0.1, 2.0);
        let norm_3d = point_3d.normalize();

        let point_2d = model.project(&point_3d).unwrap();
        let unprojected = model.unproject(&point_2d).unwrap();

        assert_relative_eq!(norm_3d.x, unprojected.x, epsilon = 1e-10);
        assert_relative_eq!(norm_3d.y, unprojected.y, epsilon = 1e-10);
        assert_relative_eq!(norm_3d.z, unprojected.z, epsilon = 1e-10);
    }

    #[test]
    fn test_optical_axis_hits_principal_point() {
        let model = get_sample_model();
        let point_2d = model.project(&Vector3::new(0.0, 0.0, 1.0)).unwrap();
        assert_relative_eq!(point_2d.x, model.intrinsics.cx, epsilon = 1e-12);
        assert_relative_eq!(point_2d.y, model.intrinsics.cy, epsilon = 1e-12);
    }

    #[test]
    fn test_project_point_behind_camera() {
        let model = get_sample_model();
        let result = model.project(&Vector3::new(0.1, 0.2, -1.0));
        assert!(matches!(result, Err(CameraModelError::PointAtCameraCenter)));
    }

    #[test]
    fn test_new_invalid_param_count() {
        let params = DVector::from_vec(vec![460.0, 460.0, 320.0]);
        assert!(matches!(
            PinholeModel::new(&params),
            Err(CameraModelError::InvalidParams(_))
        ));
    }
}
