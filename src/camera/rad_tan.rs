//! Radial-tangential (Brown-Conrady) distortion model implementation.
//!
//! The polynomial distortion model commonly paired with a pinhole projection:
//! radial terms `k1, k2, k3` and tangential terms `p1, p2`. The forward
//! direction is closed-form; unprojection inverts the distortion with a
//! Newton iteration on the normalized image plane.

use crate::camera::{validation, CameraModel, CameraModelError, Intrinsics, Resolution};
use log::info;
use nalgebra::{DVector, Matrix2, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Implements the radial-tangential distortion model.
///
/// # Fields
///
/// *   `intrinsics`: [`Intrinsics`] - Focal lengths (fx, fy) and principal point (cx, cy).
/// *   `resolution`: [`Resolution`] - Image width and height in pixels.
/// *   `distortion`: `[f64; 5]` - Distortion coefficients `[k1, k2, p1, p2, k3]`.
#[derive(Clone, Serialize, Deserialize)]
pub struct RadTanModel {
    /// Camera intrinsic parameters: `fx`, `fy`, `cx`, `cy`.
    pub intrinsics: Intrinsics,
    /// Image resolution as width and height in pixels.
    pub resolution: Resolution,
    /// Distortion coefficients `[k1, k2, p1, p2, k3]`.
    pub distortion: [f64; 5],
}

impl RadTanModel {
    /// Creates a new [`RadTanModel`] from a parameter vector
    /// `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`.
    ///
    /// The resolution is initialized to 0x0 and should be set explicitly or by
    /// loading from a calibration file.
    pub fn new(parameters: &DVector<f64>) -> Result<Self, CameraModelError> {
        if parameters.len() != 9 {
            return Err(CameraModelError::InvalidParams(format!(
                "Expected 9 parameters (fx, fy, cx, cy, k1, k2, p1, p2, k3), got {}",
                parameters.len()
            )));
        }

        let model = RadTanModel {
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
            distortion: [
                parameters[4],
                parameters[5],
                parameters[6],
                parameters[7],
                parameters[8],
            ],
        };

        info!("new rad-tan model is: {model:?}");
        Ok(model)
    }

    /// Applies the distortion polynomial to a normalized image-plane point.
    fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let [k1, k2, p1, p2, k3] = self.distortion;

        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;

        let x_distorted = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let y_distorted = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;

        (x_distorted, y_distorted)
    }
}

impl fmt::Debug for RadTanModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RadTan [fx: {} fy: {} cx: {} cy: {} k1: {} k2: {} p1: {} p2: {} k3: {}]",
            self.intrinsics.fx,
            self.intrinsics.fy,
            self.intrinsics.cx,
            self.intrinsics.cy,
            self.distortion[0],
            self.distortion[1],
            self.distortion[2],
            self.distortion[3],
            self.distortion[4],
        )
    }
}

impl CameraModel for RadTanModel {
    /// Projects a 3D point to pixel coordinates through the distortion polynomial.
    fn project(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError> {
        if point_3d.z < f64::EPSILON.sqrt() {
            return Err(CameraModelError::PointAtCameraCenter);
        }

        let x_prime = point_3d.x / point_3d.z;
        let y_prime = point_3d.y / point_3d.z;

        let (x_distorted, y_distorted) = self.distort(x_prime, y_prime);

        let u = self.intrinsics.fx * x_distorted + self.intrinsics.cx;
        let v = self.intrinsics.fy * y_distorted + self.intrinsics.cy;

        Ok(Vector2::new(u, v))
    }

    /// Unprojects a pixel to a 3D ray by inverting the distortion polynomial.
    ///
    /// The inverse has no closed form; a Newton iteration on the normalized
    /// image plane refines the undistorted point until the reprojected error
    /// drops below 1e-6 (at most 100 iterations, fixed, so results are
    /// deterministic).
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::NumericalError`] if the iteration hits a singular
    ///   Jacobian or fails to converge.
    fn unproject(&self, point_2d: &Vector2<f64>) -> Result<Vector3<f64>, CameraModelError> {
        const EPS: f64 = 1e-6;
        const MAX_ITERATIONS: u32 = 100;

        let target = Vector2::new(
            (point_2d.x - self.intrinsics.cx) / self.intrinsics.fx,
            (point_2d.y - self.intrinsics.cy) / self.intrinsics.fy,
        );

        let [k1, k2, p1, p2, k3] = self.distortion;

        // Start the iteration from the distorted position.
        let mut point = target;
        let mut converged = false;

        for _ in 0..MAX_ITERATIONS {
            let x = point.x;
            let y = point.y;
            let r2 = x * x + y * y;
            let r4 = r2 * r2;

            let (x_est, y_est) = self.distort(x, y);
            let error = Vector2::new(x_est, y_est) - target;

            if error.norm() < EPS {
                converged = true;
                break;
            }

            let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r4 * r2;
            // d(radial)/d(r2) chain term shared by all four Jacobian entries.
            let d_radial = k1 + 2.0 * k2 * r2 + 3.0 * k3 * r4;

            let j00 = radial + 2.0 * x * x * d_radial + 2.0 * p1 * y + 6.0 * p2 * x;
            let j01 = 2.0 * x * y * d_radial + 2.0 * p1 * x + 2.0 * p2 * y;
            let j10 = 2.0 * x * y * d_radial + 2.0 * p1 * x + 2.0 * p2 * y;
            let j11 = radial + 2.0 * y * y * d_radial + 6.0 * p1 * y + 2.0 * p2 * x;

            let jacobian = Matrix2::new(j00, j01, j10, j11);
            let delta = jacobian.lu().solve(&error).ok_or_else(|| {
                CameraModelError::NumericalError("Singular Jacobian in unprojection".to_string())
            })?;

            point -= delta;
        }

        if !converged {
            return Err(CameraModelError::NumericalError(
                "Unprojection did not converge".to_string(),
            ));
        }

        Ok(Vector3::new(point.x, point.y, 1.0).normalize())
    }

    fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        use crate::camera::yaml_io;

        // Rad-tan stores 5 distortion coefficients after the 4 intrinsics.
        let (intrinsics, resolution, extra_params) = yaml_io::parse_yaml_camera(path, 9)?;

        if extra_params.len() != 5 {
            return Err(CameraModelError::InvalidParams(format!(
                "RadTan model expects 9 parameters (fx, fy, cx, cy, k1, k2, p1, p2, k3), got {}",
                4 + extra_params.len()
            )));
        }

        let model = RadTanModel {
            intrinsics,
            resolution,
            distortion: [
                extra_params[0],
                extra_params[1],
                extra_params[2],
                extra_params[3],
                extra_params[4],
            ],
        };

        model.validate_params()?;
        Ok(model)
    }

    fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        use crate::camera::yaml_io;

        yaml_io::save_yaml_camera(
            path,
            "rad_tan",
            &self.intrinsics,
            &self.resolution,
            &self.distortion,
        )
    }

    fn validate_params(&self) -> Result<(), CameraModelError> {
        validation::validate_intrinsics(&self.intrinsics)?;

        if self.distortion.iter().any(|c| !c.is_finite()) {
            return Err(CameraModelError::InvalidParams(
                "Distortion coefficients must be finite".to_string(),
            ));
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
        self.distortion.to_vec()
    }

    fn get_model_name(&self) -> &'static str {
        "rad_tan"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn get_sample_model() -> RadTanModel {
        RadTanModel {
            intrinsics: Intrinsics {
                fx: 461.629,
                fy: 460.152,
                cx: 362.680,
                cy: 246.049,
            },
            resolution: Resolution {
                width: 752,
                height: 480,
            },
            distortion: [-0.28340811, 0.07395907, 0.00019359, 1.76187114e-05, 0.0],
        }
    }

    #[test]
    fn test_project_unproject() {
        let model = get_sample_model();

        let point_3d = Vector3::new(0.1, -0.05, 1.5);
        let norm_3d = point_3d.normalize();

        let point_2d = model.project(&point_3d).unwrap();
        let unprojected = model.unproject(&point_2d).unwrap();

        assert_relative_eq!(norm_3d.x, unprojected.x, epsilon = 1e-6);
        assert_relative_eq!(norm_3d.y, unprojected.y, epsilon = 1e-6);
        assert_relative_eq!(norm_3d.z, unprojected.z, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_distortion_matches_pinhole() {
        let mut model = get_sample_model();
        model.distortion = [0.0; 5];

        let point_3d = Vector3::new(0.2, 0.1, 2.0);
        let point_2d = model.project(&point_3d).unwrap();

        let expected_u = model.intrinsics.fx * 0.1 + model.intrinsics.cx;
        let expected_v = model.intrinsics.fy * 0.05 + model.intrinsics.cy;
        assert_relative_eq!(point_2d.x, expected_u, epsilon = 1e-12);
        assert_relative_eq!(point_2d.y, expected_v, epsilon = 1e-12);
    }

    #[test]
    fn test_project_point_at_center() {
        let model = get_sample_model();
        let result = model.project(&Vector3::new(0.0, 0.0, 0.0));
        assert!(matches!(result, Err(CameraModelError::PointAtCameraCenter)));
    }

    #[test]
    fn test_validate_params_rejects_nan_coefficient() {
        let mut model = get_sample_model();
        model.distortion[1] = f64::NAN;
        assert!(matches!(
            model.validate_params(),
            Err(CameraModelError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_getters() {
        let model = get_sample_model();
        assert_eq!(model.get_distortion().len(), 5);
        assert_eq!(model.get_resolution().width, 752);
        assert_relative_eq!(model.get_intrinsics().fx, 461.629);
    }
}
