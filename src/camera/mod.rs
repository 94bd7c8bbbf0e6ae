//! Core functionality for the camera models used during rectification.
//!
//! It provides a unified interface for camera operations such as projecting 3D
//! rays to 2D image coordinates and unprojecting 2D image coordinates back to
//! 3D rays, together with definitions for camera intrinsic parameters, image
//! resolution and error handling for camera operations.
//!
//! Three model implementations are re-exported from submodules:
//! - `pinhole`: distortion-free projective model (also the rectified target)
//! - `rad_tan`: radial-tangential polynomial distortion
//! - `fov`: single-parameter field-of-view (ATAN) model for wide-angle lenses

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

pub mod fov;
pub mod pinhole;
pub mod rad_tan;

pub use fov::FovModel;
pub use pinhole::PinholeModel;
pub use rad_tan::RadTanModel;

/// Represents the intrinsic parameters of a camera.
///
/// These parameters define the internal geometry of the camera,
/// including focal length and principal point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    /// The focal length along the x-axis, in pixels.
    pub fx: f64,
    /// The focal length along the y-axis, in pixels.
    pub fy: f64,
    /// The x-coordinate of the principal point (optical center), in pixels.
    pub cx: f64,
    /// The y-coordinate of the principal point (optical center), in pixels.
    pub cy: f64,
}

/// Represents the resolution of a camera image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// The width of the image in pixels.
    pub width: u32,
    /// The height of the image in pixels.
    pub height: u32,
}

/// Defines the possible errors that can occur during camera model operations.
#[derive(thiserror::Error, Debug)]
pub enum CameraModelError {
    /// A 3D ray projects outside the valid image area.
    #[error("Projection is outside the image")]
    ProjectionOutSideImage,
    /// An input 2D point for unprojection is outside the valid image area.
    #[error("Input point is outside the image")]
    PointIsOutSideImage,
    /// A 3D point is too close to the camera center (z-coordinate near zero),
    /// making projection numerically unstable or undefined.
    #[error("z is close to zero, point is at camera center")]
    PointAtCameraCenter,
    /// A focal length parameter (fx or fy) is not positive.
    #[error("Focal length must be positive")]
    FocalLengthMustBePositive,
    /// A principal point coordinate (cx or cy) is not a finite number.
    #[error("Principal point must be finite")]
    PrincipalPointMustBeFinite,
    /// One or more camera parameters are invalid.
    #[error("Invalid camera parameters: {0}")]
    InvalidParams(String),
    /// Failure during YAML parsing when loading camera parameters.
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    /// Failure during file input/output operations.
    #[error("IO Error: {0}")]
    IOError(String),
    /// Numerical instability or non-convergence during calculations.
    #[error("NumericalError: {0}")]
    NumericalError(String),
}

impl From<std::io::Error> for CameraModelError {
    fn from(err: std::io::Error) -> Self {
        CameraModelError::IOError(err.to_string())
    }
}

impl From<yaml_rust::ScanError> for CameraModelError {
    fn from(err: yaml_rust::ScanError) -> Self {
        CameraModelError::YamlError(err.to_string())
    }
}

/// Defines the core functionality and interface for all camera models.
///
/// Any camera model usable for rectification must provide projection of a
/// camera-frame ray into pixel coordinates and the inverse, parameter
/// validation, and access to its intrinsics, resolution and distortion
/// coefficients.
pub trait CameraModel: Send + Sync {
    /// Projects a 3D point from the camera's coordinate system to 2D image coordinates.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::PointAtCameraCenter`] if the point's z-coordinate
    ///   is too close to zero.
    fn project(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError>;

    /// Unprojects a 2D image point to a 3D ray in the camera's coordinate system.
    ///
    /// The resulting vector is a direction ray originating from the camera
    /// center, normalized to unit length.
    fn unproject(&self, point_2d: &Vector2<f64>) -> Result<Vector3<f64>, CameraModelError>;

    /// Loads camera parameters from a YAML file.
    fn load_from_yaml(path: &str) -> Result<Self, CameraModelError>
    where
        Self: Sized;

    /// Saves the camera model's parameters to a YAML file.
    fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError>;

    /// Validates the current camera parameters.
    fn validate_params(&self) -> Result<(), CameraModelError>;

    /// Returns the resolution of the camera.
    fn get_resolution(&self) -> Resolution;

    /// Returns the intrinsic parameters of the camera.
    fn get_intrinsics(&self) -> Intrinsics;

    /// Returns the distortion parameters of the camera.
    ///
    /// The meaning and number of coefficients depend on the model.
    fn get_distortion(&self) -> Vec<f64>;

    /// Returns a string identifier for the specific camera model type.
    fn get_model_name(&self) -> &'static str;
}

/// Provides common validation functions for camera parameters.
pub mod validation {
    use super::*;

    /// Validates the intrinsic camera parameters.
    ///
    /// Checks that the focal lengths (fx, fy) are positive and the principal
    /// point coordinates (cx, cy) are finite numbers.
    pub fn validate_intrinsics(intrinsics: &Intrinsics) -> Result<(), CameraModelError> {
        if intrinsics.fx <= 0.0 || intrinsics.fy <= 0.0 {
            return Err(CameraModelError::FocalLengthMustBePositive);
        }
        if !intrinsics.cx.is_finite() || !intrinsics.cy.is_finite() {
            return Err(CameraModelError::PrincipalPointMustBeFinite);
        }
        Ok(())
    }
}

/// Common YAML I/O helpers shared by the camera model implementations.
///
/// All models use the same calibration file layout: parameters nested under a
/// `cam0` node with a `camera_model` tag, an `intrinsics` array
/// `[fx, fy, cx, cy, ...distortion]` and a `resolution` array `[width, height]`.
pub mod yaml_io {
    use super::*;
    use std::fs;
    use std::io::Write;
    use yaml_rust::YamlLoader;

    /// Parses intrinsics, resolution and trailing distortion parameters from a
    /// YAML calibration file.
    ///
    /// `min_intrinsics_len` is the minimum number of entries expected in the
    /// `intrinsics` array (4 for pinhole, 5 for FOV, 9 for rad-tan).
    ///
    /// # Errors
    ///
    /// Returns [`CameraModelError`] if the file cannot be read, the YAML is
    /// malformed, required nodes are missing or values have the wrong type.
    pub fn parse_yaml_camera(
        path: &str,
        min_intrinsics_len: usize,
    ) -> Result<(Intrinsics, Resolution, Vec<f64>), CameraModelError> {
        let contents = fs::read_to_string(path)?;
        let docs = YamlLoader::load_from_str(&contents)?;

        if docs.is_empty() {
            return Err(CameraModelError::InvalidParams(
                "Empty YAML document".to_string(),
            ));
        }

        let doc = &docs[0];
        let cam_node = &doc["cam0"];

        if cam_node.is_badvalue() {
            return Err(CameraModelError::InvalidParams(
                "Missing 'cam0' node in YAML".to_string(),
            ));
        }

        let intrinsics_yaml = cam_node["intrinsics"].as_vec().ok_or_else(|| {
            CameraModelError::InvalidParams(
                "YAML missing 'intrinsics' array under 'cam0'".to_string(),
            )
        })?;

        if intrinsics_yaml.len() < min_intrinsics_len {
            return Err(CameraModelError::InvalidParams(format!(
                "Intrinsics array must have at least {} elements, got {}",
                min_intrinsics_len,
                intrinsics_yaml.len()
            )));
        }

        let resolution_yaml = cam_node["resolution"].as_vec().ok_or_else(|| {
            CameraModelError::InvalidParams(
                "YAML missing 'resolution' array under 'cam0'".to_string(),
            )
        })?;

        if resolution_yaml.len() < 2 {
            return Err(CameraModelError::InvalidParams(
                "Resolution array must have at least 2 elements (width, height)".to_string(),
            ));
        }

        let as_f64 = |idx: usize, name: &str| {
            intrinsics_yaml[idx].as_f64().ok_or_else(|| {
                CameraModelError::InvalidParams(format!("Invalid {name}: not a float"))
            })
        };

        let intrinsics = Intrinsics {
            fx: as_f64(0, "fx")?,
            fy: as_f64(1, "fy")?,
            cx: as_f64(2, "cx")?,
            cy: as_f64(3, "cy")?,
        };

        let resolution = Resolution {
            width: resolution_yaml[0].as_i64().ok_or_else(|| {
                CameraModelError::InvalidParams("Invalid width: not an integer".to_string())
            })? as u32,
            height: resolution_yaml[1].as_i64().ok_or_else(|| {
                CameraModelError::InvalidParams("Invalid height: not an integer".to_string())
            })? as u32,
        };

        let mut extra_params = Vec::new();
        for (i, param_yaml) in intrinsics_yaml.iter().enumerate().skip(4) {
            let param = param_yaml.as_f64().ok_or_else(|| {
                CameraModelError::InvalidParams(format!(
                    "Invalid parameter at index {i}: not a float"
                ))
            })?;
            extra_params.push(param);
        }

        Ok((intrinsics, resolution, extra_params))
    }

    /// Reads the `camera_model` tag under `cam0`, if present.
    pub fn read_model_tag(path: &str) -> Result<Option<String>, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        let docs = YamlLoader::load_from_str(&contents)?;
        if docs.is_empty() {
            return Ok(None);
        }
        Ok(docs[0]["cam0"]["camera_model"].as_str().map(str::to_owned))
    }

    /// Saves camera model parameters to a YAML file in the standard layout:
    ///
    /// ```yaml
    /// cam0:
    ///   camera_model: <model_name>
    ///   intrinsics: [fx, fy, cx, cy, ...extra_params]
    ///   resolution: [width, height]
    /// ```
    pub fn save_yaml_camera(
        path: &str,
        model_name: &str,
        intrinsics: &Intrinsics,
        resolution: &Resolution,
        extra_params: &[f64],
    ) -> Result<(), CameraModelError> {
        let mut intrinsics_vec = vec![intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy];
        intrinsics_vec.extend_from_slice(extra_params);

        let yaml = serde_yaml::to_value(serde_yaml::Mapping::from_iter([(
            serde_yaml::Value::String("cam0".to_string()),
            serde_yaml::to_value(serde_yaml::Mapping::from_iter([
                (
                    serde_yaml::Value::String("camera_model".to_string()),
                    serde_yaml::Value::String(model_name.to_string()),
                ),
                (
                    serde_yaml::Value::String("intrinsics".to_string()),
                    serde_yaml::to_value(intrinsics_vec)
                        .map_err(|e| CameraModelError::YamlError(e.to_string()))?,
                ),
                (
                    serde_yaml::Value::String("resolution".to_string()),
                    serde_yaml::to_value(vec![resolution.width, resolution.height])
                        .map_err(|e| CameraModelError::YamlError(e.to_string()))?,
                ),
            ]))
            .map_err(|e| CameraModelError::YamlError(e.to_string()))?,
        )]))
        .map_err(|e| CameraModelError::YamlError(e.to_string()))?;

        let yaml_string =
            serde_yaml::to_string(&yaml).map_err(|e| CameraModelError::YamlError(e.to_string()))?;

        if let Some(parent) = std::path::Path::new(path).parent() {
            fs::create_dir_all(parent).map_err(|e| CameraModelError::IOError(e.to_string()))?;
        }

        let mut file =
            fs::File::create(path).map_err(|e| CameraModelError::IOError(e.to_string()))?;

        file.write_all(yaml_string.as_bytes())
            .map_err(|e| CameraModelError::IOError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;

    #[test]
    fn test_camera_model_names() {
        let fov_params = DVector::from_vec(vec![379.045, 379.008, 505.512, 509.969, 0.92594875]);
        let fov_model = fov::FovModel::new(&fov_params).unwrap();
        assert_eq!(fov_model.get_model_name(), "fov");

        let pinhole_params = DVector::from_vec(vec![460.0, 460.0, 320.0, 240.0]);
        let pinhole_model = pinhole::PinholeModel::new(&pinhole_params).unwrap();
        assert_eq!(pinhole_model.get_model_name(), "pinhole");

        let radtan_params = DVector::from_vec(vec![
            460.0, 460.0, 320.0, 240.0, -0.28, 0.07, 0.0002, 0.00002, 0.0,
        ]);
        let radtan_model = rad_tan::RadTanModel::new(&radtan_params).unwrap();
        assert_eq!(radtan_model.get_model_name(), "rad_tan");
    }

    #[test]
    fn test_validate_intrinsics() {
        let valid = Intrinsics {
            fx: 460.0,
            fy: 460.0,
            cx: 320.0,
            cy: 240.0,
        };
        assert!(validation::validate_intrinsics(&valid).is_ok());

        let mut bad_focal = valid.clone();
        bad_focal.fx = 0.0;
        assert!(matches!(
            validation::validate_intrinsics(&bad_focal),
            Err(CameraModelError::FocalLengthMustBePositive)
        ));

        let mut bad_center = valid.clone();
        bad_center.cy = f64::NAN;
        assert!(matches!(
            validation::validate_intrinsics(&bad_center),
            Err(CameraModelError::PrincipalPointMustBeFinite)
        ));
    }
}
