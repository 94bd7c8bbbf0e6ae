//! Per-sequence calibration descriptor loading.
//!
//! A sequence carries exactly one calibration descriptor. Two formats are
//! accepted:
//!
//! - the plain-text `camera.txt` convention of monocular dataset recordings:
//!   ```text
//!   fx fy cx cy w                  # 5 values -> FOV model (w == 0 -> pinhole)
//!   fx fy cx cy k1 k2 p1 p2        # 8 values -> radial-tangential model
//!   in_width in_height
//!   crop | full | none | fx fy cx cy 0
//!   out_width out_height
//!   ```
//!   Intrinsics with `fx <= 1` are interpreted as given relative to the image
//!   size and are rescaled to pixels (`fx*W, fy*H, cx*W - 0.5, cy*H - 0.5`).
//!
//! - a YAML descriptor in the `cam0` layout understood by
//!   [`crate::camera::yaml_io`], selected by a `.yaml`/`.yml` extension.

use std::fs;
use std::path::Path;

use log::{debug, info};
use nalgebra::DVector;

use crate::camera::{CameraModel, FovModel, Intrinsics, PinholeModel, RadTanModel, Resolution};
use crate::rectify::RectifyError;

/// How the target intrinsics of the rectified output are chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputMode {
    /// Keep the source intrinsics, scaled to the output size.
    None,
    /// Largest output region containing only valid source pixels.
    Crop,
    /// Output region covering every source pixel; corners may be fill-valued.
    Full,
    /// Explicit target intrinsics, given relative to the output size.
    Explicit(Intrinsics),
}

/// Target projection and size of the rectified output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub mode: OutputMode,
    pub resolution: Resolution,
}

/// One sequence's calibration: the distorted source camera plus the requested
/// rectified output.
pub struct SequenceCalibration {
    /// The distorted camera the frames were recorded with.
    pub model: Box<dyn CameraModel>,
    /// Requested rectified output projection and size.
    pub output: OutputSpec,
}

impl SequenceCalibration {
    /// Input resolution the frames must match.
    pub fn input_resolution(&self) -> Resolution {
        self.model.get_resolution()
    }
}

/// Loads a sequence calibration descriptor.
///
/// Dispatches on the file extension: `.yaml`/`.yml` descriptors go through the
/// YAML loader, everything else is parsed as `camera.txt`.
///
/// # Errors
///
/// * [`RectifyError::MalformedCalibration`] for missing/non-numeric fields
/// * [`RectifyError::UnsupportedModel`] for an unrecognized model arity or
///   output mode token
pub fn load_calibration(path: &Path) -> Result<SequenceCalibration, RectifyError> {
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    if is_yaml {
        load_yaml_calibration(path)
    } else {
        load_camera_txt(path)
    }
}

fn malformed(msg: impl Into<String>) -> RectifyError {
    RectifyError::MalformedCalibration(msg.into())
}

fn parse_floats(line: &str, what: &str) -> Result<Vec<f64>, RectifyError> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| malformed(format!("non-numeric value '{tok}' in {what} line")))
        })
        .collect()
}

fn parse_resolution(line: &str, what: &str) -> Result<Resolution, RectifyError> {
    let values: Vec<u32> = line
        .split_whitespace()
        .map(|tok| {
            tok.parse::<u32>()
                .map_err(|_| malformed(format!("non-integer value '{tok}' in {what} line")))
        })
        .collect::<Result<_, _>>()?;

    if values.len() != 2 {
        return Err(malformed(format!(
            "{what} line must contain 'width height', got {} values",
            values.len()
        )));
    }
    if values[0] == 0 || values[1] == 0 {
        return Err(malformed(format!("{what} dimensions must be non-zero")));
    }

    Ok(Resolution {
        width: values[0],
        height: values[1],
    })
}

/// Rescales relative intrinsics to pixels. The half-pixel shift moves the
/// principal point from corner-based to center-based pixel coordinates.
fn rescale_if_relative(values: &mut [f64], resolution: Resolution) {
    if values[2] > 1.0 {
        return;
    }
    let w = resolution.width as f64;
    let h = resolution.height as f64;
    values[0] *= w;
    values[1] *= h;
    values[2] = values[2] * w - 0.5;
    values[3] = values[3] * h - 0.5;
}

fn load_camera_txt(path: &Path) -> Result<SequenceCalibration, RectifyError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| malformed(format!("cannot read {}: {e}", path.display())))?;

    let mut lines = contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let model_line = lines.next().ok_or_else(|| malformed("missing model line"))?;
    let in_size_line = lines
        .next()
        .ok_or_else(|| malformed("missing input size line"))?;
    let mode_line = lines
        .next()
        .ok_or_else(|| malformed("missing output mode line"))?;
    let out_size_line = lines
        .next()
        .ok_or_else(|| malformed("missing output size line"))?;

    let in_resolution = parse_resolution(in_size_line, "input size")?;
    let out_resolution = parse_resolution(out_size_line, "output size")?;

    let mut params = parse_floats(model_line, "model")?;
    if params.len() < 4 {
        return Err(malformed(format!(
            "model line must contain at least 4 values, got {}",
            params.len()
        )));
    }
    rescale_if_relative(&mut params, in_resolution);

    let model: Box<dyn CameraModel> = match params.len() {
        5 if params[4] == 0.0 => {
            debug!("camera.txt: 5 parameters with w == 0, pinhole model");
            let mut m = PinholeModel::new(&DVector::from_vec(params[..4].to_vec()))
                .map_err(|e| malformed(e.to_string()))?;
            m.resolution = in_resolution;
            Box::new(m)
        }
        5 => {
            debug!("camera.txt: 5 parameters, FOV model");
            let mut m = FovModel::new(&DVector::from_vec(params))
                .map_err(|e| malformed(e.to_string()))?;
            m.resolution = in_resolution;
            Box::new(m)
        }
        8 => {
            debug!("camera.txt: 8 parameters, radial-tangential model");
            // camera.txt carries k1 k2 p1 p2; k3 is fixed to zero.
            params.push(0.0);
            let mut m = RadTanModel::new(&DVector::from_vec(params))
                .map_err(|e| malformed(e.to_string()))?;
            m.resolution = in_resolution;
            Box::new(m)
        }
        n => {
            return Err(RectifyError::UnsupportedModel(format!(
                "no camera model takes {n} parameters"
            )))
        }
    };

    model
        .validate_params()
        .map_err(|e| malformed(e.to_string()))?;

    let mode = parse_output_mode(mode_line, out_resolution)?;

    info!(
        "loaded {} calibration from {} ({}x{} -> {}x{}, {:?})",
        model.get_model_name(),
        path.display(),
        in_resolution.width,
        in_resolution.height,
        out_resolution.width,
        out_resolution.height,
        mode
    );

    Ok(SequenceCalibration {
        model,
        output: OutputSpec {
            mode,
            resolution: out_resolution,
        },
    })
}

fn parse_output_mode(line: &str, out_resolution: Resolution) -> Result<OutputMode, RectifyError> {
    match line.to_lowercase().as_str() {
        "crop" => return Ok(OutputMode::Crop),
        "full" => return Ok(OutputMode::Full),
        "none" => return Ok(OutputMode::None),
        _ => {}
    }

    // Not a keyword: must be an explicit relative target K.
    let mut values = parse_floats(line, "output mode").map_err(|_| {
        RectifyError::UnsupportedModel(format!("unrecognized output mode '{line}'"))
    })?;
    if values.len() != 5 {
        return Err(RectifyError::UnsupportedModel(format!(
            "explicit target calibration must contain 5 values, got {}",
            values.len()
        )));
    }

    rescale_if_relative(&mut values, out_resolution);
    Ok(OutputMode::Explicit(Intrinsics {
        fx: values[0],
        fy: values[1],
        cx: values[2],
        cy: values[3],
    }))
}

fn load_yaml_calibration(path: &Path) -> Result<SequenceCalibration, RectifyError> {
    use crate::camera::yaml_io;

    let path_str = path
        .to_str()
        .ok_or_else(|| malformed("calibration path is not valid UTF-8"))?;

    let tag = yaml_io::read_model_tag(path_str)
        .map_err(|e| malformed(e.to_string()))?
        .ok_or_else(|| malformed("YAML calibration missing 'camera_model' tag"))?;

    let model: Box<dyn CameraModel> = match tag.as_str() {
        "fov" => Box::new(FovModel::load_from_yaml(path_str).map_err(|e| malformed(e.to_string()))?),
        "rad_tan" => {
            Box::new(RadTanModel::load_from_yaml(path_str).map_err(|e| malformed(e.to_string()))?)
        }
        "pinhole" => {
            Box::new(PinholeModel::load_from_yaml(path_str).map_err(|e| malformed(e.to_string()))?)
        }
        other => {
            return Err(RectifyError::UnsupportedModel(format!(
                "unknown camera_model tag '{other}'"
            )))
        }
    };

    // YAML descriptors carry no output block; rectify at the input geometry.
    let resolution = model.get_resolution();
    info!(
        "loaded {} calibration from {}",
        model.get_model_name(),
        path.display()
    );

    Ok(SequenceCalibration {
        model,
        output: OutputSpec {
            mode: OutputMode::None,
            resolution,
        },
    })
}
