//! Rectification map construction and frame resampling.
//!
//! A [`RectificationMap`] stores, for every output pixel, the floating-point
//! source coordinate it samples from (or an out-of-bounds sentinel). The map
//! is built once per calibration and is read-only afterwards, so all frames of
//! a sequence can share it without locking. Applying the map to a frame is a
//! pure function producing a new buffer.

use image::GrayImage;
use log::{debug, info};
use nalgebra::{Vector2, Vector3};

use crate::calib::{OutputMode, OutputSpec};
use crate::camera::{CameraModel, CameraModelError, Intrinsics, Resolution};

/// Fill value for output pixels whose source coordinate is out of bounds.
///
/// Fixed policy: out-of-bounds regions are black. Tests pin this down; it is
/// deliberately not configurable.
pub const FILL_VALUE: u8 = 0;

/// Sentinel stored in the lookup table for out-of-bounds output pixels.
/// Valid source coordinates are always non-negative.
const OUT_OF_BOUNDS: (f32, f32) = (-1.0, -1.0);

/// Errors raised while loading calibrations, building maps and processing
/// frames.
#[derive(thiserror::Error, Debug)]
pub enum RectifyError {
    /// The calibration descriptor is missing required fields or contains
    /// non-numeric values. Fatal for the sequence.
    #[error("Malformed calibration: {0}")]
    MalformedCalibration(String),
    /// The calibration names a camera model or mode this crate does not
    /// implement. Fatal for the sequence.
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),
    /// A frame's dimensions differ from those the map was built for.
    #[error("Frame size {got_width}x{got_height} does not match map input {want_width}x{want_height}")]
    SizeMismatch {
        got_width: u32,
        got_height: u32,
        want_width: u32,
        want_height: u32,
    },
    /// A frame file could not be read or decoded. Recoverable per frame.
    #[error("Failed to decode frame: {0}")]
    FrameDecodeError(String),
    /// A rectified frame could not be written. Recoverable per frame.
    #[error("Failed to write frame: {0}")]
    FrameWriteError(String),
    /// Filesystem error outside per-frame processing.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CameraModelError> for RectifyError {
    fn from(err: CameraModelError) -> Self {
        RectifyError::MalformedCalibration(err.to_string())
    }
}

/// Resampling strategy used when applying a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMethod {
    /// Nearest-neighbor lookup.
    Nearest,
    /// Bilinear interpolation over the four surrounding source pixels.
    #[default]
    Bilinear,
}

/// Precomputed per-pixel mapping from output coordinates to source
/// coordinates.
///
/// Valid only for the camera calibration and output size it was built from;
/// [`RectificationMap::apply`] re-checks the source dimensions of every frame.
pub struct RectificationMap {
    source_resolution: Resolution,
    output_resolution: Resolution,
    /// Row-major, `output_resolution.width * output_resolution.height`
    /// entries of `(source_x, source_y)` or [`OUT_OF_BOUNDS`].
    lut: Vec<(f32, f32)>,
}

impl RectificationMap {
    /// Builds a rectification map from a distorted camera model.
    ///
    /// The target intrinsics are resolved from `output` (crop / full / none /
    /// explicit), then every output pixel is back-projected to a z=1 ray and
    /// pushed through the distorted model. Rays the model rejects, and source
    /// coordinates outside `[0, W-1] x [0, H-1]`, are recorded as out of
    /// bounds.
    ///
    /// Construction is a plain row-major loop over closed-form math: identical
    /// calibration and output size always produce a bit-identical map.
    pub fn build(model: &dyn CameraModel, output: &OutputSpec) -> Result<Self, RectifyError> {
        let target = resolve_target_intrinsics(model, output)?;
        Self::build_with_target(model, &target, output.resolution)
    }

    /// Builds a map with explicit target intrinsics.
    pub fn build_with_target(
        model: &dyn CameraModel,
        target: &Intrinsics,
        output_resolution: Resolution,
    ) -> Result<Self, RectifyError> {
        let source_resolution = model.get_resolution();
        if source_resolution.width == 0 || source_resolution.height == 0 {
            return Err(RectifyError::MalformedCalibration(
                "camera model has no resolution".to_string(),
            ));
        }

        let max_x = (source_resolution.width - 1) as f64;
        let max_y = (source_resolution.height - 1) as f64;

        // Coordinates this close to the border are snapped onto it instead of
        // being dropped; cropped viewports place their edge pixels exactly on
        // the source border, and the border fit samples at pixel granularity,
        // so rounding must not push them out.
        const CLAMP_EPS: f64 = 1e-2;
        let clamp_axis = |value: f64, max: f64| -> Option<f64> {
            if value >= 0.0 && value <= max {
                Some(value)
            } else if value > -CLAMP_EPS && value < 0.0 {
                Some(0.0)
            } else if value > max && value < max + CLAMP_EPS {
                Some(max)
            } else {
                None
            }
        };

        let mut lut =
            Vec::with_capacity(output_resolution.width as usize * output_resolution.height as usize);

        for v_out in 0..output_resolution.height {
            for u_out in 0..output_resolution.width {
                let x_norm = (u_out as f64 - target.cx) / target.fx;
                let y_norm = (v_out as f64 - target.cy) / target.fy;
                let ray = Vector3::new(x_norm, y_norm, 1.0);

                let entry = match model.project(&ray) {
                    Ok(source) => match (clamp_axis(source.x, max_x), clamp_axis(source.y, max_y)) {
                        (Some(sx), Some(sy)) => (sx as f32, sy as f32),
                        _ => OUT_OF_BOUNDS,
                    },
                    Err(_) => OUT_OF_BOUNDS,
                };
                lut.push(entry);
            }
        }

        let oob = lut.iter().filter(|e| **e == OUT_OF_BOUNDS).count();
        info!(
            "built rectification map {}x{} -> {}x{} ({} out-of-bounds pixels)",
            source_resolution.width,
            source_resolution.height,
            output_resolution.width,
            output_resolution.height,
            oob
        );

        Ok(RectificationMap {
            source_resolution,
            output_resolution,
            lut,
        })
    }

    /// Source image dimensions the map was built for.
    pub fn source_resolution(&self) -> Resolution {
        self.source_resolution
    }

    /// Output image dimensions.
    pub fn output_resolution(&self) -> Resolution {
        self.output_resolution
    }

    /// Source coordinate for an output pixel, `None` if out of bounds.
    pub fn source_coordinate(&self, u: u32, v: u32) -> Option<(f32, f32)> {
        let idx = v as usize * self.output_resolution.width as usize + u as usize;
        let entry = self.lut[idx];
        if entry == OUT_OF_BOUNDS {
            None
        } else {
            Some(entry)
        }
    }

    /// Number of output pixels that sample outside the source image.
    pub fn out_of_bounds_count(&self) -> usize {
        self.lut.iter().filter(|e| **e == OUT_OF_BOUNDS).count()
    }

    /// Raw lookup table, row-major. Exposed for determinism checks.
    pub fn lut(&self) -> &[(f32, f32)] {
        &self.lut
    }

    /// Rectifies one frame.
    ///
    /// For each output pixel the input is sampled at the mapped source
    /// coordinate; out-of-bounds pixels are filled with [`FILL_VALUE`]. The
    /// input is untouched and a new buffer of exactly the map's output size is
    /// returned.
    ///
    /// # Errors
    ///
    /// * [`RectifyError::SizeMismatch`] if the frame's dimensions differ from
    ///   the source resolution the map was built for.
    pub fn apply(
        &self,
        input: &GrayImage,
        interpolation: InterpolationMethod,
    ) -> Result<GrayImage, RectifyError> {
        let (width, height) = input.dimensions();
        if width != self.source_resolution.width || height != self.source_resolution.height {
            return Err(RectifyError::SizeMismatch {
                got_width: width,
                got_height: height,
                want_width: self.source_resolution.width,
                want_height: self.source_resolution.height,
            });
        }

        let out_w = self.output_resolution.width;
        let out_h = self.output_resolution.height;
        let mut output = GrayImage::from_pixel(out_w, out_h, image::Luma([FILL_VALUE]));

        for v_out in 0..out_h {
            for u_out in 0..out_w {
                let idx = v_out as usize * out_w as usize + u_out as usize;
                let (sx, sy) = self.lut[idx];
                if (sx, sy) == OUT_OF_BOUNDS {
                    continue;
                }
                let value = sample(input, sx as f64, sy as f64, interpolation);
                output.put_pixel(u_out, v_out, image::Luma([value]));
            }
        }

        Ok(output)
    }
}

/// Samples the input at a source coordinate known to lie within
/// `[0, W-1] x [0, H-1]`.
fn sample(image: &GrayImage, x: f64, y: f64, method: InterpolationMethod) -> u8 {
    let (width, height) = image.dimensions();

    match method {
        InterpolationMethod::Nearest => {
            let u = (x.round() as u32).min(width - 1);
            let v = (y.round() as u32).min(height - 1);
            image.get_pixel(u, v)[0]
        }
        InterpolationMethod::Bilinear => {
            let x0 = x.floor();
            let y0 = y.floor();
            let wx = x - x0;
            let wy = y - y0;

            let x0_u = x0 as u32;
            let y0_u = y0 as u32;
            // Clamp the far neighbors so a coordinate exactly on the last
            // row/column stays valid (its weight there is zero anyway).
            let x1_u = (x0_u + 1).min(width - 1);
            let y1_u = (y0_u + 1).min(height - 1);

            let p00 = image.get_pixel(x0_u, y0_u)[0] as f64;
            let p10 = image.get_pixel(x1_u, y0_u)[0] as f64;
            let p01 = image.get_pixel(x0_u, y1_u)[0] as f64;
            let p11 = image.get_pixel(x1_u, y1_u)[0] as f64;

            let value = p00 * (1.0 - wx) * (1.0 - wy)
                + p10 * wx * (1.0 - wy)
                + p01 * (1.0 - wx) * wy
                + p11 * wx * wy;

            value.round().clamp(0.0, 255.0) as u8
        }
    }
}

/// Resolves the target pinhole intrinsics for an output specification.
///
/// `Crop` and `Full` trace the source image border through the model's
/// unprojection and fit the output viewport to the undistorted border ring:
/// the inner box of the four edges for `Crop` (only valid pixels visible), the
/// outer bounding box for `Full` (every source pixel visible).
pub fn resolve_target_intrinsics(
    model: &dyn CameraModel,
    output: &OutputSpec,
) -> Result<Intrinsics, RectifyError> {
    let out = output.resolution;
    match &output.mode {
        OutputMode::Explicit(k) => Ok(k.clone()),
        OutputMode::None => {
            let source = model.get_intrinsics();
            let src = model.get_resolution();
            let sx = out.width as f64 / src.width as f64;
            let sy = out.height as f64 / src.height as f64;
            Ok(Intrinsics {
                fx: source.fx * sx,
                fy: source.fy * sy,
                cx: (source.cx + 0.5) * sx - 0.5,
                cy: (source.cy + 0.5) * sy - 0.5,
            })
        }
        OutputMode::Crop | OutputMode::Full => {
            let bounds = undistorted_border_bounds(model, &output.mode)?;
            debug!("target viewport bounds: {bounds:?}");

            let (x_min, x_max, y_min, y_max) = bounds;
            if x_max <= x_min || y_max <= y_min {
                return Err(RectifyError::MalformedCalibration(
                    "degenerate undistorted viewport".to_string(),
                ));
            }

            let fx = (out.width as f64 - 1.0) / (x_max - x_min);
            let fy = (out.height as f64 - 1.0) / (y_max - y_min);
            Ok(Intrinsics {
                fx,
                fy,
                cx: -x_min * fx,
                cy: -y_min * fy,
            })
        }
    }
}

/// Walks the source border ring, unprojects border pixels to normalized
/// image-plane coordinates and reduces per edge. Border pixels outside the
/// lens's image circle (the model refuses to unproject them) contribute
/// nothing; with wide-angle calibrations that is the sensor corners.
///
/// Returns `(x_min, x_max, y_min, y_max)` of the fitted viewport.
fn undistorted_border_bounds(
    model: &dyn CameraModel,
    mode: &OutputMode,
) -> Result<(f64, f64, f64, f64), RectifyError> {
    let src = model.get_resolution();
    let w = src.width;
    let h = src.height;

    let norm = |u: u32, v: u32| -> Option<(f64, f64)> {
        let ray = model.unproject(&Vector2::new(u as f64, v as f64)).ok()?;
        if ray.z <= 0.0 {
            return None;
        }
        Some((ray.x / ray.z, ray.y / ray.z))
    };

    let mut left: Vec<f64> = Vec::with_capacity(h as usize);
    let mut right: Vec<f64> = Vec::with_capacity(h as usize);
    let mut top: Vec<f64> = Vec::with_capacity(w as usize);
    let mut bottom: Vec<f64> = Vec::with_capacity(w as usize);

    for v in 0..h {
        left.extend(norm(0, v).map(|(x, _)| x));
        right.extend(norm(w - 1, v).map(|(x, _)| x));
    }
    for u in 0..w {
        top.extend(norm(u, 0).map(|(_, y)| y));
        bottom.extend(norm(u, h - 1).map(|(_, y)| y));
    }

    if left.is_empty() || right.is_empty() || top.is_empty() || bottom.is_empty() {
        return Err(RectifyError::MalformedCalibration(
            "no valid border pixels to fit the output viewport".to_string(),
        ));
    }

    let fold_max = |acc: f64, x: &f64| acc.max(*x);
    let fold_min = |acc: f64, x: &f64| acc.min(*x);

    Ok(match mode {
        // Inner box: the most constraining coordinate of each edge.
        OutputMode::Crop => (
            left.iter().fold(f64::NEG_INFINITY, fold_max),
            right.iter().fold(f64::INFINITY, fold_min),
            top.iter().fold(f64::NEG_INFINITY, fold_max),
            bottom.iter().fold(f64::INFINITY, fold_min),
        ),
        // Outer box: the extreme coordinate of each edge.
        OutputMode::Full => (
            left.iter().fold(f64::INFINITY, fold_min),
            right.iter().fold(f64::NEG_INFINITY, fold_max),
            top.iter().fold(f64::INFINITY, fold_min),
            bottom.iter().fold(f64::NEG_INFINITY, fold_max),
        ),
        _ => unreachable!("bounds are only computed for crop/full"),
    })
}
