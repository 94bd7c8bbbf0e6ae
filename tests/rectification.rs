//! Integration tests for rectification map construction and frame resampling.

use image::GrayImage;
use nalgebra::{DVector, Vector2};

use mono_rectify::calib::{OutputMode, OutputSpec};
use mono_rectify::camera::{CameraModel, FovModel, Intrinsics, PinholeModel, Resolution};
use mono_rectify::rectify::{InterpolationMethod, RectificationMap, RectifyError};

fn fov_model(width: u32, height: u32) -> FovModel {
    let params = DVector::from_vec(vec![
        0.35 * width as f64,
        0.44 * height as f64,
        0.4931 * width as f64 - 0.5,
        0.4990 * height as f64 - 0.5,
        0.9332,
    ]);
    let mut model = FovModel::new(&params).unwrap();
    model.resolution = Resolution { width, height };
    model
}

fn identity_pinhole(width: u32, height: u32) -> PinholeModel {
    PinholeModel::from_parts(
        Intrinsics {
            fx: 350.0,
            fy: 350.0,
            cx: (width as f64 - 1.0) / 2.0,
            cy: (height as f64 - 1.0) / 2.0,
        },
        Resolution { width, height },
    )
}

fn gradient_image(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        image::Luma([((x * 3 + y * 5) % 256) as u8])
    })
}

/// Smooth synthetic pattern evaluated on the normalized image plane. Smooth so
/// bilinear interpolation error stays well below a gray level.
fn pattern(x: f64, y: f64) -> f64 {
    127.5 * (1.0 + (6.0 * x).sin() * (6.0 * y).sin())
}

#[test]
fn map_build_is_deterministic() {
    let model = fov_model(320, 240);
    let spec = OutputSpec {
        mode: OutputMode::Crop,
        resolution: Resolution {
            width: 320,
            height: 240,
        },
    };

    let a = RectificationMap::build(&model, &spec).expect("map build failed");
    let b = RectificationMap::build(&model, &spec).expect("map build failed");

    assert_eq!(a.lut(), b.lut(), "two builds from identical inputs differ");
}

#[test]
fn output_has_requested_dimensions() {
    let model = fov_model(320, 240);
    let spec = OutputSpec {
        mode: OutputMode::Crop,
        resolution: Resolution {
            width: 200,
            height: 100,
        },
    };
    let map = RectificationMap::build(&model, &spec).unwrap();

    let input = gradient_image(320, 240);
    let output = map.apply(&input, InterpolationMethod::Bilinear).unwrap();
    assert_eq!(output.dimensions(), (200, 100));
}

#[test]
fn identity_map_reproduces_input() {
    // Zero distortion, same geometry in and out: rectification must be a
    // pixel-exact no-op.
    let model = identity_pinhole(64, 48);
    let spec = OutputSpec {
        mode: OutputMode::None,
        resolution: Resolution {
            width: 64,
            height: 48,
        },
    };
    let map = RectificationMap::build(&model, &spec).unwrap();
    assert_eq!(map.out_of_bounds_count(), 0);

    let input = gradient_image(64, 48);
    let output = map.apply(&input, InterpolationMethod::Bilinear).unwrap();

    for (x, y, pixel) in output.enumerate_pixels() {
        assert_eq!(pixel[0], input.get_pixel(x, y)[0], "pixel ({x},{y}) changed");
    }
}

#[test]
fn checkerboard_round_trip_recovers_pattern() {
    let model = fov_model(320, 240);

    // Distort the analytic pattern through the forward model: each source
    // pixel carries the pattern value of the normalized coordinate it sees.
    let mut distorted = GrayImage::new(320, 240);
    for (u, v, pixel) in distorted.enumerate_pixels_mut() {
        // Corners beyond the image circle stay black; the cropped map never
        // samples them.
        let value = match model.unproject(&Vector2::new(u as f64, v as f64)) {
            Ok(ray) => pattern(ray.x / ray.z, ray.y / ray.z),
            Err(_) => 0.0,
        };
        *pixel = image::Luma([value.round() as u8]);
    }

    let spec = OutputSpec {
        mode: OutputMode::Crop,
        resolution: Resolution {
            width: 320,
            height: 240,
        },
    };
    let map = RectificationMap::build(&model, &spec).unwrap();
    let rectified = map.apply(&distorted, InterpolationMethod::Bilinear).unwrap();

    let target = mono_rectify::rectify::resolve_target_intrinsics(&model, &spec).unwrap();

    let mut total_error = 0.0f64;
    let mut max_error = 0.0f64;
    for (u, v, pixel) in rectified.enumerate_pixels() {
        let x = (u as f64 - target.cx) / target.fx;
        let y = (v as f64 - target.cy) / target.fy;
        let expected = pattern(x, y);
        let error = (pixel[0] as f64 - expected).abs();
        total_error += error;
        max_error = max_error.max(error);
    }
    let mean_error = total_error / (320.0 * 240.0);

    assert!(mean_error < 2.0, "mean error {mean_error} too large");
    assert!(max_error < 30.0, "max error {max_error} too large");
}

#[test]
fn boundary_inclusion_and_sentinel_fill() {
    // Shift the target principal point one pixel to the right: output column 0
    // samples source x = -1 (out of bounds), column 1 samples source x = 0.
    let model = identity_pinhole(8, 8);
    let mut target = model.get_intrinsics();
    target.cx += 1.0;

    let map = RectificationMap::build_with_target(
        &model,
        &target,
        Resolution {
            width: 8,
            height: 8,
        },
    )
    .unwrap();

    assert!(map.source_coordinate(0, 3).is_none(), "x = -1 must be out of bounds");
    let (sx, _) = map.source_coordinate(1, 3).expect("x = 0 must be included");
    assert!((sx - 0.0).abs() < 1e-4);

    let input = GrayImage::from_pixel(8, 8, image::Luma([255]));
    let output = map.apply(&input, InterpolationMethod::Bilinear).unwrap();

    for v in 0..8 {
        assert_eq!(output.get_pixel(0, v)[0], 0, "sentinel column must be black");
        assert_eq!(output.get_pixel(1, v)[0], 255, "edge column must be sampled");
    }
}

#[test]
fn exact_edge_of_source_is_included() {
    // Target shifted so the last output column samples source x = W-1 exactly.
    let model = identity_pinhole(8, 8);
    let target = model.get_intrinsics();
    let map = RectificationMap::build_with_target(
        &model,
        &target,
        Resolution {
            width: 8,
            height: 8,
        },
    )
    .unwrap();

    let (sx, sy) = map.source_coordinate(7, 7).expect("corner must be included");
    assert!((sx - 7.0).abs() < 1e-4);
    assert!((sy - 7.0).abs() < 1e-4);
    assert_eq!(map.out_of_bounds_count(), 0);
}

#[test]
fn size_mismatch_is_rejected() {
    let model = fov_model(320, 240);
    let spec = OutputSpec {
        mode: OutputMode::Crop,
        resolution: Resolution {
            width: 320,
            height: 240,
        },
    };
    let map = RectificationMap::build(&model, &spec).unwrap();

    let wrong = GrayImage::new(321, 240);
    match map.apply(&wrong, InterpolationMethod::Bilinear) {
        Err(RectifyError::SizeMismatch {
            got_width,
            want_width,
            ..
        }) => {
            assert_eq!(got_width, 321);
            assert_eq!(want_width, 320);
        }
        other => panic!("expected SizeMismatch, got {other:?}"),
    }
}

#[test]
fn apply_does_not_mutate_input() {
    let model = fov_model(320, 240);
    let spec = OutputSpec {
        mode: OutputMode::Crop,
        resolution: Resolution {
            width: 320,
            height: 240,
        },
    };
    let map = RectificationMap::build(&model, &spec).unwrap();

    let input = gradient_image(320, 240);
    let before = input.clone();
    let _ = map.apply(&input, InterpolationMethod::Bilinear).unwrap();
    assert_eq!(input.as_raw(), before.as_raw());
}
