//! Integration tests for calibration descriptor loading and YAML round trips.

use std::fs;

use mono_rectify::calib::{load_calibration, OutputMode};
use mono_rectify::camera::{CameraModel, FovModel, Intrinsics, PinholeModel, RadTanModel, Resolution};
use mono_rectify::rectify::RectifyError;

#[test]
fn fov_yaml_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fov.yaml");
    let path_str = path.to_str().unwrap();

    let model = FovModel {
        intrinsics: Intrinsics {
            fx: 379.045,
            fy: 379.008,
            cx: 505.512,
            cy: 509.969,
        },
        resolution: Resolution {
            width: 1280,
            height: 1024,
        },
        w: 0.9259487501905697,
    };

    model.save_to_yaml(path_str).expect("save failed");
    let reloaded = FovModel::load_from_yaml(path_str).expect("reload failed");

    assert_eq!(model.intrinsics, reloaded.intrinsics);
    assert_eq!(model.resolution, reloaded.resolution);
    assert_eq!(model.w, reloaded.w);
}

#[test]
fn rad_tan_yaml_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rad_tan.yaml");
    let path_str = path.to_str().unwrap();

    let model = RadTanModel {
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
        distortion: [-0.2834, 0.0739, 0.0002, 0.0000176, 0.0],
    };

    model.save_to_yaml(path_str).expect("save failed");
    let reloaded = RadTanModel::load_from_yaml(path_str).expect("reload failed");

    assert_eq!(model.intrinsics, reloaded.intrinsics);
    assert_eq!(model.distortion, reloaded.distortion);
}

#[test]
fn pinhole_yaml_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pinhole.yaml");
    let path_str = path.to_str().unwrap();

    let model = PinholeModel::from_parts(
        Intrinsics {
            fx: 460.0,
            fy: 460.0,
            cx: 320.0,
            cy: 240.0,
        },
        Resolution {
            width: 640,
            height: 480,
        },
    );

    model.save_to_yaml(path_str).expect("save failed");
    let reloaded = PinholeModel::load_from_yaml(path_str).expect("reload failed");

    assert_eq!(model.intrinsics, reloaded.intrinsics);
    assert_eq!(model.resolution, reloaded.resolution);
}

#[test]
fn yaml_descriptor_loads_through_model_tag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("camera.yaml");

    let model = FovModel {
        intrinsics: Intrinsics {
            fx: 379.045,
            fy: 379.008,
            cx: 505.512,
            cy: 509.969,
        },
        resolution: Resolution {
            width: 1280,
            height: 1024,
        },
        w: 0.9259487501905697,
    };
    model.save_to_yaml(path.to_str().unwrap()).unwrap();

    let calib = load_calibration(&path).expect("descriptor load failed");
    assert_eq!(calib.model.get_model_name(), "fov");
    assert_eq!(calib.input_resolution().width, 1280);
    // YAML descriptors carry no output block: rectify at input geometry.
    assert_eq!(calib.output.mode, OutputMode::None);
    assert_eq!(calib.output.resolution.height, 1024);
}

#[test]
fn yaml_descriptor_with_unknown_tag_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("camera.yaml");
    fs::write(
        &path,
        "cam0:\n  camera_model: kannala_brandt\n  intrinsics: [190.9, 190.9, 254.9, 256.8]\n  resolution: [512, 512]\n",
    )
    .unwrap();

    assert!(matches!(
        load_calibration(&path),
        Err(RectifyError::UnsupportedModel(_))
    ));
}

#[test]
fn yaml_descriptor_without_tag_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("camera.yaml");
    fs::write(
        &path,
        "cam0:\n  intrinsics: [379.0, 379.0, 505.5, 509.9, 0.92]\n  resolution: [1280, 1024]\n",
    )
    .unwrap();

    assert!(matches!(
        load_calibration(&path),
        Err(RectifyError::MalformedCalibration(_))
    ));
}

#[test]
fn camera_txt_end_to_end_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("camera.txt");
    fs::write(
        &path,
        "0.349153 0.436593 0.493140 0.499021 0.933271\n1280 1024\ncrop\n640 480\n",
    )
    .unwrap();

    let calib = load_calibration(&path).unwrap();
    assert_eq!(calib.model.get_model_name(), "fov");
    assert_eq!(calib.output.mode, OutputMode::Crop);
    assert_eq!(calib.output.resolution.width, 640);

    let intrinsics = calib.model.get_intrinsics();
    assert!((intrinsics.fx - 0.349153 * 1280.0).abs() < 1e-9);
    assert!((intrinsics.fy - 0.436593 * 1024.0).abs() < 1e-9);
    assert!((intrinsics.cx - (0.493140 * 1280.0 - 0.5)).abs() < 1e-9);
    assert!((intrinsics.cy - (0.499021 * 1024.0 - 0.5)).abs() < 1e-9);
}
