//! Per-sequence batch processing.
//!
//! A sequence directory holds ordered raw frames and one calibration
//! descriptor. The runner loads the calibration once, builds one
//! [`RectificationMap`], applies it to every frame in filename order and
//! writes the results to `<sequence>/rect/`. A corrupt frame is recorded and
//! skipped over; only a calibration failure aborts the sequence.

use std::fs;
use std::path::{Path, PathBuf};

use image::GrayImage;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::calib::{load_calibration, OutputSpec};
use crate::camera::Resolution;
use crate::rectify::{InterpolationMethod, RectificationMap, RectifyError};

/// Calibration descriptor names probed in a sequence directory, in order.
const CALIBRATION_NAMES: [&str; 3] = ["camera.txt", "camera.yaml", "camera.yml"];

/// Name of the output subdirectory.
const RECT_DIR: &str = "rect";

/// Explicit configuration for a batch run. Passed into the runner at
/// construction; there is no process-wide state.
#[derive(Debug, Clone)]
pub struct RectifyConfig {
    /// Lowercase file extensions treated as frames.
    pub frame_extensions: Vec<String>,
    /// Resampling strategy.
    pub interpolation: InterpolationMethod,
    /// Overrides the output size from the calibration descriptor.
    pub output_size: Option<Resolution>,
    /// Fan frames of one sequence out across the rayon pool.
    pub parallel_frames: bool,
}

impl Default for RectifyConfig {
    fn default() -> Self {
        RectifyConfig {
            frame_extensions: ["jpg", "jpeg", "png", "pgm", "bmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            interpolation: InterpolationMethod::Bilinear,
            output_size: None,
            parallel_frames: true,
        }
    }
}

/// A frame that could not be processed, with the error that stopped it.
#[derive(Debug)]
pub struct FrameFailure {
    /// Frame file name relative to the frame directory.
    pub name: String,
    pub error: RectifyError,
}

/// Outcome of one sequence run.
#[derive(Debug)]
pub struct SequenceSummary {
    pub sequence: PathBuf,
    /// Frames rectified and written.
    pub succeeded: usize,
    /// Directory entries that were not frames (wrong extension, subdirectories).
    pub skipped: usize,
    /// Frames that failed to decode, rectify or write.
    pub failed: Vec<FrameFailure>,
}

impl SequenceSummary {
    /// True when every frame was rectified and written.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Processing states of one sequence run. `Aborted` is reachable only before
/// any frame is touched, on a fatal calibration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SequenceState {
    Init,
    CalibrationLoaded,
    MapBuilt,
    Processing,
    Done,
    Aborted,
}

/// Rectifies sequence directories according to one [`RectifyConfig`].
pub struct SequenceRectifier {
    config: RectifyConfig,
}

impl SequenceRectifier {
    pub fn new(config: RectifyConfig) -> Self {
        SequenceRectifier { config }
    }

    /// Processes a single sequence directory.
    ///
    /// # Errors
    ///
    /// Returns an error only for fatal, sequence-level failures:
    /// [`RectifyError::MalformedCalibration`], [`RectifyError::UnsupportedModel`]
    /// or an unreadable directory. Per-frame failures land in the summary.
    pub fn process(&self, seq_dir: &Path) -> Result<SequenceSummary, RectifyError> {
        let mut state = SequenceState::Init;
        debug!("sequence {}: {state:?}", seq_dir.display());

        let calibration = match self.load_sequence_calibration(seq_dir) {
            Ok(calibration) => calibration,
            Err(err) => {
                state = SequenceState::Aborted;
                warn!("sequence {}: {state:?} ({err})", seq_dir.display());
                return Err(err);
            }
        };
        state = SequenceState::CalibrationLoaded;
        debug!("sequence {}: {state:?}", seq_dir.display());

        let mut output: OutputSpec = calibration.output.clone();
        if let Some(size) = self.config.output_size {
            output.resolution = size;
        }

        let map = match RectificationMap::build(calibration.model.as_ref(), &output) {
            Ok(map) => map,
            Err(err) => {
                state = SequenceState::Aborted;
                warn!("sequence {}: {state:?} ({err})", seq_dir.display());
                return Err(err);
            }
        };
        state = SequenceState::MapBuilt;
        debug!("sequence {}: {state:?}", seq_dir.display());

        let (frames, skipped) = self.list_frames(seq_dir)?;
        let rect_dir = seq_dir.join(RECT_DIR);
        fs::create_dir_all(&rect_dir)?;

        state = SequenceState::Processing;
        debug!(
            "sequence {}: {state:?} ({} frames)",
            seq_dir.display(),
            frames.len()
        );

        // The map is immutable from here on; frames only read it and write to
        // distinct output files.
        let process_one = |frame: &PathBuf| -> Result<(), FrameFailure> {
            let name = frame
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.process_frame(frame, &rect_dir, &map)
                .map_err(|error| FrameFailure { name, error })
        };

        let results: Vec<Result<(), FrameFailure>> = if self.config.parallel_frames {
            frames.par_iter().map(process_one).collect()
        } else {
            frames.iter().map(process_one).collect()
        };

        let mut succeeded = 0;
        let mut failed = Vec::new();
        for result in results {
            match result {
                Ok(()) => succeeded += 1,
                Err(failure) => {
                    warn!(
                        "sequence {}: frame {} failed: {}",
                        seq_dir.display(),
                        failure.name,
                        failure.error
                    );
                    failed.push(failure);
                }
            }
        }

        state = SequenceState::Done;
        info!(
            "sequence {}: {state:?} (succeeded: {succeeded}, skipped: {skipped}, failed: {})",
            seq_dir.display(),
            failed.len()
        );

        Ok(SequenceSummary {
            sequence: seq_dir.to_path_buf(),
            succeeded,
            skipped,
            failed,
        })
    }

    fn load_sequence_calibration(
        &self,
        seq_dir: &Path,
    ) -> Result<crate::calib::SequenceCalibration, RectifyError> {
        for name in CALIBRATION_NAMES {
            let candidate = seq_dir.join(name);
            if candidate.is_file() {
                return load_calibration(&candidate);
            }
        }
        Err(RectifyError::MalformedCalibration(format!(
            "no calibration descriptor ({}) in {}",
            CALIBRATION_NAMES.join(", "),
            seq_dir.display()
        )))
    }

    /// Enumerates frame files in filename order.
    ///
    /// Frames live in `<seq>/images/` when that directory exists, otherwise
    /// directly in the sequence directory. Non-frame entries (calibration
    /// descriptor, timestamps, subdirectories) count as skipped.
    fn list_frames(&self, seq_dir: &Path) -> Result<(Vec<PathBuf>, usize), RectifyError> {
        let images_dir = seq_dir.join("images");
        let frame_dir = if images_dir.is_dir() {
            images_dir
        } else {
            seq_dir.to_path_buf()
        };

        let mut frames = Vec::new();
        let mut skipped = 0usize;

        for entry in fs::read_dir(&frame_dir)? {
            let entry = entry?;
            let path = entry.path();

            if !path.is_file() {
                // The rect/ output directory is not an input.
                continue;
            }
            let file_name = path.file_name().and_then(|f| f.to_str());
            if CALIBRATION_NAMES.iter().any(|n| file_name == Some(*n)) {
                continue;
            }

            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .is_some_and(|e| self.config.frame_extensions.contains(&e));

            if is_frame {
                frames.push(path);
            } else {
                debug!("skipping non-frame entry {}", path.display());
                skipped += 1;
            }
        }

        frames.sort();
        Ok((frames, skipped))
    }

    fn process_frame(
        &self,
        frame: &Path,
        rect_dir: &Path,
        map: &RectificationMap,
    ) -> Result<(), RectifyError> {
        let input: GrayImage = image::open(frame)
            .map_err(|e| RectifyError::FrameDecodeError(format!("{}: {e}", frame.display())))?
            .to_luma8();

        let rectified = map.apply(&input, self.config.interpolation)?;

        let out_path = rect_dir.join(frame.file_name().unwrap_or_default());
        rectified
            .save(&out_path)
            .map_err(|e| RectifyError::FrameWriteError(format!("{}: {e}", out_path.display())))?;

        debug!("wrote {}", out_path.display());
        Ok(())
    }
}

/// Rectifies several independent sequences, fanning them out across the rayon
/// pool. One sequence's fatal error never aborts the others; results come back
/// in input order.
pub fn rectify_batch(
    roots: &[PathBuf],
    config: &RectifyConfig,
) -> Vec<(PathBuf, Result<SequenceSummary, RectifyError>)> {
    let rectifier = SequenceRectifier::new(config.clone());
    roots
        .par_iter()
        .map(|root| (root.clone(), rectifier.process(root)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_recognizes_common_extensions() {
        let config = RectifyConfig::default();
        for ext in ["jpg", "png", "pgm"] {
            assert!(config.frame_extensions.iter().any(|e| e == ext));
        }
        assert_eq!(config.interpolation, InterpolationMethod::Bilinear);
    }

    #[test]
    fn test_missing_calibration_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let rectifier = SequenceRectifier::new(RectifyConfig::default());
        assert!(matches!(
            rectifier.process(dir.path()),
            Err(RectifyError::MalformedCalibration(_))
        ));
    }
}
