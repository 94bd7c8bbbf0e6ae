//! Sequence Rectification Tool
//!
//! Rectifies every frame of one or more sequence directories into their
//! `rect/` subdirectories, using the calibration descriptor found in each
//! sequence.
//!
//! Usage:
//!   cargo run --bin rectify_sequence -- /data/sequence_01 /data/sequence_02
//!
//! Exit codes: 0 full success, 1 fatal calibration failure in any sequence,
//! 2 recoverable per-frame failures only.

use clap::{Parser, ValueEnum};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

use mono_rectify::{rectify_batch, InterpolationMethod, RectifyConfig, Resolution};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Interpolation {
    Nearest,
    Bilinear,
}

#[derive(Parser)]
#[command(author, version, about = "Rectify monocular sequence directories")]
struct Cli {
    /// Sequence directories to process
    #[arg(required = true)]
    sequences: Vec<PathBuf>,

    /// Camera name placeholder (kept for invocation compatibility, unused)
    #[arg(short = 'c', long, default_value = "dummy")]
    camera: String,

    /// Override the output size from the calibration, as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    out_size: Option<Resolution>,

    /// Resampling method
    #[arg(long, value_enum, default_value_t = Interpolation::Bilinear)]
    interpolation: Interpolation,

    /// Process frames of each sequence serially instead of in parallel
    #[arg(long)]
    serial: bool,
}

fn parse_size(s: &str) -> Result<Resolution, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let width = w.parse().map_err(|_| format!("invalid width '{w}'"))?;
    let height = h.parse().map_err(|_| format!("invalid height '{h}'"))?;
    Ok(Resolution { width, height })
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = RectifyConfig {
        interpolation: match cli.interpolation {
            Interpolation::Nearest => InterpolationMethod::Nearest,
            Interpolation::Bilinear => InterpolationMethod::Bilinear,
        },
        output_size: cli.out_size,
        parallel_frames: !cli.serial,
        ..RectifyConfig::default()
    };

    println!("Sequence Rectification Tool");
    println!("===========================");
    println!("Camera: {}", cli.camera);
    println!("Sequences: {}", cli.sequences.len());
    println!();

    let results = rectify_batch(&cli.sequences, &config);

    let mut fatal = 0usize;
    let mut partial = 0usize;

    for (root, result) in &results {
        match result {
            Ok(summary) => {
                println!(
                    "✓ {}: succeeded: {}, skipped: {}, failed: {}",
                    root.display(),
                    summary.succeeded,
                    summary.skipped,
                    summary.failed.len()
                );
                for failure in &summary.failed {
                    println!("    frame {}: {}", failure.name, failure.error);
                }
                if !summary.is_clean() {
                    partial += 1;
                }
            }
            Err(err) => {
                error!("sequence {} aborted: {err}", root.display());
                println!("✗ {}: {err}", root.display());
                fatal += 1;
            }
        }
    }

    println!();
    if fatal > 0 {
        println!("{fatal} sequence(s) aborted");
        ExitCode::from(1)
    } else if partial > 0 {
        println!("{partial} sequence(s) finished with frame failures");
        ExitCode::from(2)
    } else {
        println!("All sequences rectified");
        ExitCode::SUCCESS
    }
}
