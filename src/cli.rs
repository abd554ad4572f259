// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Headless pipeline runs reporting frame statistics
//! - Writing a presented frame to a PNG snapshot
//! - Printing the effective configuration

use chrono::Local;
use fxcam::backends::camera::{SourceKind, create_source};
use fxcam::config::Config;
use fxcam::presentation::{HostFactory, NullHost, SnapshotHost, SurfaceFactory};
use fxcam::presentation::{software_surface_factory, wgpu_surface_factory};
use fxcam::{PipelineController, PipelineState};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const DEFAULT_SAVE_FOLDER: &str = "fxcam";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Parse a `--source` value: `test`, `pipewire[:node]` or a V4L2 device path
pub fn parse_source(value: &str) -> Result<SourceKind, String> {
    match value {
        "test" | "test-pattern" => Ok(SourceKind::TestPattern),
        "pipewire" => Ok(SourceKind::PipeWire { node: None }),
        other => {
            if let Some(node) = other.strip_prefix("pipewire:") {
                Ok(SourceKind::PipeWire {
                    node: Some(node.to_string()),
                })
            } else if other.starts_with("/dev/") {
                Ok(SourceKind::V4l2 {
                    path: other.to_string(),
                })
            } else {
                Err(format!("unknown source '{}': use test, pipewire[:node] or /dev/videoN", other))
            }
        }
    }
}

pub fn surface_factory(software: bool, host: HostFactory) -> SurfaceFactory {
    if software {
        software_surface_factory(host)
    } else {
        wgpu_surface_factory(host)
    }
}

fn build_controller(config: &Config, factory: SurfaceFactory) -> PipelineController {
    let source = create_source(&config.camera_device(), config.output_format);
    PipelineController::new(source, factory, config.pipeline_settings())
}

/// Flag set on Ctrl+C, polled by [`wait_for_frames`]
///
/// The handler outlives the command, so it holds no pipeline state.
fn install_interrupt() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::SeqCst);
    })?;
    Ok(interrupted)
}

/// Wait until `frames` frames were presented, the timeout passes, or Ctrl+C
fn wait_for_frames(
    controller: &PipelineController,
    frames: Option<u64>,
    timeout: Option<Duration>,
    interrupted: &AtomicBool,
) {
    let start = Instant::now();
    loop {
        if interrupted.load(Ordering::SeqCst) || controller.state() != PipelineState::Running {
            break;
        }
        if frames.is_some_and(|n| controller.stats().presented >= n) {
            break;
        }
        if timeout.is_some_and(|t| start.elapsed() >= t) {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Run the pipeline without a view and print statistics as JSON
pub fn run_headless(
    config: &Config,
    frames: Option<u64>,
    duration: Option<u64>,
    software: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let controller = build_controller(config, surface_factory(software, NullHost::factory()));
    controller.configure()?;
    let interrupted = install_interrupt()?;

    eprintln!(
        "Running {} filter (press Ctrl+C to stop)",
        controller.settings().filter
    );
    wait_for_frames(
        &controller,
        frames,
        duration.map(Duration::from_secs),
        &interrupted,
    );
    controller.stop();

    println!("{}", serde_json::to_string_pretty(&controller.stats())?);
    Ok(())
}

/// Present `frames` frames and write the last one as PNG
pub fn snapshot(
    config: &Config,
    output: Option<PathBuf>,
    frames: u64,
    software: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = SnapshotHost::new();
    let controller = build_controller(config, surface_factory(software, host.factory()));
    controller.configure()?;
    let interrupted = install_interrupt()?;

    wait_for_frames(
        &controller,
        Some(frames.max(1)),
        Some(Duration::from_secs(10)),
        &interrupted,
    );
    controller.stop();

    let output_path = output.unwrap_or_else(|| {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        default_snapshot_dir().join(format!("snapshot_{}.png", timestamp))
    });
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    host.save_png(&output_path)?;
    println!("Snapshot saved: {}", output_path.display());
    Ok(())
}

/// Print the effective configuration, optionally writing it to disk
pub fn print_config(config: &Config, write: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if write {
        let path = config.save()?;
        eprintln!("Configuration written to {}", path.display());
    } else if let Ok(path) = Config::config_path() {
        eprintln!("Configuration file: {}", path.display());
    }
    Ok(())
}

fn default_snapshot_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        assert_eq!(parse_source("test"), Ok(SourceKind::TestPattern));
        assert_eq!(
            parse_source("/dev/video0"),
            Ok(SourceKind::V4l2 {
                path: "/dev/video0".into()
            })
        );
        assert_eq!(
            parse_source("pipewire:42"),
            Ok(SourceKind::PipeWire {
                node: Some("42".into())
            })
        );
        assert!(parse_source("webcam").is_err());
    }

    #[test]
    fn test_interrupt_ends_wait() {
        let config = Config {
            source: SourceKind::TestPattern,
            ..Config::default()
        };
        let controller = build_controller(&config, surface_factory(true, NullHost::factory()));
        controller.configure().unwrap();

        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&interrupted);
        let signal = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            flag.store(true, Ordering::SeqCst);
        });

        let start = Instant::now();
        wait_for_frames(&controller, None, None, &interrupted);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(controller.state(), PipelineState::Running);
        signal.join().unwrap();

        controller.stop();
        assert_eq!(controller.state(), PipelineState::Stopped);
    }
}
