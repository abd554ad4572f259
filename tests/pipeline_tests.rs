// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the pipeline lifecycle and frame flow
//!
//! All tests use the test pattern source and CPU or mock render backends,
//! so no camera or GPU is required.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use fxcam::backends::camera::{CameraFormat, Framerate, PixelFormat, TestPatternSource};
use fxcam::errors::RenderResult;
use fxcam::filters::{FilterKind, FilteredImage};
use fxcam::pipeline::{Size, Transform};
use fxcam::presentation::{
    FramePresenter, NullHost, PresentationSurface, PresentedFrame, RenderBackend, SnapshotHost,
    SurfaceFactory, SurfaceHost, SurfaceRequest, software_surface_factory,
};
use fxcam::{DropReason, PipelineController, PipelineError, PipelineSettings, PipelineState, WiringStage};

fn format(fps: u32, pixel_format: PixelFormat) -> CameraFormat {
    CameraFormat {
        width: 64,
        height: 48,
        framerate: Framerate::from_int(fps),
        pixel_format,
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        target: Size::new(32.0, 24.0),
        refresh_hz: 120,
        ..PipelineSettings::default()
    }
}

fn controller_with(source: TestPatternSource, factory: SurfaceFactory) -> PipelineController {
    PipelineController::new(Box::new(source), factory, settings())
}

/// Poll `condition` for up to five seconds
fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Backend whose submitted work never completes
struct StuckBackend;

impl RenderBackend for StuckBackend {
    type Target = ();

    fn create_target(&mut self, _width: u32, _height: u32, _slot: usize) -> RenderResult<()> {
        Ok(())
    }

    fn render(&mut self, _: &(), _: &FilteredImage, _: &Transform) -> RenderResult<()> {
        Ok(())
    }

    fn present(&mut self, _: &()) -> RenderResult<()> {
        Ok(())
    }

    fn is_idle(&self, _: &()) -> bool {
        false
    }
}

/// Backend that takes longer to render than the source takes to capture
struct SlowBackend;

impl RenderBackend for SlowBackend {
    type Target = ();

    fn create_target(&mut self, _width: u32, _height: u32, _slot: usize) -> RenderResult<()> {
        Ok(())
    }

    fn render(&mut self, _: &(), _: &FilteredImage, _: &Transform) -> RenderResult<()> {
        thread::sleep(Duration::from_millis(40));
        Ok(())
    }

    fn present(&mut self, _: &()) -> RenderResult<()> {
        Ok(())
    }

    fn is_idle(&self, _: &()) -> bool {
        true
    }
}

fn stuck_factory() -> SurfaceFactory {
    Arc::new(|request: SurfaceRequest| {
        let surface = PresentationSurface::new(StuckBackend, request.drawable_count, Box::new(NullHost));
        Ok(Box::new(surface) as Box<dyn FramePresenter>)
    })
}

/// Records the sequence number of every presented frame
struct SequenceHost {
    seen: Arc<Mutex<Vec<u64>>>,
}

impl SurfaceHost for SequenceHost {
    fn on_presented(&mut self, frame: PresentedFrame) {
        self.seen.lock().unwrap().push(frame.sequence);
    }
}

fn slow_factory(seen: Arc<Mutex<Vec<u64>>>) -> SurfaceFactory {
    Arc::new(move |request: SurfaceRequest| {
        let host = SequenceHost {
            seen: Arc::clone(&seen),
        };
        let surface = PresentationSurface::new(SlowBackend, request.drawable_count, Box::new(host));
        Ok(Box::new(surface) as Box<dyn FramePresenter>)
    })
}

fn gpu_unavailable_factory() -> SurfaceFactory {
    Arc::new(|_: SurfaceRequest| {
        Err(PipelineError::GpuContextUnavailable(
            "no Vulkan adapter".to_string(),
        ))
    })
}

#[test]
fn test_frames_flow_to_presentation() {
    let host = SnapshotHost::new();
    let controller = controller_with(
        TestPatternSource::new(format(100, PixelFormat::YUYV)),
        software_surface_factory(host.factory()),
    );

    controller.configure().unwrap();
    assert_eq!(controller.state(), PipelineState::Running);
    assert!(wait_until(|| controller.stats().presented >= 3));

    controller.stop();
    assert_eq!(controller.state(), PipelineState::Stopped);
    thread::sleep(Duration::from_millis(100));

    let stats = controller.stats();
    assert!(stats.captured >= stats.filtered);
    assert!(stats.filtered >= stats.presented);

    let image = host.latest_image().expect("presented pixels");
    assert_eq!(image.dimensions(), (32, 24));
}

#[test]
fn test_target_resize_rebuilds_drawables() {
    let host = SnapshotHost::new();
    let controller = controller_with(
        TestPatternSource::new(format(100, PixelFormat::RGBA)),
        software_surface_factory(host.factory()),
    );
    controller.configure().unwrap();
    assert!(wait_until(|| host.latest().is_some()));

    controller.set_target_size(Size::new(16.0, 40.0), 2.0);
    assert_eq!(controller.target_size(), Size::new(16.0, 40.0));
    assert!(wait_until(|| host
        .latest()
        .is_some_and(|frame| (frame.width, frame.height) == (16, 40))));
    controller.stop();
}

#[test]
fn test_lifecycle_calls_are_idempotent() {
    let controller = controller_with(
        TestPatternSource::new(format(100, PixelFormat::RGBA)),
        software_surface_factory(NullHost::factory()),
    );

    // Nothing to start or stop before configuration
    controller.start().unwrap();
    controller.stop();
    assert_eq!(controller.state(), PipelineState::Idle);

    controller.configure().unwrap();
    assert_eq!(
        controller.configure(),
        Err(PipelineError::InvalidState(PipelineState::Running))
    );

    controller.start().unwrap();
    assert_eq!(controller.state(), PipelineState::Running);

    controller.stop();
    controller.stop();
    assert_eq!(controller.state(), PipelineState::Stopped);

    controller.start().unwrap();
    controller.start().unwrap();
    assert_eq!(controller.state(), PipelineState::Running);
    controller.stop();
}

#[test]
fn test_stop_halts_presentation() {
    let controller = controller_with(
        TestPatternSource::new(format(100, PixelFormat::RGBA)),
        software_surface_factory(NullHost::factory()),
    );
    controller.configure().unwrap();
    assert!(wait_until(|| controller.stats().presented >= 2));

    controller.stop();
    // Let any frame already inside the presenter finish
    thread::sleep(Duration::from_millis(100));
    let presented = controller.stats().presented;
    thread::sleep(Duration::from_millis(150));
    assert_eq!(controller.stats().presented, presented);

    controller.start().unwrap();
    assert!(wait_until(|| controller.stats().presented > presented));
    controller.stop();
}

#[test]
fn test_missing_device_reports_unavailable() {
    let controller = controller_with(
        TestPatternSource::unavailable(format(30, PixelFormat::RGBA)),
        software_surface_factory(NullHost::factory()),
    );
    let err = controller.configure().unwrap_err();
    assert!(matches!(err, PipelineError::DeviceUnavailable(_)));
    assert_eq!(controller.state(), PipelineState::Idle);
}

#[test]
fn test_wiring_failure_reports_failing_stage() {
    for stage in [WiringStage::Input, WiringStage::Output, WiringStage::Commit] {
        let controller = controller_with(
            TestPatternSource::new(format(30, PixelFormat::RGBA)).with_failure(stage),
            software_surface_factory(NullHost::factory()),
        );
        let err = controller.configure().unwrap_err();
        assert_eq!(err.stage(), Some(stage), "{}", err);
        assert_eq!(controller.state(), PipelineState::Idle);
        assert_eq!(controller.stats().presented, 0);
    }
}

#[test]
fn test_gpu_failure_leaves_pipeline_reconfigurable() {
    let controller = controller_with(
        TestPatternSource::new(format(30, PixelFormat::RGBA)),
        gpu_unavailable_factory(),
    );
    for _ in 0..2 {
        let err = controller.configure().unwrap_err();
        assert!(matches!(err, PipelineError::GpuContextUnavailable(_)), "{}", err);
        assert_eq!(controller.state(), PipelineState::Idle);
    }
}

#[test]
fn test_configure_in_background_reports_result() {
    let controller = controller_with(
        TestPatternSource::new(format(30, PixelFormat::RGBA)),
        software_surface_factory(NullHost::factory()),
    );
    let (tx, rx) = crossbeam_channel::bounded(1);
    let handle = controller
        .configure_with(move |result| {
            let _ = tx.send(result);
        })
        .unwrap();
    handle.join().unwrap();

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Ok(()));
    assert_eq!(controller.state(), PipelineState::Running);
    controller.stop();
}

#[test]
fn test_exhausted_drawables_drop_frames() {
    let controller = PipelineController::new(
        Box::new(TestPatternSource::new(format(200, PixelFormat::RGBA))),
        stuck_factory(),
        PipelineSettings {
            drawable_count: 2,
            ..settings()
        },
    );
    controller.configure().unwrap();

    assert!(wait_until(|| controller.stats().dropped(DropReason::NoDrawable) >= 2));
    assert_eq!(controller.stats().presented, 2);
    controller.stop();
}

#[test]
fn test_slow_presenter_sees_only_latest_frame() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let controller = controller_with(
        TestPatternSource::new(format(200, PixelFormat::RGBA)),
        slow_factory(Arc::clone(&seen)),
    );
    controller.configure().unwrap();

    assert!(wait_until(|| controller.stats().dropped(DropReason::MailboxOverwrite) >= 3));
    assert!(wait_until(|| seen.lock().unwrap().len() >= 3));
    controller.stop();
    thread::sleep(Duration::from_millis(100));

    let stats = controller.stats();
    assert!(stats.presented < stats.filtered);

    // An older frame is never shown after a newer one, and overwritten frames are skipped
    let seen = seen.lock().unwrap();
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]), "{:?}", seen);
    assert!(seen.windows(2).any(|pair| pair[1] - pair[0] > 1), "{:?}", seen);
}

#[test]
fn test_degenerate_target_is_never_presented() {
    let controller = controller_with(
        TestPatternSource::new(format(100, PixelFormat::RGBA)),
        software_surface_factory(NullHost::factory()),
    );
    controller.configure().unwrap();
    assert!(wait_until(|| controller.stats().presented >= 2));

    controller.set_target_size(Size::new(0.0, 24.0), 1.0);
    // Let a frame already in the mailbox or presenter finish
    thread::sleep(Duration::from_millis(100));
    let presented = controller.stats().presented;
    let skipped = controller.stats().dropped(DropReason::DegenerateExtent);
    assert!(skipped > 0);

    assert!(wait_until(|| controller.stats().dropped(DropReason::DegenerateExtent) >= skipped + 3));
    assert_eq!(controller.stats().presented, presented);
    assert_eq!(controller.state(), PipelineState::Running);

    controller.set_target_size(Size::new(32.0, 24.0), 1.0);
    assert!(wait_until(|| controller.stats().presented > presented));
    controller.stop();
}

#[test]
fn test_unconvertible_frames_are_dropped() {
    let controller = controller_with(
        TestPatternSource::new(format(100, PixelFormat::BayerRGGB)),
        software_surface_factory(NullHost::factory()),
    );
    controller.configure().unwrap();

    assert!(wait_until(|| controller.stats().dropped(DropReason::UnsupportedFormat) >= 2));
    assert_eq!(controller.stats().presented, 0);
    controller.stop();
}

#[test]
fn test_filter_choice_is_kept() {
    let controller = PipelineController::new(
        Box::new(TestPatternSource::new(format(30, PixelFormat::RGBA))),
        software_surface_factory(NullHost::factory()),
        PipelineSettings {
            filter: FilterKind::Mono,
            ..settings()
        },
    );
    assert_eq!(controller.settings().filter, FilterKind::Mono);
    assert_eq!(controller.target_size(), Size::new(32.0, 24.0));
}
