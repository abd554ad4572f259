// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic test pattern source
//!
//! Moving color bars at a fixed resolution, frame rate and pixel format,
//! produced on a capture loop thread. Used by tests, demos and machines
//! without a camera.

use super::format_converters::rgba_to_format;
use super::frame_loop::{CaptureLoopController, LoopAction};
use super::types::*;
use super::{FrameSink, FrameSource};
use crate::constants::timing;
use crate::errors::{PipelineError, PipelineResult, WiringStage};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

/// SMPTE-ish bar colors
const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

/// Render one RGBA frame of bars scrolled by `sequence` pixels
pub fn render_bars(width: u32, height: u32, sequence: u64) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let mut rgba = Vec::with_capacity(w * h * 4);
    let bar_width = (w / BARS.len()).max(1);
    for _ in 0..h {
        for x in 0..w {
            let shifted = (x + sequence as usize) % (bar_width * BARS.len());
            let [r, g, b] = BARS[(shifted / bar_width).min(BARS.len() - 1)];
            rgba.extend_from_slice(&[r, g, b, 255]);
        }
    }
    rgba
}

fn encode(rgba: &[u8], width: u32, height: u32, format: PixelFormat) -> Option<Vec<u8>> {
    if format == PixelFormat::BayerRGGB {
        // Keep the channel each mosaic site would have sampled
        let w = width as usize;
        return Some(
            rgba.chunks_exact(4)
                .enumerate()
                .map(|(i, px)| match ((i / w) % 2, (i % w) % 2) {
                    (0, 0) => px[0],
                    (1, 1) => px[2],
                    _ => px[1],
                })
                .collect(),
        );
    }
    rgba_to_format(rgba, width, height, format)
}

/// Frame source producing moving color bars
pub struct TestPatternSource {
    format: CameraFormat,
    name: String,
    available: bool,
    fail_stage: Option<WiringStage>,
    frame_limit: Option<u64>,
    input_attached: bool,
    sink: Option<FrameSink>,
    delivering: Arc<AtomicBool>,
    capture_loop: Option<CaptureLoopController>,
}

impl TestPatternSource {
    pub fn new(format: CameraFormat) -> Self {
        Self {
            format,
            name: format!("Test pattern {}", format),
            available: true,
            fail_stage: None,
            frame_limit: None,
            input_attached: false,
            sink: None,
            delivering: Arc::new(AtomicBool::new(false)),
            capture_loop: None,
        }
    }

    /// A source whose device can never be found
    pub fn unavailable(format: CameraFormat) -> Self {
        Self {
            available: false,
            ..Self::new(format)
        }
    }

    /// Simulate a wiring failure at `stage`
    pub fn with_failure(mut self, stage: WiringStage) -> Self {
        self.fail_stage = Some(stage);
        self
    }

    /// End the capture loop after `frames` frames
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    fn check_stage(&self, stage: WiringStage) -> PipelineResult<()> {
        if self.fail_stage == Some(stage) {
            return Err(PipelineError::wiring(stage, "simulated wiring failure"));
        }
        Ok(())
    }
}

impl FrameSource for TestPatternSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn discover(&mut self) -> PipelineResult<()> {
        if !self.available {
            return Err(PipelineError::DeviceUnavailable(format!(
                "{} is not connected",
                self.name
            )));
        }
        if self.format.framerate.frame_interval().is_none() {
            return Err(PipelineError::DeviceUnavailable(format!(
                "{} has a zero frame rate",
                self.name
            )));
        }
        let probe = render_bars(2, 2, 0);
        if encode(&probe, 2, 2, self.format.pixel_format).is_none() {
            return Err(PipelineError::DeviceUnavailable(format!(
                "{} cannot emit {}",
                self.name, self.format.pixel_format
            )));
        }
        debug!(name = %self.name, "Test pattern discovered");
        Ok(())
    }

    fn attach_input(&mut self) -> PipelineResult<()> {
        self.check_stage(WiringStage::Input)?;
        self.input_attached = true;
        Ok(())
    }

    fn attach_output(&mut self, sink: FrameSink) -> PipelineResult<()> {
        self.check_stage(WiringStage::Output)?;
        if !self.input_attached {
            return Err(PipelineError::wiring(WiringStage::Output, "input not attached"));
        }
        self.sink = Some(sink);
        Ok(())
    }

    fn commit(&mut self) -> PipelineResult<()> {
        self.check_stage(WiringStage::Commit)?;
        let sink = self
            .sink
            .clone()
            .ok_or_else(|| PipelineError::wiring(WiringStage::Commit, "output not attached"))?;

        let format = self.format;
        let frame_limit = self.frame_limit;
        let delivering = Arc::clone(&self.delivering);
        let Some(interval) = format.framerate.frame_interval() else {
            return Err(PipelineError::wiring(WiringStage::Commit, "zero frame rate"));
        };
        let mut sequence = 0u64;
        let mut deadline = Instant::now();

        self.delivering.store(true, Ordering::Release);
        let capture_loop = CaptureLoopController::start("fxcam-test-pattern", move || {
            if !delivering.load(Ordering::Acquire) {
                thread::sleep(timing::PAUSED_POLL_INTERVAL);
                deadline = Instant::now();
                return LoopAction::Continue;
            }
            if frame_limit.is_some_and(|limit| sequence >= limit) {
                return LoopAction::Stop;
            }

            let now = Instant::now();
            if now < deadline {
                thread::sleep(deadline - now);
            }
            deadline = deadline.max(now) + interval;

            let rgba = render_bars(format.width, format.height, sequence);
            if let Some(data) = encode(&rgba, format.width, format.height, format.pixel_format) {
                sink(RawFrame::packed(
                    format.width,
                    format.height,
                    format.pixel_format,
                    data,
                    sequence,
                ));
            }
            sequence += 1;
            LoopAction::Continue
        })
        .map_err(|e| {
            self.delivering.store(false, Ordering::Release);
            PipelineError::wiring(WiringStage::Commit, format!("Failed to spawn capture thread: {}", e))
        })?;

        self.capture_loop = Some(capture_loop);
        info!(name = %self.name, "Test pattern delivering");
        Ok(())
    }

    fn start(&mut self) -> PipelineResult<()> {
        if self.capture_loop.is_none() {
            return self.commit();
        }
        self.delivering.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) {
        if self.delivering.swap(false, Ordering::AcqRel) {
            debug!(name = %self.name, "Test pattern paused");
        }
    }

    fn is_delivering(&self) -> bool {
        self.delivering.load(Ordering::Acquire)
    }

    fn teardown(&mut self) {
        self.delivering.store(false, Ordering::Release);
        if let Some(mut capture_loop) = self.capture_loop.take() {
            capture_loop.stop();
        }
        self.sink = None;
        self.input_attached = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn format(pixel_format: PixelFormat) -> CameraFormat {
        CameraFormat {
            width: 16,
            height: 8,
            framerate: Framerate::from_int(200),
            pixel_format,
        }
    }

    fn wire(source: &mut TestPatternSource) -> Arc<Mutex<Vec<RawFrame>>> {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let frames_clone = Arc::clone(&frames);
        source.discover().unwrap();
        source.attach_input().unwrap();
        source
            .attach_output(Arc::new(move |frame| frames_clone.lock().unwrap().push(frame)))
            .unwrap();
        frames
    }

    #[test]
    fn test_bars_scroll_with_sequence() {
        let a = render_bars(16, 1, 0);
        let b = render_bars(16, 1, 2);
        assert_eq!(&a[8..12], &b[0..4]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_delivers_sequenced_frames_until_limit() {
        let mut source = TestPatternSource::new(format(PixelFormat::YUYV)).with_frame_limit(3);
        let frames = wire(&mut source);
        source.commit().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while frames.lock().unwrap().len() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].sequence, 2);
        assert_eq!(frames[0].format, PixelFormat::YUYV);
        assert_eq!(frames[0].data.len(), 16 * 8 * 2);
    }

    #[test]
    fn test_stop_pauses_delivery() {
        let mut source = TestPatternSource::new(format(PixelFormat::RGBA));
        let frames = wire(&mut source);
        source.commit().unwrap();
        thread::sleep(Duration::from_millis(30));

        source.stop();
        source.stop();
        assert!(!source.is_delivering());
        thread::sleep(Duration::from_millis(20));
        let count = frames.lock().unwrap().len();
        thread::sleep(Duration::from_millis(40));
        assert_eq!(frames.lock().unwrap().len(), count);

        source.start().unwrap();
        assert!(source.is_delivering());
    }

    #[test]
    fn test_unavailable_and_simulated_failures() {
        let mut missing = TestPatternSource::unavailable(format(PixelFormat::RGBA));
        assert!(matches!(missing.discover(), Err(PipelineError::DeviceUnavailable(_))));

        let mut broken = TestPatternSource::new(format(PixelFormat::RGBA)).with_failure(WiringStage::Input);
        broken.discover().unwrap();
        assert_eq!(broken.attach_input().unwrap_err().stage(), Some(WiringStage::Input));
    }
}
