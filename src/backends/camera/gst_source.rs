// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer capture source (`v4l2src` / `pipewiresrc` into an `appsink`)

use super::types::*;
use super::{FrameSink, FrameSource, v4l2_utils};
use crate::constants::{pipeline, timing};
use crate::errors::{PipelineError, PipelineResult, WiringStage};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Camera source backed by a GStreamer pipeline
///
/// The appsink keeps a single buffer and drops older ones, so a slow
/// consumer never builds a backlog inside GStreamer.
pub struct GStreamerSource {
    device: CameraDevice,
    output_format: PixelFormat,
    pipeline: Option<gstreamer::Pipeline>,
    appsink: Option<AppSink>,
    delivering: Arc<AtomicBool>,
    sequence: Arc<AtomicU64>,
}

impl GStreamerSource {
    pub fn new(device: CameraDevice, output_format: PixelFormat) -> Self {
        Self {
            device,
            output_format,
            pipeline: None,
            appsink: None,
            delivering: Arc::new(AtomicBool::new(false)),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    fn source_element(&self) -> PipelineResult<(&'static str, String)> {
        match &self.device.kind {
            SourceKind::V4l2 { path } => Ok(("v4l2src", format!("v4l2src device={}", path))),
            SourceKind::PipeWire { node: Some(node) } => {
                Ok(("pipewiresrc", format!("pipewiresrc target-object={}", node)))
            }
            SourceKind::PipeWire { node: None } => Ok(("pipewiresrc", "pipewiresrc".to_string())),
            SourceKind::TestPattern => Err(PipelineError::DeviceUnavailable(
                "test pattern is not a GStreamer device".to_string(),
            )),
        }
    }

    /// Launch description for the capture pipeline
    pub fn launch_description(&self) -> PipelineResult<String> {
        let (_, src) = self.source_element()?;
        let format = &self.device.format;
        Ok(format!(
            "{src} ! videoconvert n-threads={threads} ! videoscale ! videorate drop-only=true ! \
             video/x-raw,format={fmt},width=(int){w},height=(int){h},framerate=(fraction){fps} ! \
             appsink name={sink}",
            threads = pipeline::videoconvert_threads(),
            fmt = self.output_format.to_gst_format_string(),
            w = format.width,
            h = format.height,
            fps = format.framerate.as_gst_fraction(),
            sink = pipeline::APPSINK_NAME,
        ))
    }

    fn running_pipeline(&self, stage: WiringStage) -> PipelineResult<&gstreamer::Pipeline> {
        self.pipeline
            .as_ref()
            .ok_or_else(|| PipelineError::wiring(stage, "capture pipeline has not been built"))
    }
}

impl FrameSource for GStreamerSource {
    fn name(&self) -> &str {
        &self.device.name
    }

    fn discover(&mut self) -> PipelineResult<()> {
        gstreamer::init().map_err(|e| PipelineError::DeviceUnavailable(e.to_string()))?;

        let (element, _) = self.source_element()?;
        if gstreamer::ElementFactory::find(element).is_none() {
            return Err(PipelineError::DeviceUnavailable(format!(
                "GStreamer element {} is not installed",
                element
            )));
        }

        if self.output_format.is_bayer() {
            return Err(PipelineError::DeviceUnavailable(format!(
                "appsink output format {} is not a raw video format",
                self.output_format
            )));
        }

        if let SourceKind::V4l2 { path } = &self.device.kind {
            let info = v4l2_utils::probe_capture_device(path).map_err(PipelineError::DeviceUnavailable)?;
            info!(card = %info.card, driver = %info.driver, path = %info.real_path, "Camera device found");
        }

        Ok(())
    }

    fn attach_input(&mut self) -> PipelineResult<()> {
        let description = self.launch_description()?;
        info!(device = %self.device.name, format = %self.device.format, "Creating capture pipeline");
        debug!(%description, "Launch description");

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| PipelineError::wiring(WiringStage::Input, e.to_string()))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| PipelineError::wiring(WiringStage::Input, "launch did not produce a pipeline"))?;

        // Prerolling in READY opens the device and surfaces busy/missing nodes here
        if let Err(e) = pipeline.set_state(gstreamer::State::Ready) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(PipelineError::wiring(
                WiringStage::Input,
                format!("Failed to open device: {}", e),
            ));
        }

        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn attach_output(&mut self, sink: FrameSink) -> PipelineResult<()> {
        let pipeline = self.running_pipeline(WiringStage::Output)?;
        let appsink = pipeline
            .by_name(pipeline::APPSINK_NAME)
            .ok_or_else(|| PipelineError::wiring(WiringStage::Output, "Failed to get appsink"))?
            .dynamic_cast::<AppSink>()
            .map_err(|_| PipelineError::wiring(WiringStage::Output, "Failed to cast appsink"))?;

        appsink.set_property("sync", false);
        appsink.set_property("max-buffers", pipeline::MAX_BUFFERS);
        appsink.set_property("drop", true);
        appsink.set_property("enable-last-sample", false);

        let delivering = Arc::clone(&self.delivering);
        let sequence = Arc::clone(&self.sequence);

        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let captured_at = Instant::now();
                    let sample = appsink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;

                    if !delivering.load(Ordering::Acquire) {
                        return Ok(gstreamer::FlowSuccess::Ok);
                    }
                    let frame_num = sequence.fetch_add(1, Ordering::Relaxed);

                    let Some(buffer) = sample.buffer_owned() else {
                        if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                            error!(frame = frame_num, "No buffer in sample");
                        }
                        return Ok(gstreamer::FlowSuccess::Ok);
                    };

                    if buffer.flags().contains(gstreamer::BufferFlags::CORRUPTED) {
                        if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                            warn!(frame = frame_num, "Buffer marked as corrupted, skipping frame");
                        }
                        return Ok(gstreamer::FlowSuccess::Ok);
                    }

                    let Some(video_info) = sample.caps().and_then(|caps| VideoInfo::from_caps(caps).ok()) else {
                        if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                            error!(frame = frame_num, "Failed to get video info");
                        }
                        return Ok(gstreamer::FlowSuccess::Ok);
                    };

                    let gst_format = video_info.format().to_string();
                    let Some(format) = PixelFormat::from_gst_format(&gst_format) else {
                        if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                            warn!(frame = frame_num, format = %gst_format, "Unsupported appsink format");
                        }
                        return Ok(gstreamer::FlowSuccess::Ok);
                    };

                    let sensor_timestamp_ns = buffer.pts().map(|t| t.nseconds());
                    let data = match buffer.into_mapped_buffer_readable() {
                        Ok(mapped) => FrameData::from_mapped_buffer(mapped),
                        Err(_) => {
                            if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                                error!(frame = frame_num, "Failed to map buffer");
                            }
                            return Ok(gstreamer::FlowSuccess::Ok);
                        }
                    };

                    let strides = video_info.stride();
                    let offsets = video_info.offset();
                    let yuv_planes = match format {
                        PixelFormat::NV12 => Some(YuvPlanes {
                            uv_offset: offsets[1],
                            uv_stride: strides[1] as u32,
                            v_offset: 0,
                            v_stride: 0,
                        }),
                        PixelFormat::I420 => Some(YuvPlanes {
                            uv_offset: offsets[1],
                            uv_stride: strides[1] as u32,
                            v_offset: offsets[2],
                            v_stride: strides[2] as u32,
                        }),
                        _ => None,
                    };

                    if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                        debug!(
                            frame = frame_num,
                            width = video_info.width(),
                            height = video_info.height(),
                            stride = strides[0],
                            %format,
                            "Frame captured"
                        );
                    }

                    sink(RawFrame {
                        width: video_info.width(),
                        height: video_info.height(),
                        data,
                        format,
                        stride: strides[0] as u32,
                        yuv_planes,
                        captured_at,
                        sensor_timestamp_ns,
                        sequence: frame_num,
                    });

                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        self.appsink = Some(appsink);
        Ok(())
    }

    fn commit(&mut self) -> PipelineResult<()> {
        let pipeline = self.running_pipeline(WiringStage::Commit)?;
        self.delivering.store(true, Ordering::Release);
        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            self.delivering.store(false, Ordering::Release);
            return Err(PipelineError::wiring(
                WiringStage::Commit,
                format!("Failed to start pipeline: {}", e),
            ));
        }
        info!(device = %self.device.name, "Capture pipeline playing");
        Ok(())
    }

    fn start(&mut self) -> PipelineResult<()> {
        if self.delivering.load(Ordering::Acquire) {
            return Ok(());
        }
        self.commit()
    }

    fn stop(&mut self) {
        if !self.delivering.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(pipeline) = &self.pipeline {
            // Posted to a GStreamer worker so this is safe from the streaming thread
            pipeline.call_async(|pipeline| {
                if let Err(e) = pipeline.set_state(gstreamer::State::Paused) {
                    warn!(error = %e, "Failed to pause capture pipeline");
                }
            });
        }
        info!(device = %self.device.name, "Capture pipeline stopping");
    }

    fn is_delivering(&self) -> bool {
        self.delivering.load(Ordering::Acquire)
    }

    fn teardown(&mut self) {
        self.delivering.store(false, Ordering::Release);
        if let Some(appsink) = self.appsink.take() {
            appsink.set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
        }
        if let Some(pipeline) = self.pipeline.take()
            && let Err(e) = pipeline.set_state(gstreamer::State::Null)
        {
            debug!(error = %e, "Pipeline state change to NULL had issues");
        }
    }
}

impl Drop for GStreamerSource {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(kind: SourceKind) -> CameraDevice {
        CameraDevice {
            name: "test".to_string(),
            kind,
            format: CameraFormat {
                width: 640,
                height: 480,
                framerate: Framerate::from_int(30),
                pixel_format: PixelFormat::YUYV,
            },
            mirrored: false,
            orientation: Orientation::LandscapeRight,
        }
    }

    #[test]
    fn test_launch_description_pins_appsink_caps() {
        let source = GStreamerSource::new(
            device(SourceKind::V4l2 {
                path: "/dev/video0".to_string(),
            }),
            PixelFormat::RGBA,
        );
        let description = source.launch_description().unwrap();
        assert!(description.starts_with("v4l2src device=/dev/video0 ! "));
        assert!(description.contains("format=RGBA,width=(int)640,height=(int)480"));
        assert!(description.ends_with(&format!("appsink name={}", pipeline::APPSINK_NAME)));
    }

    #[test]
    fn test_pipewire_node_target() {
        let source = GStreamerSource::new(
            device(SourceKind::PipeWire {
                node: Some("42".to_string()),
            }),
            PixelFormat::NV12,
        );
        let description = source.launch_description().unwrap();
        assert!(description.starts_with("pipewiresrc target-object=42 ! "));
        assert!(description.contains("format=NV12"));
    }

    #[test]
    fn test_stop_before_commit_is_noop() {
        let mut source = GStreamerSource::new(device(SourceKind::PipeWire { node: None }), PixelFormat::RGBA);
        source.stop();
        source.stop();
        assert!(!source.is_delivering());
    }

    #[test]
    fn test_missing_v4l2_node_is_unavailable() {
        let mut source = GStreamerSource::new(
            device(SourceKind::V4l2 {
                path: "/dev/fxcam-missing".to_string(),
            }),
            PixelFormat::RGBA,
        );
        match source.discover() {
            Err(PipelineError::DeviceUnavailable(_)) => {}
            other => panic!("expected DeviceUnavailable, got {:?}", other),
        }
    }
}
