// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline lifecycle and the capture-to-presentation boundary
//!
//! ```text
//! Idle --configure--> Configuring --(inputs, outputs wired)--> Running
//!   ^                      |                                   |   ^
//!   +------- failure ------+                              stop |   | start
//!                                                              v   |
//!                                                             Stopped
//! ```
//!
//! Frames are filtered and geometry-corrected on the source's capture
//! thread, then published into a single-slot mailbox read by the
//! presentation thread. Lock order is state, then source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, error, info, trace, warn};

use super::geometry::{ContentFit, GeometryCorrector, Size, Transform};
use super::mailbox::FrameMailbox;
use super::stats::{PipelineStats, StatsSnapshot};
use super::PipelineState;
use crate::backends::camera::{FrameSink, FrameSource, Orientation, RawFrame};
use crate::constants::{presentation, timing};
use crate::errors::{DropReason, PipelineError, PipelineResult};
use crate::filters::{ComicParams, FilterKind, FilterStage, FilteredImage};
use crate::presentation::{PresentationContext, SurfaceFactory, SurfaceRequest};

/// Per-pipeline settings fixed at construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub filter: FilterKind,
    pub comic: ComicParams,
    pub content_fit: ContentFit,
    pub orientation: Orientation,
    /// The sensor image is mirrored (front camera)
    pub mirrored: bool,
    /// Initial surface size in pixels
    pub target: Size,
    pub density: f64,
    pub refresh_hz: u32,
    pub drawable_count: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            filter: FilterKind::default(),
            comic: ComicParams::default(),
            content_fit: ContentFit::default(),
            orientation: Orientation::default(),
            mirrored: false,
            target: Size::new(640.0, 480.0),
            density: 1.0,
            refresh_hz: timing::DEFAULT_REFRESH_HZ,
            drawable_count: presentation::DEFAULT_DRAWABLE_COUNT,
        }
    }
}

/// A filtered frame with its display transform, ready to present
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    pub image: FilteredImage,
    pub transform: Transform,
    /// Surface size the transform was computed for
    pub target: Size,
}

#[derive(Debug, Clone, Copy)]
struct ViewMetrics {
    target: Size,
    density: f64,
}

/// Runs on the capture thread for every delivered frame
struct CaptureStage {
    filter: FilterStage,
    geometry: Mutex<GeometryCorrector>,
    metrics: Arc<Mutex<ViewMetrics>>,
    orientation: Orientation,
    mirrored: bool,
    mailbox: Arc<FrameMailbox<PreparedFrame>>,
    stats: Arc<PipelineStats>,
    delivering: Arc<AtomicBool>,
    busy: AtomicBool,
}

impl CaptureStage {
    fn process(&self, frame: RawFrame) {
        if !self.delivering.load(Ordering::Acquire) {
            return;
        }
        let captured = self.stats.record_captured();
        let sequence = frame.sequence;

        // Sources may deliver from several threads at once; only one frame is prepared at a time
        if self.busy.swap(true, Ordering::AcqRel) {
            self.drop_frame(DropReason::SourceBusy, sequence);
            return;
        }
        let result = self.prepare(frame);
        self.busy.store(false, Ordering::Release);

        match result {
            Ok(prepared) => {
                if captured % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(
                        captured,
                        sequence,
                        width = prepared.image.width(),
                        height = prepared.image.height(),
                        scale = prepared.transform.scale(),
                        "Capture progress"
                    );
                }
                if self.mailbox.publish(prepared).is_some() {
                    self.drop_frame(DropReason::MailboxOverwrite, sequence);
                }
            }
            Err(reason) => self.drop_frame(reason, sequence),
        }
    }

    fn prepare(&self, frame: RawFrame) -> Result<PreparedFrame, DropReason> {
        let image = self.filter.apply(frame, &self.stats)?;
        self.stats.record_filtered();

        let metrics = *lock(&self.metrics);
        let correction = {
            let mut geometry = lock(&self.geometry);
            geometry.set_density(metrics.density);
            geometry.compute_transform(image.extent, metrics.target, self.orientation, self.mirrored)
        };
        if correction.skip {
            return Err(DropReason::DegenerateExtent);
        }

        Ok(PreparedFrame {
            image,
            transform: correction.transform,
            target: metrics.target,
        })
    }

    fn drop_frame(&self, reason: DropReason, sequence: u64) {
        let count = self.stats.record_drop(reason);
        if count % timing::FRAME_LOG_INTERVAL == 1 {
            debug!(%reason, count, sequence, "Frame dropped");
        } else {
            trace!(%reason, sequence, "Frame dropped");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    state: Mutex<PipelineState>,
    source: Mutex<Box<dyn FrameSource>>,
    surface_factory: SurfaceFactory,
    settings: PipelineSettings,
    metrics: Arc<Mutex<ViewMetrics>>,
    presentation: Mutex<Option<PresentationContext>>,
    mailbox: Arc<FrameMailbox<PreparedFrame>>,
    stats: Arc<PipelineStats>,
    delivering: Arc<AtomicBool>,
    rendering: Arc<AtomicBool>,
}

impl Inner {
    fn wire(&self) -> PipelineResult<()> {
        let mut source = lock(&self.source);

        source.discover()?;
        info!(source = source.name(), "Capture device discovered");

        if let Err(e) = source.attach_input() {
            source.teardown();
            return Err(e);
        }

        if let Err(e) = self.attach_output(&mut **source) {
            self.teardown(&mut **source);
            return Err(e);
        }

        self.delivering.store(true, Ordering::Release);
        if let Err(e) = source.commit() {
            self.teardown(&mut **source);
            return Err(e);
        }
        Ok(())
    }

    /// Presentation surface init, then sink wiring
    fn attach_output(&self, source: &mut dyn FrameSource) -> PipelineResult<()> {
        self.rendering.store(true, Ordering::Release);
        let context = PresentationContext::spawn(
            Arc::clone(&self.surface_factory),
            SurfaceRequest {
                drawable_count: self.settings.drawable_count,
            },
            Arc::clone(&self.mailbox),
            Arc::clone(&self.stats),
            Arc::clone(&self.rendering),
            self.settings.refresh_hz,
        )?;
        *lock(&self.presentation) = Some(context);

        let metrics = *lock(&self.metrics);
        let stage = Arc::new(CaptureStage {
            filter: FilterStage::new(self.settings.filter, self.settings.comic),
            geometry: Mutex::new(GeometryCorrector::new(self.settings.content_fit, metrics.density)),
            metrics: Arc::clone(&self.metrics),
            orientation: self.settings.orientation,
            mirrored: self.settings.mirrored,
            mailbox: Arc::clone(&self.mailbox),
            stats: Arc::clone(&self.stats),
            delivering: Arc::clone(&self.delivering),
            busy: AtomicBool::new(false),
        });
        debug!(filter = stage.filter.name(), "Frame sink wired");
        let sink: FrameSink = Arc::new(move |frame: RawFrame| stage.process(frame));
        source.attach_output(sink)
    }

    fn teardown(&self, source: &mut dyn FrameSource) {
        self.delivering.store(false, Ordering::Release);
        self.rendering.store(false, Ordering::Release);
        source.teardown();
        if let Some(context) = lock(&self.presentation).take() {
            context.shutdown();
        }
        let _ = self.mailbox.take();
    }
}

/// Orchestrates a frame source and its presentation surface
///
/// Cheap to clone; clones control the same pipeline.
#[derive(Clone)]
pub struct PipelineController {
    inner: Arc<Inner>,
}

impl PipelineController {
    pub fn new(
        source: Box<dyn FrameSource>,
        surface_factory: SurfaceFactory,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(PipelineState::Idle),
                source: Mutex::new(source),
                surface_factory,
                metrics: Arc::new(Mutex::new(ViewMetrics {
                    target: settings.target,
                    density: settings.density,
                })),
                settings,
                presentation: Mutex::new(None),
                mailbox: Arc::new(FrameMailbox::new()),
                stats: Arc::new(PipelineStats::default()),
                delivering: Arc::new(AtomicBool::new(false)),
                rendering: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    pub fn state(&self) -> PipelineState {
        *lock(&self.inner.state)
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.inner.settings
    }

    /// Wire the pipeline: discovery, input, output, commit
    ///
    /// Only allowed from `Idle`. On failure partial wiring is torn down,
    /// the state returns to `Idle` and the failing step's error is returned.
    pub fn configure(&self) -> PipelineResult<()> {
        {
            let mut state = lock(&self.inner.state);
            if *state != PipelineState::Idle {
                return Err(PipelineError::InvalidState(*state));
            }
            *state = PipelineState::Configuring;
        }
        info!("Configuring pipeline");

        let result = self.inner.wire();

        let mut state = lock(&self.inner.state);
        match result {
            Ok(()) => {
                *state = PipelineState::Running;
                info!(filter = %self.inner.settings.filter, "Pipeline running");
                Ok(())
            }
            Err(e) => {
                *state = PipelineState::Idle;
                error!(error = %e, stage = ?e.stage(), "Pipeline configuration failed");
                Err(e)
            }
        }
    }

    /// Run [`Self::configure`] on a background thread
    pub fn configure_with<F>(&self, on_complete: F) -> std::io::Result<thread::JoinHandle<()>>
    where
        F: FnOnce(PipelineResult<()>) + Send + 'static,
    {
        let controller = self.clone();
        thread::Builder::new()
            .name("fxcam-configure".to_string())
            .spawn(move || on_complete(controller.configure()))
    }

    /// Resume a stopped pipeline; no-op in any other state
    pub fn start(&self) -> PipelineResult<()> {
        let mut state = lock(&self.inner.state);
        if *state != PipelineState::Stopped {
            debug!(state = %*state, "Start ignored");
            return Ok(());
        }

        self.inner.rendering.store(true, Ordering::Release);
        self.inner.delivering.store(true, Ordering::Release);
        if let Err(e) = lock(&self.inner.source).start() {
            self.inner.delivering.store(false, Ordering::Release);
            self.inner.rendering.store(false, Ordering::Release);
            warn!(error = %e, "Failed to restart capture");
            return Err(e);
        }
        *state = PipelineState::Running;
        info!("Pipeline restarted");
        Ok(())
    }

    /// Stop delivery and rendering; no-op unless running
    ///
    /// Never waits on the capture thread or on GPU work. Device and GPU
    /// resources stay allocated for [`Self::start`].
    pub fn stop(&self) {
        let mut state = lock(&self.inner.state);
        if *state != PipelineState::Running {
            debug!(state = %*state, "Stop ignored");
            return;
        }

        self.inner.delivering.store(false, Ordering::Release);
        self.inner.rendering.store(false, Ordering::Release);
        lock(&self.inner.source).stop();
        *state = PipelineState::Stopped;
        info!("Pipeline stopped");
    }

    /// The view host reports a new surface size or density
    pub fn set_target_size(&self, target: Size, density: f64) {
        let mut metrics = lock(&self.inner.metrics);
        if metrics.target != target || metrics.density != density {
            debug!(width = target.width, height = target.height, density, "Target size changed");
            *metrics = ViewMetrics { target, density };
        }
    }

    pub fn target_size(&self) -> Size {
        lock(&self.inner.metrics).target
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.delivering.store(false, Ordering::Release);
        self.rendering.store(false, Ordering::Release);
        if let Some(context) = lock(&self.presentation).take() {
            context.shutdown();
        }
    }
}
