// SPDX-License-Identifier: GPL-3.0-only

//! Frame presentation
//!
//! The presentation thread owns the render backend and its drawable pool.
//! A [`PresentationSurface`] is built on that thread by a [`SurfaceFactory`]
//! and is `!Send`, so drawables can never be touched from the capture side.

pub mod drawable;
pub mod hosts;
pub mod software;
pub mod vsync;
pub mod wgpu_renderer;

pub use drawable::{Drawable, DrawablePool};
pub use hosts::{NullHost, SnapshotHost};
pub use software::{SoftwareBackend, software_surface_factory};
pub use vsync::VsyncClock;
pub use wgpu_renderer::{WgpuRenderer, wgpu_surface_factory};

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::backends::camera::frame_loop::{CaptureLoopController, LoopAction};
use crate::constants::{presentation, timing};
use crate::errors::{DropReason, PipelineError, PipelineResult, RenderResult};
use crate::filters::FilteredImage;
use crate::pipeline::geometry::{Size, Transform};
use crate::pipeline::{FrameMailbox, PipelineStats, PreparedFrame};

/// GPU (or CPU) rendering behind a presentation surface
pub trait RenderBackend {
    type Target;

    /// Allocate the render target for pool slot `slot`
    fn create_target(&mut self, width: u32, height: u32, slot: usize) -> RenderResult<Self::Target>;

    /// Draw `image` into `target` through the inverse of `transform`
    fn render(
        &mut self,
        target: &Self::Target,
        image: &FilteredImage,
        transform: &Transform,
    ) -> RenderResult<()>;

    /// Submit the rendered target for display
    fn present(&mut self, target: &Self::Target) -> RenderResult<()>;

    /// Whether all work submitted for `target` has completed
    fn is_idle(&self, target: &Self::Target) -> bool;

    /// Give the backend a chance to process completions
    fn maintain(&mut self) {}

    /// Tightly packed RGBA contents of a presented target
    fn read_back(&mut self, _target: &Self::Target) -> Option<Vec<u8>> {
        None
    }
}

/// Notification sent to the view host after each present
#[derive(Debug, Clone)]
pub struct PresentedFrame {
    pub sequence: u64,
    pub drawable: usize,
    pub width: u32,
    pub height: u32,
    /// Read-back pixels, only when the host asked for them
    pub pixels: Option<Vec<u8>>,
    /// Capture to present latency
    pub latency: Duration,
}

/// View host receiving presentation notifications
pub trait SurfaceHost: Send {
    /// The surface needs redisplay
    fn on_presented(&mut self, frame: PresentedFrame);

    fn wants_pixels(&self) -> bool {
        false
    }
}

/// Creates one host per presentation surface
pub type HostFactory = Arc<dyn Fn() -> Box<dyn SurfaceHost> + Send + Sync>;

/// Object-safe view of a [`PresentationSurface`]
pub trait FramePresenter {
    fn present(&mut self, frame: &PreparedFrame) -> Result<(), DropReason>;

    fn maintain(&mut self);
}

/// Parameters for building a surface on the presentation thread
#[derive(Debug, Clone, Copy)]
pub struct SurfaceRequest {
    pub drawable_count: usize,
}

/// Builds the presentation surface on the presentation thread
pub type SurfaceFactory =
    Arc<dyn Fn(SurfaceRequest) -> PipelineResult<Box<dyn FramePresenter>> + Send + Sync>;

/// Drawable pool plus render backend, confined to one thread
pub struct PresentationSurface<B: RenderBackend> {
    backend: B,
    pool: DrawablePool<B::Target>,
    drawable_count: usize,
    size: (u32, u32),
    host: Box<dyn SurfaceHost>,
    _not_send: PhantomData<*const ()>,
}

fn pixel_size(size: Size) -> Option<(u32, u32)> {
    if size.is_empty() {
        return None;
    }
    let width = size.width.round() as u32;
    let height = size.height.round() as u32;
    (width > 0 && height > 0).then_some((width, height))
}

impl<B: RenderBackend> PresentationSurface<B> {
    pub fn new(backend: B, drawable_count: usize, host: Box<dyn SurfaceHost>) -> Self {
        Self {
            backend,
            pool: DrawablePool::new(Vec::new()),
            drawable_count: drawable_count.max(1),
            size: (0, 0),
            host,
            _not_send: PhantomData,
        }
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let targets = (0..self.drawable_count)
            .map(|slot| self.backend.create_target(width, height, slot))
            .collect::<RenderResult<Vec<_>>>()?;
        self.pool.rebuild(targets);
        self.size = (width, height);
        debug!(width, height, drawables = self.drawable_count, "Drawable pool rebuilt");
        Ok(())
    }

    /// Render one prepared frame into the next free drawable and present it
    pub fn present_frame(&mut self, frame: &PreparedFrame) -> Result<usize, DropReason> {
        if frame.image.extent.is_degenerate() {
            return Err(DropReason::DegenerateExtent);
        }
        let (width, height) = pixel_size(frame.target).ok_or(DropReason::DegenerateExtent)?;

        self.maintain();
        if self.size != (width, height) {
            self.resize(width, height).map_err(|e| {
                warn!(error = %e, width, height, "Failed to allocate drawables");
                DropReason::RenderFailed
            })?;
        }

        let drawable = self.pool.acquire().ok_or(DropReason::NoDrawable)?;

        let result = {
            let target = self.pool.target(&drawable);
            self.backend
                .render(target, &frame.image, &frame.transform)
                .and_then(|_| self.backend.present(target))
        };
        if let Err(e) = result {
            debug!(error = %e, sequence = frame.image.sequence, "Render failed");
            self.pool.release(drawable);
            return Err(DropReason::RenderFailed);
        }

        let pixels = if self.host.wants_pixels() {
            self.backend.read_back(self.pool.target(&drawable))
        } else {
            None
        };
        let slot = drawable.slot();
        self.pool.present(drawable);

        self.host.on_presented(PresentedFrame {
            sequence: frame.image.sequence,
            drawable: slot,
            width,
            height,
            pixels,
            latency: frame.image.captured_at.elapsed(),
        });
        Ok(slot)
    }
}

impl<B: RenderBackend> FramePresenter for PresentationSurface<B> {
    fn present(&mut self, frame: &PreparedFrame) -> Result<(), DropReason> {
        self.present_frame(frame).map(|_| ())
    }

    fn maintain(&mut self) {
        self.backend.maintain();
        let backend = &self.backend;
        self.pool.reclaim(|target| backend.is_idle(target));
    }
}

struct PresentLoop {
    presenter: Box<dyn FramePresenter>,
    clock: VsyncClock,
}

/// Handle to the running presentation thread
pub struct PresentationContext {
    thread: CaptureLoopController,
    mailbox: Arc<FrameMailbox<PreparedFrame>>,
}

impl PresentationContext {
    /// Spawn the presentation thread and build its surface there
    ///
    /// Blocks until the surface exists; a factory failure is returned as
    /// the error and the thread exits.
    pub fn spawn(
        factory: SurfaceFactory,
        request: SurfaceRequest,
        mailbox: Arc<FrameMailbox<PreparedFrame>>,
        stats: Arc<PipelineStats>,
        rendering: Arc<AtomicBool>,
        refresh_hz: u32,
    ) -> PipelineResult<Self> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<PipelineResult<()>>(1);
        let loop_mailbox = Arc::clone(&mailbox);

        let init = move || match factory(request) {
            Ok(presenter) => {
                let _ = ready_tx.send(Ok(()));
                Ok(PresentLoop {
                    presenter,
                    clock: VsyncClock::new(refresh_hz),
                })
            }
            Err(e) => {
                let message = e.to_string();
                let _ = ready_tx.send(Err(e));
                Err(message)
            }
        };

        let mut thread = CaptureLoopController::start_with_init(
            presentation::THREAD_NAME,
            init,
            move |state: &mut PresentLoop| {
                present_step(state, &loop_mailbox, &stats, &rendering);
                LoopAction::Continue
            },
        )
        .map_err(|e| PipelineError::GpuContextUnavailable(format!("Failed to spawn presentation thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(refresh_hz, "Presentation thread ready");
                Ok(Self { thread, mailbox })
            }
            Ok(Err(e)) => {
                thread.join();
                Err(e)
            }
            Err(_) => {
                thread.join();
                Err(PipelineError::GpuContextUnavailable(
                    "Presentation thread exited during initialization".to_string(),
                ))
            }
        }
    }

    /// Stop the presentation thread and wait for it
    pub fn shutdown(mut self) {
        self.stop_thread();
    }

    fn stop_thread(&mut self) {
        self.thread.request_stop();
        self.mailbox.ring();
        self.thread.join();
    }
}

impl Drop for PresentationContext {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

fn present_step(
    state: &mut PresentLoop,
    mailbox: &FrameMailbox<PreparedFrame>,
    stats: &PipelineStats,
    rendering: &AtomicBool,
) {
    if !mailbox.wait(timing::PRESENT_IDLE_WAKE) {
        state.presenter.maintain();
        return;
    }
    if !rendering.load(Ordering::Acquire) {
        // Stale frame from before a stop
        let _ = mailbox.take();
        return;
    }

    state.clock.wait_for_next_tick();
    let Some(frame) = mailbox.take() else {
        return;
    };

    match state.presenter.present(&frame) {
        Ok(()) => {
            let presented = stats.record_presented();
            if presented % timing::FRAME_LOG_INTERVAL == 0 {
                debug!(
                    presented,
                    sequence = frame.image.sequence,
                    latency_ms = frame.image.captured_at.elapsed().as_millis() as u64,
                    "Presentation progress"
                );
            }
        }
        Err(reason) => {
            let count = stats.record_drop(reason);
            if count % timing::FRAME_LOG_INTERVAL == 1 {
                debug!(%reason, count, sequence = frame.image.sequence, "Frame dropped at presentation");
            } else {
                trace!(%reason, sequence = frame.image.sequence, "Frame dropped at presentation");
            }
        }
    }
}
