// SPDX-License-Identifier: GPL-3.0-only

//! Built-in view hosts
//!
//! [`NullHost`] ignores notifications, for headless runs. [`SnapshotHost`]
//! keeps the read-back pixels of the latest presented drawable so they can
//! be written out as a PNG.

use image::RgbaImage;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use super::{HostFactory, PresentedFrame, SurfaceHost};

#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl SurfaceHost for NullHost {
    fn on_presented(&mut self, _frame: PresentedFrame) {}
}

impl NullHost {
    pub fn factory() -> HostFactory {
        Arc::new(|| Box::new(NullHost))
    }
}

/// Host that retains the most recent presented frame
///
/// Clones share the same slot, so one clone can be handed to the
/// presentation thread and another kept for reading.
#[derive(Debug, Default, Clone)]
pub struct SnapshotHost {
    latest: Arc<Mutex<Option<PresentedFrame>>>,
}

impl SnapshotHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> HostFactory {
        let host = self.clone();
        Arc::new(move || Box::new(host.clone()))
    }

    pub fn latest(&self) -> Option<PresentedFrame> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Latest presented frame as an image, if pixels were read back
    pub fn latest_image(&self) -> Option<RgbaImage> {
        let frame = self.latest()?;
        RgbaImage::from_raw(frame.width, frame.height, frame.pixels?)
    }

    /// Write the latest presented frame as PNG
    pub fn save_png(&self, path: &Path) -> Result<(), String> {
        let image = self
            .latest_image()
            .ok_or_else(|| "No frame has been presented yet".to_string())?;
        image
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| format!("Failed to save snapshot PNG: {}", e))?;
        info!(path = %path.display(), width = image.width(), height = image.height(), "Snapshot saved");
        Ok(())
    }
}

impl SurfaceHost for SnapshotHost {
    fn on_presented(&mut self, frame: PresentedFrame) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    fn wants_pixels(&self) -> bool {
        true
    }
}
