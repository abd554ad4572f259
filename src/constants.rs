// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// GStreamer capture pipeline constants
pub mod pipeline {
    /// Appsink queue depth: latest frame only
    pub const MAX_BUFFERS: u32 = 1;

    /// Get number of threads for videoconvert based on available CPU threads
    pub fn videoconvert_threads() -> u32 {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(4)
    }

    /// Output pixel format for appsink
    /// RGBA uses 4 bytes/pixel and skips the CPU conversion entirely
    pub const OUTPUT_FORMAT: &str = "RGBA";

    /// Name given to the appsink element inside the launch description
    pub const APPSINK_NAME: &str = "fxcam-sink";
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Default display refresh rate used for vsync pacing
    pub const DEFAULT_REFRESH_HZ: u32 = 60;

    /// Default capture frame rate for the test pattern source
    pub const DEFAULT_FRAMERATE: u32 = 30;

    /// How long the presentation thread sleeps on the doorbell before
    /// re-checking its shutdown flag
    pub const PRESENT_IDLE_WAKE: Duration = Duration::from_millis(100);

    /// Poll interval of a paused test pattern loop
    pub const PAUSED_POLL_INTERVAL: Duration = Duration::from_millis(10);
}

/// Geometry correction constants
pub mod geometry {
    /// Screen density at which the finer scale quantum applies
    pub const HIGH_DENSITY_THRESHOLD: f64 = 2.0;

    /// Scale quantum below the density threshold
    pub const COARSE_SCALE_QUANTUM: f64 = 1.0 / 500.0;

    /// Scale quantum at or above the density threshold
    pub const FINE_SCALE_QUANTUM: f64 = 1.0 / 1000.0;

    /// Tolerance for coverage and equality checks in image space units
    pub const EPSILON: f64 = 1e-6;
}

/// Presentation surface constants
pub mod presentation {
    /// Default drawable pool size (triple buffering)
    pub const DEFAULT_DRAWABLE_COUNT: usize = 3;

    /// Name of the thread that owns the drawables
    pub const THREAD_NAME: &str = "fxcam-present";

    /// wgpu requires read-back rows aligned to this many bytes
    pub const COPY_ROW_ALIGNMENT: u32 = 256;
}

/// Defaults for the comic filter
pub mod comic {
    /// Gradient magnitude (0..1 luma units) above which a pixel is inked
    pub const DEFAULT_EDGE_THRESHOLD: f32 = 0.25;

    /// Number of color levels per channel after posterizing
    pub const DEFAULT_POSTERIZE_LEVELS: u32 = 5;
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fine_quantum_is_finer() {
        assert!(geometry::FINE_SCALE_QUANTUM < geometry::COARSE_SCALE_QUANTUM);
    }

    #[test]
    fn test_videoconvert_threads_nonzero() {
        assert!(pipeline::videoconvert_threads() > 0);
    }
}
