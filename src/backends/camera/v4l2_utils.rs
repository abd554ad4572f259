// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 device validation
//!
//! Device selection happens outside the pipeline; these helpers only check
//! that a chosen node exists and can capture video before GStreamer opens it.

use tracing::debug;
use v4l::capability::Flags;
use v4l::prelude::*;

/// Device information from V4L2 capability
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    /// Name of the device (V4L2 card)
    pub card: String,
    /// Driver name (V4L2 driver)
    pub driver: String,
    /// Device path (e.g., /dev/video0)
    pub path: String,
    /// Real device path (resolved symlinks)
    pub real_path: String,
}

/// Open `path` and confirm it is a video capture node
pub fn probe_capture_device(path: &str) -> Result<DeviceInfo, String> {
    let dev = Device::with_path(path).map_err(|e| format!("Failed to open {}: {}", path, e))?;
    let caps = dev
        .query_caps()
        .map_err(|e| format!("VIDIOC_QUERYCAP failed on {}: {}", path, e))?;

    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
        return Err(format!("{} ({}) is not a video capture device", path, caps.card));
    }

    let real_path = std::fs::canonicalize(path)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| path.to_string());

    debug!(path, card = %caps.card, driver = %caps.driver, "V4L2 capture device validated");

    Ok(DeviceInfo {
        card: caps.card,
        driver: caps.driver,
        path: path.to_string(),
        real_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device_is_rejected() {
        let err = probe_capture_device("/dev/fxcam-does-not-exist").unwrap_err();
        assert!(err.contains("/dev/fxcam-does-not-exist"));
    }
}
