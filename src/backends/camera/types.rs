// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for camera frame sources

use gstreamer::buffer::{MappedBuffer, Readable};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::Arc;
use std::time::Instant;

/// Frame data storage - either pre-copied bytes or zero-copy GStreamer buffer
///
/// The `Mapped` variant keeps the GStreamer buffer mapped and alive until all
/// references are dropped, so frames coming out of an appsink are never copied
/// before the filter stage reads them.
#[derive(Clone)]
pub enum FrameData {
    /// Pre-copied bytes (test pattern, tests)
    Copied(Arc<[u8]>),
    /// Zero-copy mapped GStreamer buffer
    Mapped(Arc<MappedBuffer<Readable>>),
}

impl FrameData {
    /// Create FrameData from a mapped GStreamer buffer (zero-copy)
    pub fn from_mapped_buffer(buffer: MappedBuffer<Readable>) -> Self {
        FrameData::Mapped(Arc::new(buffer))
    }

    /// Get the length of the frame data in bytes
    pub fn len(&self) -> usize {
        match self {
            FrameData::Copied(data) => data.len(),
            FrameData::Mapped(buf) => buf.len(),
        }
    }

    /// Check if the frame data is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(data: Vec<u8>) -> Self {
        FrameData::Copied(data.into())
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Copied(data) => write!(f, "FrameData::Copied({} bytes)", data.len()),
            FrameData::Mapped(buf) => write!(f, "FrameData::Mapped({} bytes)", buf.len()),
        }
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FrameData::Copied(data) => data.as_ref(),
            FrameData::Mapped(buf) => buf.as_slice(),
        }
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_ref()
    }
}

/// Physical orientation of the device relative to the landscape-native sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    /// Sensor-native orientation
    #[default]
    LandscapeRight,
}

impl Orientation {
    pub const ALL: [Orientation; 4] = [
        Orientation::Portrait,
        Orientation::PortraitUpsideDown,
        Orientation::LandscapeLeft,
        Orientation::LandscapeRight,
    ];

    /// Rotation (radians, image space with y pointing down) that brings the
    /// sensor image upright for this orientation
    pub fn rotation_radians(&self) -> f64 {
        match self {
            Orientation::Portrait => -FRAC_PI_2,
            Orientation::PortraitUpsideDown => FRAC_PI_2,
            Orientation::LandscapeRight => 0.0,
            Orientation::LandscapeLeft => PI,
        }
    }

    /// Whether a mirrored (front) sensor is inverted relative to up in this
    /// orientation, so mirror correction also needs a half turn
    pub fn mirrored_sensor_inverted(&self) -> bool {
        matches!(self, Orientation::LandscapeLeft | Orientation::LandscapeRight)
    }

    /// Check if the rotation swaps width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Orientation::Portrait | Orientation::PortraitUpsideDown)
    }

    /// Parse a sensor rotation in degrees (clockwise) into an orientation
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Orientation::PortraitUpsideDown,
            180 => Orientation::LandscapeLeft,
            270 => Orientation::Portrait,
            _ => Orientation::LandscapeRight,
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Orientation::Portrait => "portrait",
            Orientation::PortraitUpsideDown => "portrait-upside-down",
            Orientation::LandscapeLeft => "landscape-left",
            Orientation::LandscapeRight => "landscape-right",
        };
        f.write_str(name)
    }
}

/// Framerate as a fraction (numerator/denominator)
/// Stores exact framerate to handle NTSC rates like 59.94fps (60000/1001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    /// Create a new framerate from numerator and denominator
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    /// Create a framerate from an integer (e.g., 30 becomes 30/1)
    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    /// Get the framerate as a floating point value
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    /// Format as GStreamer fraction string (e.g., "60000/1001")
    pub fn as_gst_fraction(&self) -> String {
        format!("{}/{}", self.num, self.denom)
    }

    /// Duration of one frame, `None` for a zero rate
    pub fn frame_interval(&self) -> Option<std::time::Duration> {
        (self.num > 0).then(|| std::time::Duration::from_secs_f64(self.denom as f64 / self.num as f64))
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fps = self.as_f64();
        // Show decimal for non-integer framerates (NTSC)
        if self.denom != 1 {
            write!(f, "{:.2}", fps)
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 30, denom: 1 }
    }
}

/// Pixel format of raw camera frames
///
/// Every format except the Bayer patterns is converted to RGBA on the CPU
/// before filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha, the canonical format after conversion
    #[default]
    RGBA,
    /// BGRA - 32-bit with alpha (B G R A byte order)
    BGRA,
    /// RGB24 - 3 bytes per pixel, no alpha
    RGB24,
    /// Gray8 - 8-bit single channel (IR and monochrome sensors)
    Gray8,
    /// YUYV - Packed 4:2:2 (Y0 U Y1 V interleaved)
    YUYV,
    /// UYVY - Packed 4:2:2 (U Y0 V Y1 interleaved)
    UYVY,
    /// NV12 - Semi-planar 4:2:0 (Y plane + interleaved UV plane)
    NV12,
    /// I420 - Planar 4:2:0 (separate Y, U, V planes)
    I420,
    /// RGGB Bayer pattern - raw sensor data, not convertible here
    BayerRGGB,
}

impl PixelFormat {
    /// Check if this format is a YUV format
    pub fn is_yuv(&self) -> bool {
        matches!(self, Self::NV12 | Self::I420 | Self::YUYV | Self::UYVY)
    }

    /// Check if this format is a raw Bayer pattern requiring debayering
    pub fn is_bayer(&self) -> bool {
        matches!(self, Self::BayerRGGB)
    }

    /// Average bytes per pixel (accounting for chroma subsampling)
    pub fn bytes_per_pixel(&self) -> f32 {
        match self {
            Self::RGBA | Self::BGRA => 4.0,
            Self::NV12 | Self::I420 => 1.5,
            Self::YUYV | Self::UYVY => 2.0,
            Self::Gray8 | Self::BayerRGGB => 1.0,
            Self::RGB24 => 3.0,
        }
    }

    /// Minimum stride in bytes of the first plane for a given width
    pub fn min_stride(&self, width: u32) -> u32 {
        match self {
            Self::RGBA | Self::BGRA => width * 4,
            Self::RGB24 => width * 3,
            Self::YUYV | Self::UYVY => width.div_ceil(2) * 4,
            Self::Gray8 | Self::NV12 | Self::I420 | Self::BayerRGGB => width,
        }
    }

    /// Convert to a GStreamer video/x-raw format string
    pub fn to_gst_format_string(&self) -> &'static str {
        match self {
            Self::RGBA => "RGBA",
            Self::BGRA => "BGRA",
            Self::NV12 => "NV12",
            Self::I420 => "I420",
            Self::YUYV => "YUY2",
            Self::UYVY => "UYVY",
            Self::Gray8 => "GRAY8",
            Self::RGB24 => "RGB",
            // video/x-bayer, never valid in raw caps
            Self::BayerRGGB => "rggb",
        }
    }

    /// Parse format from GStreamer format string
    pub fn from_gst_format(format: &str) -> Option<Self> {
        match format {
            "RGBA" | "RGBx" => Some(Self::RGBA),
            "BGRA" | "BGRx" => Some(Self::BGRA),
            "NV12" => Some(Self::NV12),
            "I420" => Some(Self::I420),
            "YUYV" | "YUY2" => Some(Self::YUYV),
            "UYVY" => Some(Self::UYVY),
            "GRAY8" | "GREY" | "Y8" => Some(Self::Gray8),
            "RGB" => Some(Self::RGB24),
            "rggb" | "RGGB" => Some(Self::BayerRGGB),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_gst_format_string())
    }
}

/// Capture size, frame rate and pixel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraFormat {
    pub width: u32,
    pub height: u32,
    pub framerate: Framerate,
    pub pixel_format: PixelFormat,
}

impl std::fmt::Display for CameraFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} @ {}fps ({})",
            self.width, self.height, self.framerate, self.pixel_format
        )
    }
}

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Synthetic moving color bars
    #[default]
    TestPattern,
    /// V4L2 capture node (e.g. /dev/video0) via `v4l2src`
    V4l2 { path: String },
    /// PipeWire camera node via `pipewiresrc`, default node when `None`
    PipeWire { node: Option<String> },
}

/// A camera device chosen by the caller, with presentation metadata
#[derive(Debug, Clone)]
pub struct CameraDevice {
    pub name: String,
    pub kind: SourceKind,
    /// Requested capture format
    pub format: CameraFormat,
    /// Front-facing sensor whose image must be mirrored for a selfie view
    pub mirrored: bool,
    pub orientation: Orientation,
}

/// Plane layout of semi-planar/planar YUV frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YuvPlanes {
    /// UV plane offset in bytes (NV12: interleaved UV, I420: U plane)
    pub uv_offset: usize,
    /// UV plane stride in bytes
    pub uv_stride: u32,
    /// V plane offset in bytes (I420 only)
    pub v_offset: usize,
    /// V plane stride in bytes (I420 only)
    pub v_stride: u32,
}

impl YuvPlanes {
    /// Tightly packed layout following the luma plane
    pub fn packed(format: PixelFormat, stride: u32, height: u32) -> Option<Self> {
        let y_size = stride as usize * height as usize;
        match format {
            PixelFormat::NV12 => Some(Self {
                uv_offset: y_size,
                uv_stride: stride,
                v_offset: 0,
                v_stride: 0,
            }),
            PixelFormat::I420 => {
                let chroma_stride = stride.div_ceil(2);
                let chroma_size = chroma_stride as usize * height.div_ceil(2) as usize;
                Some(Self {
                    uv_offset: y_size,
                    uv_stride: chroma_stride,
                    v_offset: y_size + chroma_size,
                    v_stride: chroma_stride,
                })
            }
            _ => None,
        }
    }
}

/// A single raw frame from a frame source
///
/// Immutable once delivered. For YUV formats `data` holds every plane
/// contiguously and `yuv_planes` locates the chroma planes.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: FrameData,
    pub format: PixelFormat,
    /// Row stride of the first plane (bytes per row, may include padding)
    pub stride: u32,
    pub yuv_planes: Option<YuvPlanes>,
    /// Monotonic capture time
    pub captured_at: Instant,
    /// Sensor or pipeline timestamp in nanoseconds, when the source has one
    pub sensor_timestamp_ns: Option<u64>,
    /// Monotonically increasing per source
    pub sequence: u64,
}

impl RawFrame {
    /// Build a tightly packed frame from owned bytes
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>, sequence: u64) -> Self {
        let stride = format.min_stride(width);
        Self {
            width,
            height,
            data: data.into(),
            format,
            stride,
            yuv_planes: YuvPlanes::packed(format, stride, height),
            captured_at: Instant::now(),
            sensor_timestamp_ns: None,
            sequence,
        }
    }

    /// Get the frame data as a byte slice
    pub fn data_slice(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gst_format_names_round_trip() {
        for format in [
            PixelFormat::RGBA,
            PixelFormat::BGRA,
            PixelFormat::RGB24,
            PixelFormat::Gray8,
            PixelFormat::YUYV,
            PixelFormat::UYVY,
            PixelFormat::NV12,
            PixelFormat::I420,
        ] {
            assert_eq!(
                PixelFormat::from_gst_format(format.to_gst_format_string()),
                Some(format)
            );
        }
        assert_eq!(PixelFormat::from_gst_format("MJPG"), None);
    }

    #[test]
    fn test_orientation_from_degrees() {
        assert_eq!(Orientation::from_degrees(0), Orientation::LandscapeRight);
        assert_eq!(Orientation::from_degrees(-90), Orientation::Portrait);
        assert_eq!(Orientation::from_degrees(450), Orientation::PortraitUpsideDown);
        assert!(Orientation::Portrait.swaps_dimensions());
        assert!(!Orientation::LandscapeLeft.swaps_dimensions());
    }

    #[test]
    fn test_i420_packed_planes() {
        let planes = YuvPlanes::packed(PixelFormat::I420, 4, 2).unwrap();
        assert_eq!(planes.uv_offset, 8);
        assert_eq!(planes.uv_stride, 2);
        assert_eq!(planes.v_offset, 10);
    }

    #[test]
    fn test_framerate_interval() {
        let fps = Framerate::from_int(50);
        assert_eq!(fps.frame_interval(), Some(std::time::Duration::from_millis(20)));
        assert_eq!(Framerate::from_int(0).frame_interval(), None);
    }
}
