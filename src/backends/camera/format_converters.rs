// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion utilities
//!
//! Every raw frame is brought to tightly packed RGBA before filtering.
//! YUV conversions use full-range BT.601 coefficients. The reverse
//! converters are used by the test pattern source to emit non-RGBA formats.

use super::types::{PixelFormat, RawFrame, YuvPlanes};

/// Convert YUV (BT.601) to RGB
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = (y + 1.402 * v).round().clamp(0.0, 255.0) as u8;
    let g = (y - 0.344136 * u - 0.714136 * v).round().clamp(0.0, 255.0) as u8;
    let b = (y + 1.772 * u).round().clamp(0.0, 255.0) as u8;

    (r, g, b)
}

/// Convert RGB to YUV (BT.601)
#[inline]
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = (b - y) / 1.772 + 128.0;
    let v = (r - y) / 1.402 + 128.0;
    (
        y.round().clamp(0.0, 255.0) as u8,
        u.round().clamp(0.0, 255.0) as u8,
        v.round().clamp(0.0, 255.0) as u8,
    )
}

/// BT.601 luma of an RGB triple
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Convert a raw frame of any supported format to packed RGBA
///
/// Returns `None` for Bayer input and for buffers shorter than the layout
/// the frame header describes.
pub fn to_rgba(frame: &RawFrame) -> Option<Vec<u8>> {
    let data = frame.data_slice();
    let (width, height, stride) = (frame.width, frame.height, frame.stride);
    if stride < frame.format.min_stride(width) {
        return None;
    }

    match frame.format {
        PixelFormat::RGBA => packed_to_rgba(data, width, height, stride, 4, |px| {
            [px[0], px[1], px[2], px[3]]
        }),
        PixelFormat::BGRA => packed_to_rgba(data, width, height, stride, 4, |px| {
            [px[2], px[1], px[0], px[3]]
        }),
        PixelFormat::RGB24 => packed_to_rgba(data, width, height, stride, 3, |px| {
            [px[0], px[1], px[2], 255]
        }),
        PixelFormat::Gray8 => packed_to_rgba(data, width, height, stride, 1, |px| {
            [px[0], px[0], px[0], 255]
        }),
        PixelFormat::YUYV => packed_422_to_rgba(data, width, height, stride, [0, 2, 1, 3]),
        PixelFormat::UYVY => packed_422_to_rgba(data, width, height, stride, [1, 3, 0, 2]),
        PixelFormat::NV12 => {
            let planes = frame
                .yuv_planes
                .or_else(|| YuvPlanes::packed(PixelFormat::NV12, stride, height))?;
            nv12_to_rgba(data, width, height, stride, &planes)
        }
        PixelFormat::I420 => {
            let planes = frame
                .yuv_planes
                .or_else(|| YuvPlanes::packed(PixelFormat::I420, stride, height))?;
            i420_to_rgba(data, width, height, stride, &planes)
        }
        PixelFormat::BayerRGGB => None,
    }
}

fn required_len(stride: u32, rows: u32, row_bytes: u32) -> usize {
    if rows == 0 {
        return 0;
    }
    stride as usize * (rows as usize - 1) + row_bytes as usize
}

fn packed_to_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    bpp: usize,
    convert: impl Fn(&[u8]) -> [u8; 4],
) -> Option<Vec<u8>> {
    if data.len() < required_len(stride, height, width * bpp as u32) {
        return None;
    }
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for row in 0..height as usize {
        let start = row * stride as usize;
        let line = &data[start..start + width as usize * bpp];
        for px in line.chunks_exact(bpp) {
            rgba.extend_from_slice(&convert(px));
        }
    }
    Some(rgba)
}

/// Packed 4:2:2 where `order` gives the byte offsets of (Y0, Y1, U, V)
/// inside each 4-byte macropixel
fn packed_422_to_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    order: [usize; 4],
) -> Option<Vec<u8>> {
    let row_bytes = width.div_ceil(2) * 4;
    if data.len() < required_len(stride, height, row_bytes) {
        return None;
    }
    let [y0_at, y1_at, u_at, v_at] = order;
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for row in 0..height as usize {
        let start = row * stride as usize;
        let line = &data[start..start + row_bytes as usize];
        for (pair, chunk) in line.chunks_exact(4).enumerate() {
            let (u, v) = (chunk[u_at], chunk[v_at]);
            let (r, g, b) = yuv_to_rgb(chunk[y0_at], u, v);
            rgba.extend_from_slice(&[r, g, b, 255]);
            // Odd widths leave the last macropixel half used
            if pair * 2 + 1 < width as usize {
                let (r, g, b) = yuv_to_rgb(chunk[y1_at], u, v);
                rgba.extend_from_slice(&[r, g, b, 255]);
            }
        }
    }
    Some(rgba)
}

fn nv12_to_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    planes: &YuvPlanes,
) -> Option<Vec<u8>> {
    let chroma_rows = height.div_ceil(2);
    if data.len() < required_len(stride, height, width)
        || data.len() < planes.uv_offset + required_len(planes.uv_stride, chroma_rows, width.div_ceil(2) * 2)
    {
        return None;
    }
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height as usize {
        let luma_row = y * stride as usize;
        let chroma_row = planes.uv_offset + (y / 2) * planes.uv_stride as usize;
        for x in 0..width as usize {
            let uv = chroma_row + (x & !1);
            let (r, g, b) = yuv_to_rgb(data[luma_row + x], data[uv], data[uv + 1]);
            rgba.extend_from_slice(&[r, g, b, 255]);
        }
    }
    Some(rgba)
}

fn i420_to_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    planes: &YuvPlanes,
) -> Option<Vec<u8>> {
    let (chroma_w, chroma_rows) = (width.div_ceil(2), height.div_ceil(2));
    if data.len() < required_len(stride, height, width)
        || data.len() < planes.uv_offset + required_len(planes.uv_stride, chroma_rows, chroma_w)
        || data.len() < planes.v_offset + required_len(planes.v_stride, chroma_rows, chroma_w)
    {
        return None;
    }
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height as usize {
        let luma_row = y * stride as usize;
        let u_row = planes.uv_offset + (y / 2) * planes.uv_stride as usize;
        let v_row = planes.v_offset + (y / 2) * planes.v_stride as usize;
        for x in 0..width as usize {
            let (r, g, b) = yuv_to_rgb(data[luma_row + x], data[u_row + x / 2], data[v_row + x / 2]);
            rgba.extend_from_slice(&[r, g, b, 255]);
        }
    }
    Some(rgba)
}

/// Encode packed RGBA into another pixel format (tightly packed)
///
/// Chroma is taken from the top-left pixel of each subsampled block.
pub fn rgba_to_format(rgba: &[u8], width: u32, height: u32, format: PixelFormat) -> Option<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    if rgba.len() < w * h * 4 {
        return None;
    }
    let px = |x: usize, y: usize| {
        let i = (y * w + x) * 4;
        (rgba[i], rgba[i + 1], rgba[i + 2])
    };

    let out = match format {
        PixelFormat::RGBA => rgba[..w * h * 4].to_vec(),
        PixelFormat::BGRA => rgba[..w * h * 4]
            .chunks_exact(4)
            .flat_map(|p| [p[2], p[1], p[0], p[3]])
            .collect(),
        PixelFormat::RGB24 => rgba[..w * h * 4]
            .chunks_exact(4)
            .flat_map(|p| [p[0], p[1], p[2]])
            .collect(),
        PixelFormat::Gray8 => rgba[..w * h * 4]
            .chunks_exact(4)
            .map(|p| luma(p[0], p[1], p[2]))
            .collect(),
        PixelFormat::YUYV | PixelFormat::UYVY => {
            let mut out = Vec::with_capacity(w.div_ceil(2) * 4 * h);
            for y in 0..h {
                for x in (0..w).step_by(2) {
                    let (y0, u, v) = {
                        let (r, g, b) = px(x, y);
                        rgb_to_yuv(r, g, b)
                    };
                    let y1 = if x + 1 < w {
                        let (r, g, b) = px(x + 1, y);
                        rgb_to_yuv(r, g, b).0
                    } else {
                        y0
                    };
                    if format == PixelFormat::YUYV {
                        out.extend_from_slice(&[y0, u, y1, v]);
                    } else {
                        out.extend_from_slice(&[u, y0, v, y1]);
                    }
                }
            }
            out
        }
        PixelFormat::NV12 | PixelFormat::I420 => {
            // 4:2:0 layouts here assume even dimensions
            if w % 2 == 1 || h % 2 == 1 {
                return None;
            }
            let (cw, ch) = (w / 2, h / 2);
            let mut out = Vec::with_capacity(w * h * 3 / 2);
            for y in 0..h {
                for x in 0..w {
                    let (r, g, b) = px(x, y);
                    out.push(rgb_to_yuv(r, g, b).0);
                }
            }
            let chroma: Vec<(u8, u8)> = (0..ch)
                .flat_map(|cy| (0..cw).map(move |cx| (cx * 2, cy * 2)))
                .map(|(x, y)| {
                    let (r, g, b) = px(x, y);
                    let (_, u, v) = rgb_to_yuv(r, g, b);
                    (u, v)
                })
                .collect();
            if format == PixelFormat::NV12 {
                out.extend(chroma.iter().flat_map(|&(u, v)| [u, v]));
            } else {
                out.extend(chroma.iter().map(|&(u, _)| u));
                out.extend(chroma.iter().map(|&(_, v)| v));
            }
            out
        }
        PixelFormat::BayerRGGB => return None,
    };
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> RawFrame {
        RawFrame::packed(width, height, format, data, 0)
    }

    #[test]
    fn test_bt601_gray_point() {
        assert_eq!(yuv_to_rgb(128, 128, 128), (128, 128, 128));
        assert_eq!(yuv_to_rgb(255, 128, 128), (255, 255, 255));
        assert_eq!(yuv_to_rgb(0, 128, 128), (0, 0, 0));
    }

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        let rgba = to_rgba(&frame(2, 1, PixelFormat::YUYV, vec![50, 128, 200, 128])).unwrap();
        assert_eq!(rgba, vec![50, 50, 50, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn test_uyvy_byte_order() {
        let rgba = to_rgba(&frame(2, 1, PixelFormat::UYVY, vec![128, 10, 128, 20])).unwrap();
        assert_eq!(&rgba[0..3], &[10, 10, 10]);
        assert_eq!(&rgba[4..7], &[20, 20, 20]);
    }

    #[test]
    fn test_bgra_swizzle() {
        let rgba = to_rgba(&frame(1, 1, PixelFormat::BGRA, vec![1, 2, 3, 4])).unwrap();
        assert_eq!(rgba, vec![3, 2, 1, 4]);
    }

    #[test]
    fn test_padded_stride_is_skipped() {
        let mut f = frame(1, 2, PixelFormat::Gray8, vec![7, 0xEE, 9]);
        f.stride = 2;
        assert_eq!(to_rgba(&f).unwrap(), vec![7, 7, 7, 255, 9, 9, 9, 255]);
    }

    #[test]
    fn test_nv12_gray_frame() {
        // 2x2 luma + one UV pair
        let rgba = to_rgba(&frame(2, 2, PixelFormat::NV12, vec![128, 128, 128, 128, 128, 128])).unwrap();
        assert!(rgba.chunks_exact(4).all(|p| p == [128, 128, 128, 255]));
    }

    #[test]
    fn test_i420_planes() {
        let rgba = to_rgba(&frame(2, 2, PixelFormat::I420, vec![0, 255, 0, 255, 128, 128])).unwrap();
        assert_eq!(&rgba[0..4], &[0, 0, 0, 255]);
        assert_eq!(&rgba[4..8], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_truncated_buffer_rejected() {
        assert!(to_rgba(&frame(4, 4, PixelFormat::RGBA, vec![0; 10])).is_none());
        assert!(to_rgba(&frame(2, 2, PixelFormat::NV12, vec![0; 4])).is_none());
    }

    #[test]
    fn test_bayer_not_convertible() {
        assert!(to_rgba(&frame(2, 2, PixelFormat::BayerRGGB, vec![0; 4])).is_none());
    }

    #[test]
    fn test_encoded_test_pattern_decodes_close() {
        let rgba: Vec<u8> = [200u8, 40, 90, 255].repeat(16);
        for format in [PixelFormat::YUYV, PixelFormat::NV12, PixelFormat::I420] {
            let encoded = rgba_to_format(&rgba, 4, 4, format).unwrap();
            let decoded = to_rgba(&frame(4, 4, format, encoded)).unwrap();
            for (a, b) in decoded.iter().zip(&rgba) {
                assert!((*a as i32 - *b as i32).abs() <= 3, "{:?}: {} vs {}", format, a, b);
            }
        }
    }
}
