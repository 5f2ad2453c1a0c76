//! RGB downscaling/upscaling with the routing rules from the spec: an exact
//! byte copy when dimensions match, a cascaded box filter for
//! downscaling, a fixed-point bilinear filter for upscaling, and a fast
//! path for the common exact-2x case. Only 3-channel RGB gets these paths;
//! everything else (and any upscale of a non-RGB buffer) goes through
//! `image`'s general-purpose resampler, matching the teacher's
//! `ResizeAlgorithm`/`imageops` usage in `src/lib.rs` and `src/batch.rs`.

use crate::{ImageToolError, Result};

/// Resize a 3-channel RGB buffer from `(src_w, src_h)` to `(dst_w, dst_h)`.
pub fn resize_rgb(src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Vec<u8> {
    debug_assert_eq!(src.len(), src_w as usize * src_h as usize * 3);

    if src_w == dst_w && src_h == dst_h {
        return src.to_vec();
    }

    if dst_w > src_w || dst_h > src_h {
        return bilinear_upscale(src, src_w, src_h, dst_w, dst_h);
    }

    if src_w == dst_w * 2 && src_h == dst_h * 2 {
        return box_2x(src, src_w, src_h);
    }

    let scale_x = src_w as f64 / dst_w.max(1) as f64;
    let scale_y = src_h as f64 / dst_h.max(1) as f64;
    let max_scale = scale_x.max(scale_y);

    if max_scale >= 2.0 {
        let mut cur = src.to_vec();
        let mut cur_w = src_w;
        let mut cur_h = src_h;
        while cur_w >= dst_w * 2 && cur_h >= dst_h * 2 {
            cur = box_2x(&cur, cur_w, cur_h);
            cur_w /= 2;
            cur_h /= 2;
        }
        return box_filter(&cur, cur_w, cur_h, dst_w, dst_h);
    }

    box_filter(src, src_w, src_h, dst_w, dst_h)
}

/// Exact 2x2 box downscale: each destination pixel is the rounded mean of
/// its four covering source pixels, per channel.
fn box_2x(src: &[u8], src_w: u32, src_h: u32) -> Vec<u8> {
    let dst_w = src_w / 2;
    let dst_h = src_h / 2;
    let mut dst = vec![0u8; dst_w as usize * dst_h as usize * 3];
    let src_stride = src_w as usize * 3;
    let dst_stride = dst_w as usize * 3;

    for y in 0..dst_h as usize {
        let row0 = &src[y * 2 * src_stride..];
        let row1 = &src[(y * 2 + 1) * src_stride..];
        let out_row = &mut dst[y * dst_stride..(y + 1) * dst_stride];
        for x in 0..dst_w as usize {
            for ch in 0..3 {
                let a = row0[x * 6 + ch] as u32;
                let b = row0[x * 6 + 3 + ch] as u32;
                let c = row1[x * 6 + ch] as u32;
                let d = row1[x * 6 + 3 + ch] as u32;
                out_row[x * 3 + ch] = ((a + b + c + d + 2) / 4) as u8;
            }
        }
    }

    dst
}

/// Generic box filter: precompute per-destination-column source ranges,
/// then for each row accumulate the covering rectangle and divide with
/// half-area rounding.
fn box_filter(src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Vec<u8> {
    if dst_w == 0 || dst_h == 0 {
        return Vec::new();
    }

    let col_ranges: Vec<(u32, u32)> = (0..dst_w)
        .map(|dx| {
            let x0 = (dx as u64 * src_w as u64 / dst_w as u64) as u32;
            let x1 = (((dx + 1) as u64 * src_w as u64 + dst_w as u64 - 1) / dst_w as u64) as u32;
            (x0, x1.max(x0 + 1).min(src_w))
        })
        .collect();

    let src_stride = src_w as usize * 3;
    let mut dst = vec![0u8; dst_w as usize * dst_h as usize * 3];

    for dy in 0..dst_h {
        let y0 = (dy as u64 * src_h as u64 / dst_h as u64) as u32;
        let y1 = ((((dy + 1) as u64 * src_h as u64) + dst_h as u64 - 1) / dst_h as u64) as u32;
        let y1 = y1.max(y0 + 1).min(src_h);

        let out_row = &mut dst[dy as usize * dst_w as usize * 3..(dy as usize + 1) * dst_w as usize * 3];

        for (dx, &(x0, x1)) in col_ranges.iter().enumerate() {
            let mut sum = [0u32; 3];
            for sy in y0..y1 {
                let row = &src[sy as usize * src_stride..];
                for sx in x0..x1 {
                    for ch in 0..3 {
                        sum[ch] += row[sx as usize * 3 + ch] as u32;
                    }
                }
            }
            let area = (x1 - x0) as u32 * (y1 - y0) as u32;
            for ch in 0..3 {
                out_row[dx * 3 + ch] = ((sum[ch] + area / 2) / area) as u8;
            }
        }
    }

    dst
}

/// Fixed-point bilinear upscale, 8-bit subpixel fractions, rounded and
/// clamped to `[0, 255]`.
fn bilinear_upscale(src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Vec<u8> {
    if dst_w == 0 || dst_h == 0 {
        return Vec::new();
    }
    if src_w == 1 && src_h == 1 {
        let mut dst = vec![0u8; dst_w as usize * dst_h as usize * 3];
        for px in dst.chunks_exact_mut(3) {
            px.copy_from_slice(&src[0..3]);
        }
        return dst;
    }

    let src_stride = src_w as usize * 3;
    let mut dst = vec![0u8; dst_w as usize * dst_h as usize * 3];

    let x_ratio = ((src_w.saturating_sub(1)) as u64 * 256) / dst_w.max(1) as u64;
    let y_ratio = ((src_h.saturating_sub(1)) as u64 * 256) / dst_h.max(1) as u64;

    for dy in 0..dst_h {
        let y_fixed = dy as u64 * y_ratio;
        let y0 = (y_fixed >> 8) as u32;
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = (y_fixed & 0xFF) as u32;

        let out_row = &mut dst[dy as usize * dst_w as usize * 3..(dy as usize + 1) * dst_w as usize * 3];

        for dx in 0..dst_w {
            let x_fixed = dx as u64 * x_ratio;
            let x0 = (x_fixed >> 8) as u32;
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = (x_fixed & 0xFF) as u32;

            let p00 = &src[y0 as usize * src_stride + x0 as usize * 3..];
            let p10 = &src[y0 as usize * src_stride + x1 as usize * 3..];
            let p01 = &src[y1 as usize * src_stride + x0 as usize * 3..];
            let p11 = &src[y1 as usize * src_stride + x1 as usize * 3..];

            for ch in 0..3 {
                let top = p00[ch] as u32 * (256 - fx) + p10[ch] as u32 * fx;
                let bottom = p01[ch] as u32 * (256 - fx) + p11[ch] as u32 * fx;
                let value = (top * (256 - fy) + bottom * fy + (1 << 15)) >> 16;
                out_row[dx as usize * 3 + ch] = value.min(255) as u8;
            }
        }
    }

    dst
}

/// Resize an arbitrary-channel buffer (1/2/4 channels, or any channel count
/// when upscaling) by delegating to `image`'s general-purpose resampler.
/// Surfaces failure as `ResizeFailed` rather than swallowing it.
pub fn resize_generic(
    src: &[u8],
    src_w: u32,
    src_h: u32,
    channels: u8,
    dst_w: u32,
    dst_h: u32,
    filter: image::imageops::FilterType,
) -> Result<Vec<u8>> {
    use image::{DynamicImage, GenericImageView, ImageBuffer};

    let dyn_img: DynamicImage = match channels {
        1 => ImageBuffer::<image::Luma<u8>, _>::from_raw(src_w, src_h, src.to_vec())
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| ImageToolError::ResizeFailed("buffer size mismatch for luma".into()))?,
        2 => ImageBuffer::<image::LumaA<u8>, _>::from_raw(src_w, src_h, src.to_vec())
            .map(DynamicImage::ImageLumaA8)
            .ok_or_else(|| ImageToolError::ResizeFailed("buffer size mismatch for luma-alpha".into()))?,
        3 => ImageBuffer::<image::Rgb<u8>, _>::from_raw(src_w, src_h, src.to_vec())
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| ImageToolError::ResizeFailed("buffer size mismatch for rgb".into()))?,
        4 => ImageBuffer::<image::Rgba<u8>, _>::from_raw(src_w, src_h, src.to_vec())
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| ImageToolError::ResizeFailed("buffer size mismatch for rgba".into()))?,
        other => return Err(ImageToolError::ResizeFailed(format!("unsupported channel count {other}"))),
    };

    let resized = image::imageops::resize(&dyn_img, dst_w, dst_h, filter);
    if resized.dimensions() != (dst_w, dst_h) {
        return Err(ImageToolError::ResizeFailed("resampler returned wrong dimensions".into()));
    }
    Ok(resized.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(w: u32, h: u32) -> Vec<u8> {
        let mut v = vec![0u8; w as usize * h as usize * 3];
        for y in 0..h {
            for x in 0..w {
                let c = if (x + y) % 2 == 0 { 255 } else { 0 };
                let i = (y as usize * w as usize + x as usize) * 3;
                v[i] = c;
                v[i + 1] = c;
                v[i + 2] = c;
            }
        }
        v
    }

    #[test]
    fn identity_resize_is_bytewise_equal() {
        let img = checkerboard(10, 8);
        let out = resize_rgb(&img, 10, 8, 10, 8);
        assert_eq!(out, img);
    }

    #[test]
    fn box_2x_matches_spec_formula() {
        // 2x2 all-different source -> single averaged pixel.
        let src: Vec<u8> = vec![
            10, 10, 10, 20, 20, 20, //
            30, 30, 30, 40, 40, 40,
        ];
        let out = resize_rgb(&src, 2, 2, 1, 1);
        // (10+20+30+40+2)/4 = 25
        assert_eq!(out, vec![25, 25, 25]);
    }

    #[test]
    fn cascaded_downscale_matches_direct_2x_chain() {
        let img = checkerboard(16, 16);
        let direct = resize_rgb(&img, 16, 16, 4, 4);
        let step1 = box_2x(&img, 16, 16);
        let step2 = box_2x(&step1, 8, 8);
        assert_eq!(direct, step2);
    }

    #[test]
    fn upscale_produces_requested_dimensions() {
        let img = checkerboard(4, 4);
        let out = resize_rgb(&img, 4, 4, 9, 7);
        assert_eq!(out.len(), 9 * 7 * 3);
    }

    #[test]
    fn generic_resize_rejects_bad_buffer() {
        let bad = vec![0u8; 3]; // too short for 4x4 luma
        let err = resize_generic(&bad, 4, 4, 1, 2, 2, image::imageops::FilterType::Lanczos3);
        assert!(err.is_err());
    }
}
