//! EXIF orientation: a zero-allocation scan for the one tag the pipeline
//! actually needs, plus the eight transforms that undo it.
//!
//! `kamadak-exif` (see `metadata.rs`) is kept for full tag display in
//! `pixie info --exif`, but it wants a `Read + Seek` and parses the whole
//! IFD tree. That's too heavy to run once per image in the hot path, so the
//! orientation lookup used by `pipeline` is this hand-rolled slice scan
//! instead -- it never allocates and never reads past the buffer it's given.

use std::convert::TryFrom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Normal = 1,
    FlipH = 2,
    Rotate180 = 3,
    FlipV = 4,
    Transpose = 5,
    Rotate90 = 6,
    Transverse = 7,
    Rotate270 = 8,
}

impl TryFrom<u8> for Orientation {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        Ok(match value {
            1 => Orientation::Normal,
            2 => Orientation::FlipH,
            3 => Orientation::Rotate180,
            4 => Orientation::FlipV,
            5 => Orientation::Transpose,
            6 => Orientation::Rotate90,
            7 => Orientation::Transverse,
            8 => Orientation::Rotate270,
            _ => return Err(()),
        })
    }
}

/// Scan `buf` (typically the first 64 KiB of a JPEG) for the APP1/EXIF
/// orientation tag. Returns `1` (normal) on any parse failure or absence;
/// never panics, never reads past `buf.len()`.
pub fn read_jpeg_orientation(buf: &[u8]) -> u8 {
    if buf.len() < 12 || buf[0] != 0xFF || buf[1] != 0xD8 {
        return 1;
    }

    let len = buf.len().min(65536);
    let buf = &buf[..len];

    let mut pos = 2usize;
    while pos + 4 < len {
        if buf[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = buf[pos + 1];

        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == 0xDA || marker == 0xD9 {
            break;
        }
        if marker == 0xD0 || marker == 0x01 {
            pos += 2;
            continue;
        }

        let seg_len = u16::from_be_bytes([buf[pos + 2], buf[pos + 3]]) as usize;

        if marker == 0xE1 && pos + 10 < len && &buf[pos + 4..pos + 10] == b"Exif\0\0" {
            if let Some(orientation) = parse_exif_orientation(&buf[pos + 10..]) {
                return orientation;
            }
        }

        if seg_len < 2 {
            break;
        }
        pos += 2 + seg_len;
    }

    1
}

fn parse_exif_orientation(tiff: &[u8]) -> Option<u8> {
    if tiff.len() < 8 {
        return None;
    }

    let big_endian = tiff[0] == b'M';
    let read16 = |off: usize| -> Option<u16> {
        let b = tiff.get(off..off + 2)?;
        Some(if big_endian {
            u16::from_be_bytes([b[0], b[1]])
        } else {
            u16::from_le_bytes([b[0], b[1]])
        })
    };
    let read32 = |off: usize| -> Option<u32> {
        let b = tiff.get(off..off + 4)?;
        Some(if big_endian {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        })
    };

    let ifd_offset = read32(4)? as usize;
    if ifd_offset == 0 {
        return None;
    }

    let entry_count = read16(ifd_offset)?;
    for i in 0..entry_count {
        let entry_offset = ifd_offset + 2 + (i as usize) * 12;
        if entry_offset + 12 > tiff.len() {
            break;
        }
        let tag = read16(entry_offset)?;
        if tag == 0x0112 {
            let orientation = read16(entry_offset + 8)?;
            return if (1..=8).contains(&orientation) {
                Some(orientation as u8)
            } else {
                None
            };
        }
    }

    None
}

/// Apply the inverse transform for `orientation` to a `width*height*channels`
/// pixel buffer. Returns `true` if width/height were swapped (the four
/// rotations). Operates in place for flips/180; uses one scratch buffer for
/// the rotations.
pub fn apply_orientation(
    pixels: &mut Vec<u8>,
    width: &mut u32,
    height: &mut u32,
    channels: u8,
    orientation: Orientation,
) -> bool {
    if orientation == Orientation::Normal {
        return false;
    }

    let (w, h, c) = (*width as usize, *height as usize, channels as usize);
    let row_size = w * c;

    match orientation {
        Orientation::FlipH => {
            for y in 0..h {
                let row = &mut pixels[y * row_size..(y + 1) * row_size];
                for x in 0..w / 2 {
                    let x2 = w - 1 - x;
                    let (left, right) = row.split_at_mut(x2 * c);
                    left[x * c..x * c + c].swap_with_slice(&mut right[..c]);
                }
            }
            false
        }
        Orientation::Rotate180 => {
            let len = pixels.len();
            let mut i = 0;
            while i + c <= len / 2 {
                let j = len - c - i;
                let (head, tail) = pixels.split_at_mut(j);
                head[i..i + c].swap_with_slice(&mut tail[..c]);
                i += c;
            }
            false
        }
        Orientation::FlipV => {
            let mut temp = vec![0u8; row_size];
            for y in 0..h / 2 {
                let y2 = h - 1 - y;
                let (top, bottom) = pixels.split_at_mut(y2 * row_size);
                let top_row = &mut top[y * row_size..(y + 1) * row_size];
                let bottom_row = &mut bottom[..row_size];
                temp.copy_from_slice(top_row);
                top_row.copy_from_slice(bottom_row);
                bottom_row.copy_from_slice(&temp);
            }
            false
        }
        Orientation::Transpose => {
            transform(pixels, w, h, c, |x, y| (y, x));
            std::mem::swap(width, height);
            true
        }
        Orientation::Rotate90 => {
            transform(pixels, w, h, c, |x, y| (h - 1 - y, x));
            std::mem::swap(width, height);
            true
        }
        Orientation::Transverse => {
            transform(pixels, w, h, c, |x, y| (h - 1 - y, w - 1 - x));
            std::mem::swap(width, height);
            true
        }
        Orientation::Rotate270 => {
            transform(pixels, w, h, c, |x, y| (y, w - 1 - x));
            std::mem::swap(width, height);
            true
        }
        Orientation::Normal => unreachable!(),
    }
}

/// Generic "scatter every pixel through `map(x, y) -> (nx, ny)`" used by the
/// four transforms that swap width/height. `map`'s output is in the
/// *destination's* (new_width = old height) coordinate space.
fn transform(pixels: &mut Vec<u8>, w: usize, h: usize, c: usize, map: impl Fn(usize, usize) -> (usize, usize)) {
    let new_width = h;
    let mut dst = vec![0u8; w * h * c];
    for y in 0..h {
        for x in 0..w {
            let (nx, ny) = map(x, y);
            let src_off = (y * w + x) * c;
            let dst_off = (ny * new_width + nx) * c;
            dst[dst_off..dst_off + c].copy_from_slice(&pixels[src_off..src_off + c]);
        }
    }
    *pixels = dst;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_gradient(w: usize, h: usize, c: usize) -> Vec<u8> {
        (0..w * h * c).map(|i| (i % 256) as u8).collect()
    }

    #[test]
    fn malformed_returns_normal() {
        assert_eq!(read_jpeg_orientation(&[]), 1);
        assert_eq!(read_jpeg_orientation(&[0x00; 20]), 1);
        assert_eq!(read_jpeg_orientation(&[0xFF, 0xD8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]), 1);
    }

    #[test]
    fn finds_orientation_big_endian() {
        // Minimal SOI + APP1/Exif + TIFF (big-endian) + IFD0 with one entry (orientation=6).
        let mut buf = vec![0xFF, 0xD8];
        let mut app1 = Vec::new();
        app1.extend_from_slice(b"Exif\0\0");
        let tiff_start = app1.len();
        app1.extend_from_slice(b"MM"); // big endian
        app1.extend_from_slice(&42u16.to_be_bytes());
        app1.extend_from_slice(&8u32.to_be_bytes()); // IFD0 offset relative to tiff start
        // IFD0: 1 entry
        app1.extend_from_slice(&1u16.to_be_bytes());
        app1.extend_from_slice(&0x0112u16.to_be_bytes()); // tag
        app1.extend_from_slice(&3u16.to_be_bytes()); // type SHORT
        app1.extend_from_slice(&1u32.to_be_bytes()); // count
        app1.extend_from_slice(&6u16.to_be_bytes()); // value = 6
        app1.extend_from_slice(&[0, 0]); // pad value field to 4 bytes
        let _ = tiff_start;

        buf.push(0xFF);
        buf.push(0xE1);
        let seg_len = (app1.len() + 2) as u16;
        buf.extend_from_slice(&seg_len.to_be_bytes());
        buf.extend_from_slice(&app1);
        buf.push(0xFF);
        buf.push(0xD9);

        assert_eq!(read_jpeg_orientation(&buf), 6);
    }

    #[test]
    fn round_trip_every_orientation() {
        let (w, h, c) = (5usize, 4usize, 3usize);
        let original = make_gradient(w, h, c);

        for code in 1u8..=8 {
            let o = Orientation::try_from(code).unwrap();
            let mut pixels = original.clone();
            let mut width = w as u32;
            let mut height = h as u32;
            apply_orientation(&mut pixels, &mut width, &mut height, c as u8, o);

            // Applying the same transform a second time with swapped
            // dimensions should return to the original for the
            // self-inverse cases (2,3,4) and to original for rotations
            // when composed with their inverse.
            let inverse = match o {
                Orientation::Rotate90 => Orientation::Rotate270,
                Orientation::Rotate270 => Orientation::Rotate90,
                other => other,
            };
            apply_orientation(&mut pixels, &mut width, &mut height, c as u8, inverse);

            assert_eq!(width, w as u32);
            assert_eq!(height, h as u32);
            assert_eq!(pixels, original, "orientation {code} did not round-trip");
        }
    }

    #[test]
    fn pixel_count_preserved() {
        let (w, h, c) = (7usize, 3usize, 4usize);
        let original = make_gradient(w, h, c);
        for code in 1u8..=8 {
            let o = Orientation::try_from(code).unwrap();
            let mut pixels = original.clone();
            let mut width = w as u32;
            let mut height = h as u32;
            apply_orientation(&mut pixels, &mut width, &mut height, c as u8, o);
            assert_eq!(pixels.len(), original.len());
            assert_eq!(width as usize * height as usize, w * h);
        }
    }
}
