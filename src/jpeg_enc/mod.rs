//! Hand-written baseline JPEG encoder (ISO/IEC 10918-1): 4:2:0 chroma
//! subsampled, single scan, canonical Huffman tables. No progressive mode,
//! no arithmetic coding, no restart markers -- the baseline subset a batch
//! optimizer actually needs.
//!
//! `MemEncoder` (`encode_rgb`) builds the whole file in a `Vec<u8>`;
//! `Encoder` writes straight into a reserved memory-mapped file via
//! `crate::mmap`, falling back to a streaming write if the mapping can't be
//! grown to the reserved size.

mod dct;
mod tables;

use crate::{ImageToolError, Result};
use std::path::Path;

type HuffTable = [(u16, u8); 256];

fn build_huff_table(spec: &tables::HuffSpec) -> HuffTable {
    let mut sizes = Vec::new();
    for (len_minus_one, &count) in spec.counts.iter().enumerate() {
        for _ in 0..count {
            sizes.push((len_minus_one + 1) as u8);
        }
    }

    let mut codes = Vec::with_capacity(sizes.len());
    let mut code: u16 = 0;
    let mut size_idx = 0;
    while size_idx < sizes.len() {
        let current_size = sizes[size_idx];
        while size_idx < sizes.len() && sizes[size_idx] == current_size {
            codes.push(code);
            code += 1;
            size_idx += 1;
        }
        code <<= 1;
    }

    let mut table = [(0u16, 0u8); 256];
    for (i, &value) in spec.values.iter().enumerate() {
        table[value as usize] = (codes[i], sizes[i]);
    }
    table
}

struct BitWriter {
    buf: Vec<u8>,
    acc: u32,
    nbits: u32,
}

impl BitWriter {
    fn new() -> Self {
        Self { buf: Vec::new(), acc: 0, nbits: 0 }
    }

    fn put_bits(&mut self, code: u16, len: u8) {
        if len == 0 {
            return;
        }
        self.acc = (self.acc << len) | (code as u32 & ((1u32 << len) - 1));
        self.nbits += len as u32;
        while self.nbits >= 8 {
            self.nbits -= 8;
            let byte = ((self.acc >> self.nbits) & 0xFF) as u8;
            self.buf.push(byte);
            if byte == 0xFF {
                self.buf.push(0x00);
            }
        }
    }

    /// Pad the final partial byte with 1-bits, per the baseline spec.
    fn finish(&mut self) {
        if self.nbits > 0 {
            let pad = (8 - self.nbits) as u8;
            self.put_bits((1u16 << pad) - 1, pad);
        }
    }
}

fn magnitude_bits(v: i32, cat: u8) -> u16 {
    if v >= 0 {
        v as u16
    } else {
        (v + (1 << cat) - 1) as u16
    }
}

/// Division of `coeff` by the table entry that produced `recip`/`bias`,
/// approximated as a multiply and a shift: `((v + sign(v)*bias) * recip)
/// >> 15`. Grounded on `fast_jpeg.hpp`'s `quantize`.
fn quantize(coeff: i32, recip: i32, bias: i32) -> i32 {
    let biased = if coeff >= 0 { coeff + bias } else { coeff - bias };
    (biased * recip) >> 15
}

fn to_zigzag_order(table: &[u16; 64]) -> [u16; 64] {
    let mut out = [0u16; 64];
    for (natural, &v) in table.iter().enumerate() {
        out[tables::ZIGZAG[natural]] = v;
    }
    out
}

fn emit_dc(bw: &mut BitWriter, diff: i32, table: &HuffTable) {
    let cat = tables::category(diff);
    let (code, len) = table[cat as usize];
    bw.put_bits(code, len);
    if cat > 0 {
        bw.put_bits(magnitude_bits(diff, cat), cat);
    }
}

fn emit_ac(bw: &mut BitWriter, coeffs: &[i32; 64], table: &HuffTable) {
    let mut run: u8 = 0;
    for &v in coeffs.iter().skip(1) {
        if v == 0 {
            run += 1;
            continue;
        }
        while run > 15 {
            let (code, len) = table[0xF0];
            bw.put_bits(code, len);
            run -= 16;
        }
        let cat = tables::category(v);
        let symbol = (run << 4) | cat;
        let (code, len) = table[symbol as usize];
        bw.put_bits(code, len);
        bw.put_bits(magnitude_bits(v, cat), cat);
        run = 0;
    }
    if run > 0 {
        let (code, len) = table[0x00];
        bw.put_bits(code, len);
    }
}

fn extract_block(plane: &[u8], stride: usize, x0: usize, y0: usize) -> [i32; 64] {
    let mut block = [0i32; 64];
    for y in 0..8 {
        for x in 0..8 {
            block[y * 8 + x] = plane[(y0 + y) * stride + x0 + x] as i32 - 128;
        }
    }
    block
}

fn encode_block(
    bw: &mut BitWriter,
    mut block: [i32; 64],
    qtable: &tables::QuantTable,
    prev_dc: &mut i32,
    dc_table: &HuffTable,
    ac_table: &HuffTable,
) {
    dct::fdct_8x8(&mut block);
    let mut coeffs = [0i32; 64];
    for natural in 0..64 {
        let zz = tables::ZIGZAG[natural];
        coeffs[zz] = quantize(block[natural], qtable.recip[natural], qtable.bias[natural]);
    }

    let diff = coeffs[0] - *prev_dc;
    *prev_dc = coeffs[0];
    emit_dc(bw, diff, dc_table);
    emit_ac(bw, &coeffs, ac_table);
}

/// Builds level-independent Y/Cb/Cr planes padded to a multiple of 16 in
/// each dimension (edge pixels replicated), with Cb/Cr downsampled 2x in
/// both axes for 4:2:0. Returns `(y, cb, cr, padded_w, padded_h)`.
fn build_planes(pixels: &[u8], width: u32, height: u32) -> (Vec<u8>, Vec<u8>, Vec<u8>, usize, usize) {
    let width = width as usize;
    let height = height as usize;
    let pw = (width + 15) / 16 * 16;
    let ph = (height + 15) / 16 * 16;

    let mut y_plane = vec![0u8; pw * ph];
    let mut cb_full = vec![0u8; pw * ph];
    let mut cr_full = vec![0u8; pw * ph];

    for y in 0..ph {
        let sy = y.min(height - 1);
        for x in 0..pw {
            let sx = x.min(width - 1);
            let idx = (sy * width + sx) * 3;
            let (r, g, b) = (pixels[idx], pixels[idx + 1], pixels[idx + 2]);
            y_plane[y * pw + x] = tables::rgb_to_y(r, g, b);
            cb_full[y * pw + x] = tables::rgb_to_cb(r, g, b);
            cr_full[y * pw + x] = tables::rgb_to_cr(r, g, b);
        }
    }

    let cw = pw / 2;
    let ch = ph / 2;
    let mut cb_plane = vec![0u8; cw * ch];
    let mut cr_plane = vec![0u8; cw * ch];
    for y in 0..ch {
        for x in 0..cw {
            let i00 = (y * 2) * pw + x * 2;
            let i01 = i00 + 1;
            let i10 = i00 + pw;
            let i11 = i10 + 1;
            cb_plane[y * cw + x] =
                ((cb_full[i00] as u32 + cb_full[i01] as u32 + cb_full[i10] as u32 + cb_full[i11] as u32 + 2) / 4) as u8;
            cr_plane[y * cw + x] =
                ((cr_full[i00] as u32 + cr_full[i01] as u32 + cr_full[i10] as u32 + cr_full[i11] as u32 + 2) / 4) as u8;
        }
    }

    (y_plane, cb_plane, cr_plane, pw, ph)
}

fn write_dqt(out: &mut Vec<u8>, id: u8, table: &[u16; 64]) {
    out.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43]);
    out.push(id);
    for v in to_zigzag_order(table) {
        out.push(v as u8);
    }
}

fn write_dht(out: &mut Vec<u8>, class_and_id: u8, spec: &tables::HuffSpec) {
    let len = 2 + 1 + 16 + spec.values.len();
    out.extend_from_slice(&[0xFF, 0xC4]);
    out.extend_from_slice(&(len as u16).to_be_bytes());
    out.push(class_and_id);
    out.extend_from_slice(&spec.counts);
    out.extend_from_slice(spec.values);
}

fn write_headers(out: &mut Vec<u8>, width: u32, height: u32, qy: &[u16; 64], qc: &[u16; 64]) {
    out.extend_from_slice(&[0xFF, 0xD8]);

    out.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    out.extend_from_slice(b"JFIF\0");
    out.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);

    write_dqt(out, 0, qy);
    write_dqt(out, 1, qc);

    out.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11]);
    out.push(8);
    out.extend_from_slice(&(height as u16).to_be_bytes());
    out.extend_from_slice(&(width as u16).to_be_bytes());
    out.push(3);
    out.extend_from_slice(&[1, 0x22, 0]);
    out.extend_from_slice(&[2, 0x11, 1]);
    out.extend_from_slice(&[3, 0x11, 1]);

    write_dht(out, 0x00, &tables::DC_LUMA);
    write_dht(out, 0x01, &tables::DC_CHROMA);
    write_dht(out, 0x10, &tables::AC_LUMA);
    write_dht(out, 0x11, &tables::AC_CHROMA);

    out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x0C]);
    out.push(3);
    out.extend_from_slice(&[1, 0x00]);
    out.extend_from_slice(&[2, 0x11]);
    out.extend_from_slice(&[3, 0x11]);
    out.extend_from_slice(&[0, 63, 0]);
}

/// Encode a packed 3-channel RGB buffer to a complete baseline JPEG file
/// in memory. `quality` is 1..=100.
pub fn encode_rgb(pixels: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(ImageToolError::EncodeFailed("zero-sized image".into()));
    }
    if pixels.len() != width as usize * height as usize * 3 {
        return Err(ImageToolError::EncodeFailed("pixel buffer size does not match dimensions".into()));
    }

    let qy = tables::scaled_quant_table(&tables::STD_QUANT_Y, quality);
    let qc = tables::scaled_quant_table(&tables::STD_QUANT_C, quality);

    let dc_luma = build_huff_table(&tables::DC_LUMA);
    let dc_chroma = build_huff_table(&tables::DC_CHROMA);
    let ac_luma = build_huff_table(&tables::AC_LUMA);
    let ac_chroma = build_huff_table(&tables::AC_CHROMA);

    let (y_plane, cb_plane, cr_plane, pw, ph) = build_planes(pixels, width, height);
    let cw = pw / 2;

    let mut out = Vec::with_capacity(width as usize * height as usize / 2 + 1024);
    write_headers(&mut out, width, height, &qy.values, &qc.values);

    let mut bw = BitWriter::new();
    let mut prev_dc = [0i32; 3];

    for my in 0..(ph / 16) {
        for mx in 0..(pw / 16) {
            for by in 0..2 {
                for bx in 0..2 {
                    let block = extract_block(&y_plane, pw, mx * 16 + bx * 8, my * 16 + by * 8);
                    encode_block(&mut bw, block, &qy, &mut prev_dc[0], &dc_luma, &ac_luma);
                }
            }
            let cb_block = extract_block(&cb_plane, cw, mx * 8, my * 8);
            encode_block(&mut bw, cb_block, &qc, &mut prev_dc[1], &dc_chroma, &ac_chroma);
            let cr_block = extract_block(&cr_plane, cw, mx * 8, my * 8);
            encode_block(&mut bw, cr_block, &qc, &mut prev_dc[2], &dc_chroma, &ac_chroma);
        }
    }

    bw.finish();
    out.extend_from_slice(&bw.buf);
    out.extend_from_slice(&[0xFF, 0xD9]);
    Ok(out)
}

/// Buffer-based encoder: builds the whole file in memory. This is the
/// common path for the resize/optimize pipeline, which already holds the
/// decoded pixels in memory.
pub struct MemEncoder {
    quality: u8,
}

impl MemEncoder {
    pub fn new(quality: u8) -> Self {
        Self { quality }
    }

    pub fn encode(&self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        encode_rgb(pixels, width, height, self.quality)
    }
}

/// File-based encoder: reserves a memory-mapped output file sized for the
/// worst case (`width*height/2 + 64KiB`) and writes directly into it,
/// falling back to a plain `std::fs::write` if the reservation or mapping
/// fails.
pub struct Encoder {
    quality: u8,
}

impl Encoder {
    pub fn new(quality: u8) -> Self {
        Self { quality }
    }

    pub fn encode_to_file(&self, pixels: &[u8], width: u32, height: u32, path: &Path) -> Result<()> {
        let reserved = (width as u64 * height as u64) / 2 + 65536;

        match crate::mmap::MappedOutput::create(path, reserved)? {
            Some(mut out) => {
                let bytes = encode_rgb(pixels, width, height, self.quality)?;
                if (bytes.len() as u64) <= out.reserved() {
                    out.data_mut()[..bytes.len()].copy_from_slice(&bytes);
                    out.finish(bytes.len() as u64)
                } else {
                    // Reservation undersized (can happen on incompressible
                    // input); fall back to a plain streaming write.
                    drop(out);
                    std::fs::write(path, &bytes).map_err(Into::into)
                }
            }
            None => {
                let bytes = encode_rgb(pixels, width, height, self.quality)?;
                std::fs::write(path, &bytes).map_err(Into::into)
            }
        }
    }
}

/// Interface for an external batch-DCT collaborator (e.g. a GPU backend):
/// accepts N level-shifted 8x8 blocks and a quantization table, hands back
/// N blocks of quantized coefficients already in zigzag order. Nothing in
/// this crate requires a collaborator to exist; `CpuBatchDct` is the
/// trivial implementation that satisfies the contract with the encoder's
/// own (already CPU-feature-dispatched) per-block transform.
pub trait BatchDct {
    fn transform_batch(&self, blocks: &mut [[i32; 64]; 8], qtable: &tables::QuantTable);
}

pub struct CpuBatchDct;

impl BatchDct for CpuBatchDct {
    fn transform_batch(&self, blocks: &mut [[i32; 64]; 8], qtable: &tables::QuantTable) {
        for block in blocks.iter_mut() {
            dct::fdct_8x8(block);
            let mut zz = [0i32; 64];
            for natural in 0..64 {
                zz[tables::ZIGZAG[natural]] = quantize(block[natural], qtable.recip[natural], qtable.bias[natural]);
            }
            *block = zz;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(w: u32, h: u32) -> Vec<u8> {
        let mut v = vec![0u8; w as usize * h as usize * 3];
        for y in 0..h {
            for x in 0..w {
                let c = if (x + y) % 2 == 0 { 235 } else { 20 };
                let i = (y as usize * w as usize + x as usize) * 3;
                v[i] = c;
                v[i + 1] = c;
                v[i + 2] = c;
            }
        }
        v
    }

    #[test]
    fn rejects_mismatched_buffer() {
        let bytes = vec![0u8; 10];
        assert!(encode_rgb(&bytes, 4, 4, 85).is_err());
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!(encode_rgb(&[], 0, 4, 85).is_err());
    }

    #[test]
    fn produces_well_formed_markers() {
        let img = checkerboard(32, 16);
        let bytes = encode_rgb(&img, 32, 16, 80).unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
        assert_eq!(&bytes[2..4], &[0xFF, 0xE0]);
    }

    #[test]
    fn output_is_decodable_by_the_image_crate() {
        let img = checkerboard(33, 17); // not a multiple of 16 -> exercises edge padding
        let bytes = encode_rgb(&img, 33, 17, 85).unwrap();
        let decoded = image::load_from_memory(&bytes).expect("encoder output should be a valid JPEG");
        assert_eq!(decoded.width(), 33);
        assert_eq!(decoded.height(), 17);
    }

    #[test]
    fn higher_quality_yields_larger_output() {
        let img = checkerboard(64, 64);
        let low = encode_rgb(&img, 64, 64, 10).unwrap();
        let high = encode_rgb(&img, 64, 64, 95).unwrap();
        assert!(high.len() > low.len());
    }

    #[test]
    fn huffman_tables_cover_every_listed_symbol() {
        for spec in [&tables::DC_LUMA, &tables::DC_CHROMA, &tables::AC_LUMA, &tables::AC_CHROMA] {
            let table = build_huff_table(spec);
            for &value in spec.values {
                assert!(table[value as usize].1 > 0, "symbol {value:#x} missing a code");
            }
        }
    }
}
