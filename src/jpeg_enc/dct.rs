//! Fixed-point 2D forward DCT: AAN-style butterflies with constants
//! `C2=3784, C4=2896, C6=1567` (cosines scaled by 4096), row pass then
//! column pass, final `>>3` baked into the column pass's output. Grounded
//! line-for-line on `fast_jpeg.hpp`'s `fdct_scalar`/`fdct`.
//!
//! The column pass is the only stage vectorized: `fdct_8x8_avx2` runs the
//! same butterfly across all eight columns of one block at once (one lane
//! per column), matching the reference encoder's AVX2 path rather than
//! vectorizing across independent blocks.

const C2: i32 = 3784;
const C4: i32 = 2896;
const C6: i32 = 1567;
const ROUND: i32 = 2048;

/// In-place forward DCT of one level-shifted 8x8 block in row-major order.
/// Dispatches to the AVX2 column-pass path when the CPU supports it;
/// both paths share the row pass and produce identical output, so callers
/// never need to know which ran.
pub fn fdct_8x8(block: &mut [i32; 64]) {
    #[cfg(target_arch = "x86_64")]
    {
        if avx2_available() {
            unsafe { fdct_8x8_avx2(block) };
            return;
        }
    }
    fdct_8x8_scalar(block);
}

/// Whether this CPU supports the AVX2 column-pass path.
pub fn avx2_available() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        is_x86_feature_detected!("avx2")
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

/// One row (or, in the column pass, one column) of the AAN butterfly.
/// `x0..x7` in, `(even four, odd four)` out, unshifted -- the caller
/// applies whatever final shift its pass needs.
#[inline]
fn butterfly(x0: i32, x1: i32, x2: i32, x3: i32, x4: i32, x5: i32, x6: i32, x7: i32) -> [i32; 8] {
    let s0 = x0 + x7;
    let s1 = x1 + x6;
    let s2 = x2 + x5;
    let s3 = x3 + x4;
    let d0 = x0 - x7;
    let d1 = x1 - x6;
    let d2 = x2 - x5;
    let d3 = x3 - x4;

    let t0 = s0 + s3;
    let t1 = s1 + s2;
    let t2 = s0 - s3;
    let t3 = s1 - s2;

    let out0 = t0 + t1;
    let out4 = t0 - t1;
    let out2 = (t2 * C6 + t3 * C2 + ROUND) >> 12;
    let out6 = (t2 * C2 - t3 * C6 + ROUND) >> 12;

    let t10 = d0 + d1;
    let t11 = d1 + d2;
    let t12 = d2 + d3;
    let z5 = ((t10 - t12) * C6 + ROUND) >> 12;
    let z2 = ((t10 * C2 + ROUND) >> 12) + z5;
    let z4 = ((t12 * C2 + ROUND) >> 12) + t12 + z5;
    let z3 = (t11 * C4 + ROUND) >> 12;
    let z11 = d3 + z3;
    let z13 = d3 - z3;

    let out5 = z13 + z2;
    let out3 = z13 - z2;
    let out1 = z11 + z4;
    let out7 = z11 - z4;

    [out0, out1, out2, out3, out4, out5, out6, out7]
}

/// Row pass shared by the scalar and AVX2 paths: eight independent 1D
/// DCTs, one per row, left unshifted since the `>>3` only happens once,
/// in the column pass.
fn row_pass(block: &[i32; 64]) -> [i32; 64] {
    let mut tmp = [0i32; 64];
    for i in 0..8 {
        let r = i * 8;
        let out = butterfly(block[r], block[r + 1], block[r + 2], block[r + 3], block[r + 4], block[r + 5], block[r + 6], block[r + 7]);
        tmp[r..r + 8].copy_from_slice(&out);
    }
    tmp
}

fn fdct_8x8_scalar(block: &mut [i32; 64]) {
    let tmp = row_pass(block);
    for i in 0..8 {
        let out = butterfly(tmp[i], tmp[i + 8], tmp[i + 16], tmp[i + 24], tmp[i + 32], tmp[i + 40], tmp[i + 48], tmp[i + 56]);
        for (k, &v) in out.iter().enumerate() {
            block[i + k * 8] = v >> 3;
        }
    }
}

/// Same butterfly as the scalar column pass, vectorized across the
/// block's eight columns (one lane per column) instead of one column at
/// a time.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn fdct_8x8_avx2(block: &mut [i32; 64]) {
    use std::arch::x86_64::*;

    let tmp = row_pass(block);

    let r0 = _mm256_loadu_si256(tmp[0..].as_ptr() as *const __m256i);
    let r1 = _mm256_loadu_si256(tmp[8..].as_ptr() as *const __m256i);
    let r2 = _mm256_loadu_si256(tmp[16..].as_ptr() as *const __m256i);
    let r3 = _mm256_loadu_si256(tmp[24..].as_ptr() as *const __m256i);
    let r4 = _mm256_loadu_si256(tmp[32..].as_ptr() as *const __m256i);
    let r5 = _mm256_loadu_si256(tmp[40..].as_ptr() as *const __m256i);
    let r6 = _mm256_loadu_si256(tmp[48..].as_ptr() as *const __m256i);
    let r7 = _mm256_loadu_si256(tmp[56..].as_ptr() as *const __m256i);

    let c2 = _mm256_set1_epi32(C2);
    let c4 = _mm256_set1_epi32(C4);
    let c6 = _mm256_set1_epi32(C6);
    let round = _mm256_set1_epi32(ROUND);

    let s0 = _mm256_add_epi32(r0, r7);
    let s1 = _mm256_add_epi32(r1, r6);
    let s2 = _mm256_add_epi32(r2, r5);
    let s3 = _mm256_add_epi32(r3, r4);
    let d0 = _mm256_sub_epi32(r0, r7);
    let d1 = _mm256_sub_epi32(r1, r6);
    let d2 = _mm256_sub_epi32(r2, r5);
    let d3 = _mm256_sub_epi32(r3, r4);

    let t0 = _mm256_add_epi32(s0, s3);
    let t1 = _mm256_add_epi32(s1, s2);
    let t2 = _mm256_sub_epi32(s0, s3);
    let t3 = _mm256_sub_epi32(s1, s2);

    let out0 = _mm256_srai_epi32(_mm256_add_epi32(t0, t1), 3);
    let out4 = _mm256_srai_epi32(_mm256_sub_epi32(t0, t1), 3);

    let e2 = _mm256_add_epi32(_mm256_mullo_epi32(t2, c6), _mm256_mullo_epi32(t3, c2));
    let out2 = _mm256_srai_epi32(_mm256_srai_epi32(_mm256_add_epi32(e2, round), 12), 3);

    let e6 = _mm256_sub_epi32(_mm256_mullo_epi32(t2, c2), _mm256_mullo_epi32(t3, c6));
    let out6 = _mm256_srai_epi32(_mm256_srai_epi32(_mm256_add_epi32(e6, round), 12), 3);

    let t10 = _mm256_add_epi32(d0, d1);
    let t11 = _mm256_add_epi32(d1, d2);
    let t12 = _mm256_add_epi32(d2, d3);

    let z5 = _mm256_srai_epi32(_mm256_add_epi32(_mm256_mullo_epi32(_mm256_sub_epi32(t10, t12), c6), round), 12);
    let z2 = _mm256_add_epi32(_mm256_srai_epi32(_mm256_add_epi32(_mm256_mullo_epi32(t10, c2), round), 12), z5);
    let z4 = _mm256_add_epi32(_mm256_add_epi32(_mm256_srai_epi32(_mm256_add_epi32(_mm256_mullo_epi32(t12, c2), round), 12), t12), z5);
    let z3 = _mm256_srai_epi32(_mm256_add_epi32(_mm256_mullo_epi32(t11, c4), round), 12);
    let z11 = _mm256_add_epi32(d3, z3);
    let z13 = _mm256_sub_epi32(d3, z3);

    let out5 = _mm256_srai_epi32(_mm256_add_epi32(z13, z2), 3);
    let out3 = _mm256_srai_epi32(_mm256_sub_epi32(z13, z2), 3);
    let out1 = _mm256_srai_epi32(_mm256_add_epi32(z11, z4), 3);
    let out7 = _mm256_srai_epi32(_mm256_sub_epi32(z11, z4), 3);

    _mm256_storeu_si256(block[0..].as_mut_ptr() as *mut __m256i, out0);
    _mm256_storeu_si256(block[8..].as_mut_ptr() as *mut __m256i, out1);
    _mm256_storeu_si256(block[16..].as_mut_ptr() as *mut __m256i, out2);
    _mm256_storeu_si256(block[24..].as_mut_ptr() as *mut __m256i, out3);
    _mm256_storeu_si256(block[32..].as_mut_ptr() as *mut __m256i, out4);
    _mm256_storeu_si256(block[40..].as_mut_ptr() as *mut __m256i, out5);
    _mm256_storeu_si256(block[48..].as_mut_ptr() as *mut __m256i, out6);
    _mm256_storeu_si256(block[56..].as_mut_ptr() as *mut __m256i, out7);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_only_block_has_zero_ac() {
        let mut block = [0i32; 64];
        fdct_8x8(&mut block);
        assert!(block.iter().all(|&v| v == 0));
    }

    #[test]
    fn uniform_nonzero_block_is_dc_only() {
        // Every row/column difference is zero, so the butterfly's odd
        // (AC) outputs collapse to exactly zero -- this is an exact
        // integer identity, not an approximation.
        let mut block = [64i32; 64];
        fdct_8x8(&mut block);
        assert_eq!(block[0], 512);
        for (i, &v) in block.iter().enumerate().skip(1) {
            assert_eq!(v, 0, "AC coefficient {i} should be exactly zero, got {v}");
        }
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn avx2_matches_scalar_when_available() {
        if !avx2_available() {
            return;
        }
        let mut scalar = [0i32; 64];
        for (i, slot) in scalar.iter_mut().enumerate() {
            *slot = ((i * 37) % 23) as i32 - 11;
        }
        let mut vector = scalar;

        fdct_8x8_scalar(&mut scalar);
        unsafe { fdct_8x8_avx2(&mut vector) };

        assert_eq!(scalar, vector);
    }
}
