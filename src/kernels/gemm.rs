//! Two-rows-by-two-patches dot-product kernel and its scalar tail.
//!
//! Weights are a packed `[ch_im_out, num_col]` matrix whose rows are filters
//! in HWC order. Patches come from the im2col stage in working order (see
//! [`crate::kernels::codec`]).

use crate::kernels::codec::{read_and_pad_reordered, reorder_index};
use crate::kernels::dsp::{load_pair, splat, Dsp, Native};
use crate::kernels::quantization::{Requantize, Thresholds};
use crate::tensor::{Packed, PackedMut, Packing, WeightOffsets, U2, U4};

/// Write cursor over a packed HWC output, advancing one pixel
/// (`ch_im_out` elements) at a time.
pub struct OutputCursor<'o, O: Packing> {
    out: PackedMut<'o, O>,
    ch_im_out: usize,
    pixel: usize,
}

impl<'o, O: Packing> OutputCursor<'o, O> {
    pub fn new(out: PackedMut<'o, O>, ch_im_out: usize) -> Self {
        Self {
            out,
            ch_im_out,
            pixel: 0,
        }
    }

    /// Writes channel `ch` of the pixel `offset` positions past the cursor.
    #[inline(always)]
    pub fn put(&mut self, offset: usize, ch: usize, value: u8) {
        self.out.set((self.pixel + offset) * self.ch_im_out + ch, value);
    }

    #[inline(always)]
    pub fn advance(&mut self, pixels: usize) {
        self.pixel += pixels;
    }

    /// Pixels written so far.
    pub fn pixel(&self) -> usize {
        self.pixel
    }

    /// Byte position of the cursor in the packed output.
    pub fn byte_offset(&self) -> usize {
        self.pixel * self.ch_im_out / O::PER_BYTE
    }
}

/// Multiplies two weight rows at a time against the two patches stacked in
/// `patches` (`2 * num_col` values) and writes two output pixels.
///
/// Four accumulators are kept per row pair (row x patch), seeded with the
/// row bias. Columns are consumed one packed 32-bit weight word
/// (`W::BLOCK` elements) at a time; a remainder that does not fill a word is
/// finished element by element. `ch_im_out` must be even and `num_col` a
/// multiple of 4.
pub fn mat_mult_kernel_reordered<W, O, Q, D>(
    weights: Packed<'_, W>,
    patches: &[i16],
    ch_im_out: usize,
    num_col: usize,
    bias: &[i32],
    z_wt: WeightOffsets<'_>,
    requant: &Q,
    out: &mut OutputCursor<'_, O>,
) where
    W: Packing,
    O: Packing,
    Q: Requantize,
    D: Dsp,
{
    let row_bytes = num_col / W::PER_BYTE;
    let blocks = num_col / W::BLOCK;
    let tail_start = blocks * W::BLOCK;
    let (patch1, patch2) = patches[..2 * num_col].split_at(num_col);
    let w = weights.bytes();

    let mut lanes = [0u32; 8];
    let mut lanes2 = [0u32; 8];

    for i in (0..ch_im_out).step_by(2) {
        let row = &w[i * row_bytes..(i + 1) * row_bytes];
        let row2 = &w[(i + 1) * row_bytes..(i + 2) * row_bytes];
        let mut pa = row;
        let mut pa2 = row2;

        let (z1, z2) = (z_wt.get(i), z_wt.get(i + 1));
        let (za, za2) = (splat(z1), splat(z2));

        let mut sum = bias[i];
        let mut sum2 = bias[i];
        let mut sum3 = bias[i + 1];
        let mut sum4 = bias[i + 1];

        let mut col = 0;
        for _ in 0..blocks {
            pa = read_and_pad_reordered::<W>(pa, &mut lanes);
            pa2 = read_and_pad_reordered::<W>(pa2, &mut lanes2);
            for k in 0..W::BLOCK / 2 {
                let a1 = D::sub_pair(lanes[k], za);
                let a2 = D::sub_pair(lanes2[k], za2);
                let b1 = load_pair(patch1, col);
                let b2 = load_pair(patch2, col);

                sum = D::mul_add_pair(a1, b1, sum);
                sum2 = D::mul_add_pair(a1, b2, sum2);
                sum3 = D::mul_add_pair(a2, b1, sum3);
                sum4 = D::mul_add_pair(a2, b2, sum4);
                col += 2;
            }
        }

        for c in tail_start..num_col {
            let x = reorder_index(c, num_col);
            let (b1, b2) = (patch1[x] as i32, patch2[x] as i32);
            let a1 = W::get(row, c) as i32 - z1 as i32;
            let a2 = W::get(row2, c) as i32 - z2 as i32;
            sum = sum.wrapping_add(a1 * b1);
            sum2 = sum2.wrapping_add(a1 * b2);
            sum3 = sum3.wrapping_add(a2 * b1);
            sum4 = sum4.wrapping_add(a2 * b2);
        }

        out.put(0, i, requant.requantize::<O, D>(i, sum));
        out.put(1, i, requant.requantize::<O, D>(i, sum2));
        out.put(0, i + 1, requant.requantize::<O, D>(i + 1, sum3));
        out.put(1, i + 1, requant.requantize::<O, D>(i + 1, sum4));
    }

    out.advance(2);
}

/// Scalar path for a single leftover patch: one output channel at a time,
/// same zero-point handling and requantization as the blocked kernel.
pub fn mat_mult_tail<W, O, Q, D>(
    weights: Packed<'_, W>,
    patch: &[i16],
    ch_im_out: usize,
    num_col: usize,
    bias: &[i32],
    z_wt: WeightOffsets<'_>,
    requant: &Q,
    out: &mut OutputCursor<'_, O>,
) where
    W: Packing,
    O: Packing,
    Q: Requantize,
    D: Dsp,
{
    let row_bytes = num_col / W::PER_BYTE;
    let w = weights.bytes();

    for ch in 0..ch_im_out {
        let row = &w[ch * row_bytes..(ch + 1) * row_bytes];
        let z = z_wt.get(ch) as i32;
        let mut sum = bias[ch];
        for c in 0..num_col {
            let a = W::get(row, c) as i32 - z;
            sum = sum.wrapping_add(a * patch[reorder_index(c, num_col)] as i32);
        }
        out.put(0, ch, requant.requantize::<O, D>(ch, sum));
    }

    out.advance(1);
}

/// Blocked kernel for 2-bit weights with per-channel zero-points and a
/// 4-bit threshold-folded output.
pub fn mat_mult_kernel_reordered_u2_i16_u4_pact_ch_thr(
    weights: Packed<'_, U2>,
    patches: &[i16],
    ch_im_out: usize,
    num_col: usize,
    bias: &[i32],
    z_wt: &[u8],
    thresholds: &[i16],
    out: &mut OutputCursor<'_, U4>,
) {
    mat_mult_kernel_reordered::<U2, U4, _, Native>(
        weights,
        patches,
        ch_im_out,
        num_col,
        bias,
        WeightOffsets::PerChannel(z_wt),
        &Thresholds { ladder: thresholds },
        out,
    )
}
