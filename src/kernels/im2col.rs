//! Patch extraction for HWC inputs.
//!
//! Output positions are split into five regions: top rows, then for the
//! middle rows left columns, interior columns and right columns, then bottom
//! rows. Only the interior is guaranteed to read no padding, so it copies a
//! whole kernel row (`dim_kernel * ch_im_in` elements) per codec call; every
//! other region checks each pixel.

use crate::kernels::codec::{fill_padding, unpack_reordered};
use crate::tensor::{Packed, Packing};
use core::ops::Range;

/// Input tensor plus the geometry needed to locate a receptive field.
#[derive(Debug, Clone, Copy)]
pub struct PatchSource<'a, I: Packing> {
    pub input: Packed<'a, I>,
    pub dim_im_in: usize,
    pub ch_im_in: usize,
    pub dim_kernel: usize,
    pub stride: usize,
    pub left_pad: usize,
    pub top_pad: usize,
    pub z_in: u8,
}

impl<I: Packing> PatchSource<'_, I> {
    /// Elements in one patch.
    pub fn patch_len(&self) -> usize {
        self.ch_im_in * self.dim_kernel * self.dim_kernel
    }
}

/// Fills `dst` (one patch, `patch_len()` values) for output `(oy, ox)`.
pub type PatchFill<I> = for<'a, 'b> fn(&'b PatchSource<'a, I>, usize, usize, &mut [i16]);

/// Bounds-checked fill: pixels outside the input are zero padding.
pub fn fill_patch_checked<I: Packing>(src: &PatchSource<'_, I>, oy: usize, ox: usize, dst: &mut [i16]) {
    let ch = src.ch_im_in;
    let k = src.dim_kernel;
    let dim = src.dim_im_in as isize;
    let y0 = (oy * src.stride) as isize - src.top_pad as isize;
    let x0 = (ox * src.stride) as isize - src.left_pad as isize;

    for (ky, row) in dst.chunks_exact_mut(k * ch).take(k).enumerate() {
        let iy = y0 + ky as isize;
        for (kx, px) in row.chunks_exact_mut(ch).enumerate() {
            let ix = x0 + kx as isize;
            if iy < 0 || iy >= dim || ix < 0 || ix >= dim {
                fill_padding(px, src.z_in);
            } else {
                let elem = (iy as usize * src.dim_im_in + ix as usize) * ch;
                unpack_reordered::<I>(src.input.from_element(elem), px, src.z_in);
            }
        }
    }
}

/// Fill for positions whose receptive field lies inside the input: one
/// contiguous codec call per kernel row.
pub fn fill_patch_interior<I: Packing>(src: &PatchSource<'_, I>, oy: usize, ox: usize, dst: &mut [i16]) {
    let ch = src.ch_im_in;
    let k = src.dim_kernel;
    let iy0 = oy * src.stride - src.top_pad;
    let ix = ox * src.stride - src.left_pad;

    for (ky, row) in dst.chunks_exact_mut(k * ch).take(k).enumerate() {
        let elem = ((iy0 + ky) * src.dim_im_in + ix) * ch;
        unpack_reordered::<I>(src.input.from_element(elem), row, src.z_in);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Top,
    Left,
    Interior,
    Right,
    Bottom,
}

impl Region {
    pub fn fill<I: Packing>(self) -> PatchFill<I> {
        match self {
            Region::Interior => fill_patch_interior::<I>,
            _ => fill_patch_checked::<I>,
        }
    }
}

/// Output index ranges (per axis) whose receptive field needs no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPlan {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
    pub dim_im_out: usize,
}

impl RegionPlan {
    pub fn new(
        dim_im_in: usize,
        dim_kernel: usize,
        stride: usize,
        top_pad: usize,
        left_pad: usize,
        dim_im_out: usize,
    ) -> Self {
        Self {
            rows: interior_span(top_pad, dim_im_in, dim_kernel, stride, dim_im_out),
            cols: interior_span(left_pad, dim_im_in, dim_kernel, stride, dim_im_out),
            dim_im_out,
        }
    }

    pub fn region(&self, oy: usize, ox: usize) -> Region {
        if oy < self.rows.start {
            Region::Top
        } else if oy >= self.rows.end {
            Region::Bottom
        } else if ox < self.cols.start {
            Region::Left
        } else if ox >= self.cols.end {
            Region::Right
        } else {
            Region::Interior
        }
    }

    /// Column spans of output row `oy` in raster order. Top and bottom rows
    /// are a single span; unused spans are empty.
    pub fn row_spans(&self, oy: usize) -> [(Region, Range<usize>); 3] {
        let dim = self.dim_im_out;
        if oy < self.rows.start {
            [(Region::Top, 0..dim), (Region::Top, dim..dim), (Region::Top, dim..dim)]
        } else if oy >= self.rows.end {
            [(Region::Bottom, 0..dim), (Region::Bottom, dim..dim), (Region::Bottom, dim..dim)]
        } else {
            [
                (Region::Left, 0..self.cols.start),
                (Region::Interior, self.cols.clone()),
                (Region::Right, self.cols.end..dim),
            ]
        }
    }

    pub fn interior_len(&self) -> usize {
        self.rows.len() * self.cols.len()
    }
}

/// Outputs `o` with `o * stride >= pad` and `o * stride - pad + k <= dim_in`.
fn interior_span(pad: usize, dim_in: usize, k: usize, stride: usize, dim_out: usize) -> Range<usize> {
    let lo = pad.div_ceil(stride).min(dim_out);
    let hi = if dim_in + pad >= k {
        ((dim_in + pad - k) / stride + 1).min(dim_out)
    } else {
        0
    };
    lo..hi.max(lo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{PackedMut, U2, U4};

    fn source<'a, I: Packing>(bytes: &'a [u8], dim: usize, ch: usize, k: usize, stride: usize, pad: usize) -> PatchSource<'a, I> {
        PatchSource {
            input: Packed::new(bytes),
            dim_im_in: dim,
            ch_im_in: ch,
            dim_kernel: k,
            stride,
            left_pad: pad,
            top_pad: pad,
            z_in: 1,
        }
    }

    #[test]
    fn test_interior_span() {
        // 5x5, k=3, pad 1, stride 1 -> 5 outputs, interior 1..4.
        assert_eq!(interior_span(1, 5, 3, 1, 5), 1..4);
        // stride 2: outputs 0..3, o=0 reads padding, o=1 reads 1..4, o=2 reads 3..6.
        assert_eq!(interior_span(1, 5, 3, 2, 3), 1..2);
        // No padding: everything is interior.
        assert_eq!(interior_span(0, 5, 3, 1, 3), 0..3);
        // Kernel larger than the padded input: nothing is interior.
        assert_eq!(interior_span(1, 2, 5, 1, 1), 1..1);
    }

    #[test]
    fn test_region_classification() {
        let plan = RegionPlan::new(6, 3, 1, 1, 2, 6);
        assert_eq!(plan.rows, 1..5);
        assert_eq!(plan.cols, 2..6);
        assert_eq!(plan.region(0, 3), Region::Top);
        assert_eq!(plan.region(5, 3), Region::Bottom);
        assert_eq!(plan.region(2, 1), Region::Left);
        assert_eq!(plan.region(2, 2), Region::Interior);
        assert_eq!(plan.interior_len(), 16);

        let spans = plan.row_spans(3);
        assert_eq!(spans[0], (Region::Left, 0..2));
        assert_eq!(spans[1], (Region::Interior, 2..6));
        assert_eq!(spans[2], (Region::Right, 6..6));
    }

    #[test]
    fn test_checked_fill_pads_with_raw_zero() {
        let values: Vec<u8> = (0..9 * 4).map(|i| (i % 4) as u8).collect();
        let mut bytes = vec![0u8; 9];
        PackedMut::<U2>::new(&mut bytes).fill_from(&values);
        let src = source::<U2>(&bytes, 3, 4, 2, 1, 1);

        let mut patch = vec![0i16; src.patch_len()];
        fill_patch_checked(&src, 0, 0, &mut patch);
        // Only kernel pixel (1,1) -> input (0,0) is real.
        assert_eq!(&patch[..12], &[-1; 12]);
        assert_eq!(&patch[12..], &[-1, 1, 0, 2]);
    }

    #[test]
    fn test_interior_matches_checked() {
        let dim = 5;
        let ch = 8;
        let values: Vec<u8> = (0..dim * dim * ch).map(|i| ((i * 7 + 3) % 16) as u8).collect();
        let mut bytes = vec![0u8; values.len() / 2];
        PackedMut::<U4>::new(&mut bytes).fill_from(&values);

        for stride in 1..3 {
            let src = source::<U4>(&bytes, dim, ch, 3, stride, 1);
            let dim_out = (dim + 2 - 3) / stride + 1;
            let plan = RegionPlan::new(dim, 3, stride, 1, 1, dim_out);
            for oy in plan.rows.clone() {
                for ox in plan.cols.clone() {
                    let mut a = vec![0i16; src.patch_len()];
                    let mut b = vec![0i16; src.patch_len()];
                    Region::Interior.fill::<U4>()(&src, oy, ox, &mut a);
                    fill_patch_checked(&src, oy, ox, &mut b);
                    assert_eq!(a, b, "stride {} at ({}, {})", stride, oy, ox);
                }
            }
        }
    }
}
