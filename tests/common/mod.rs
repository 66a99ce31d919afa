//! Naive reference convolution and packing helpers shared by the
//! integration tests.
#![allow(dead_code)]

use mixq::{ConvGeometry, Packed, PackedMut, Packing};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct Lcg(pub u32);

impl Lcg {
    pub fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1664525).wrapping_add(1013904223);
        self.0 >> 16
    }

    pub fn below(&mut self, n: u32) -> u8 {
        (self.next() % n) as u8
    }

    pub fn values(&mut self, len: usize, max: u8) -> Vec<u8> {
        (0..len).map(|_| self.below(max as u32 + 1)).collect()
    }
}

pub fn pack<P: Packing>(values: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; P::bytes_for(values.len())];
    PackedMut::<P>::new(&mut bytes).fill_from(values);
    bytes
}

pub fn unpack<P: Packing>(bytes: &[u8], len: usize) -> Vec<u8> {
    let view = Packed::<P>::new(bytes);
    (0..len).map(|i| view.get(i)).collect()
}

/// Bias-seeded accumulators `[oy][ox][ch]` of a direct convolution over
/// unpacked values. Out-of-bounds samples are raw zeros.
pub fn reference_acc(
    g: &ConvGeometry,
    input: &[u8],
    weights: &[u8],
    bias: &[i32],
    z_in: u8,
    z_wt: impl Fn(usize) -> u8,
) -> Vec<i32> {
    let dim = g.dim_im_in as isize;
    let k = g.dim_kernel;
    let mut acc = Vec::with_capacity(g.output_len());
    for oy in 0..g.dim_im_out {
        for ox in 0..g.dim_im_out {
            for co in 0..g.ch_im_out {
                let mut sum = bias[co] as i64;
                for ky in 0..k {
                    for kx in 0..k {
                        let iy = (oy * g.stride + ky) as isize - g.padding.top as isize;
                        let ix = (ox * g.stride + kx) as isize - g.padding.left as isize;
                        for ci in 0..g.ch_im_in {
                            let x = if iy < 0 || iy >= dim || ix < 0 || ix >= dim {
                                0
                            } else {
                                input[(iy as usize * g.dim_im_in + ix as usize) * g.ch_im_in + ci] as i64
                            };
                            let w = weights[((co * k + ky) * k + kx) * g.ch_im_in + ci] as i64;
                            sum += (w - z_wt(co) as i64) * (x - z_in as i64);
                        }
                    }
                }
                acc.push(sum as i32);
            }
        }
    }
    acc
}

pub fn saturate(acc: i32, bits: u32) -> u8 {
    acc.clamp(0, (1 << bits) - 1) as u8
}

/// ICN fold computed with 64-bit arithmetic.
pub fn icn_fold(acc: i32, m: i32, n: i8, z_out: u8, bits: u32) -> u8 {
    let n = n.clamp(-31, 31);
    let pre = if n < 0 { -n as u32 } else { 0 };
    let post = if n > 0 { n as u32 } else { 0 };
    let shifted = acc.wrapping_shl(pre) as i64;
    let hi = ((shifted * m as i64) >> 32) as i32;
    saturate((hi >> post).wrapping_add(z_out as i32), bits)
}

/// Threshold fold: number of ladder entries `1..2^bits` not above `acc`.
pub fn threshold_fold(acc: i32, ladder: &[i16], ch: usize, bits: u32) -> u8 {
    let stride = 1usize << bits;
    ladder[ch * stride + 1..(ch + 1) * stride]
        .iter()
        .filter(|&&t| acc >= t as i32)
        .count() as u8
}
