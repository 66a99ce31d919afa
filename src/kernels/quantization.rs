//! Per-output-channel requantization of 32-bit accumulators.

use crate::error::KernelError;
use crate::kernels::dsp::Dsp;
use crate::tensor::Packing;

/// Folds a bias-seeded accumulator of output channel `ch` into
/// `[0, O::MAX]`.
pub trait Requantize {
    fn requantize<O: Packing, D: Dsp>(&self, ch: usize, acc: i32) -> u8;

    /// Checks that the per-channel parameters cover `ch_im_out` channels.
    fn check<O: Packing>(&self, ch_im_out: usize) -> Result<(), KernelError>;
}

/// A signed shift split into a left pre-shift and a right post-shift.
///
/// Negative shifts scale up before the high-word multiply, non-negative ones
/// scale down after it. Both halves lie in `0..=31`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftPair {
    pub pre: u32,
    pub post: u32,
}

impl ShiftPair {
    pub const MAX_SHIFT: i8 = 31;

    /// Domain is `[-31, 31]`; values outside are clamped into it.
    #[inline(always)]
    pub fn normalize(shift: i8) -> Self {
        let s = shift.clamp(-Self::MAX_SHIFT, Self::MAX_SHIFT);
        if s < 0 {
            ShiftPair {
                pre: s.unsigned_abs() as u32,
                post: 0,
            }
        } else {
            ShiftPair {
                pre: 0,
                post: s as u32,
            }
        }
    }
}

/// Integer-channel-normalization folding: per-channel multiplier and shift.
///
/// `out = usat(hi_mul(acc << pre, m_zero[ch]) >> post + z_out)`
#[derive(Debug, Clone, Copy)]
pub struct Icn<'a> {
    pub z_out: u8,
    pub m_zero: &'a [i32],
    pub n_zero: &'a [i8],
}

impl Requantize for Icn<'_> {
    #[inline(always)]
    fn requantize<O: Packing, D: Dsp>(&self, ch: usize, acc: i32) -> u8 {
        let shift = ShiftPair::normalize(self.n_zero[ch]);
        let scaled = D::hi_mul(acc.wrapping_shl(shift.pre), self.m_zero[ch]) >> shift.post;
        D::usat(scaled.wrapping_add(self.z_out as i32), O::BITS)
    }

    fn check<O: Packing>(&self, ch_im_out: usize) -> Result<(), KernelError> {
        KernelError::check_len("m_zero", ch_im_out, self.m_zero.len())?;
        KernelError::check_len("n_zero", ch_im_out, self.n_zero.len())
    }
}

/// Threshold folding: each channel owns an ascending ladder of `2^BITS`
/// entries (entry 0 unused). The output is the largest `k` with
/// `acc >= ladder[k]`, or 0.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds<'a> {
    pub ladder: &'a [i16],
}

impl Thresholds<'_> {
    #[inline(always)]
    fn channel<O: Packing>(&self, ch: usize) -> &[i16] {
        let stride = 1usize << O::BITS;
        &self.ladder[ch * stride + 1..(ch + 1) * stride]
    }
}

impl Requantize for Thresholds<'_> {
    #[inline(always)]
    fn requantize<O: Packing, D: Dsp>(&self, ch: usize, acc: i32) -> u8 {
        let k = self.channel::<O>(ch).partition_point(|&t| acc >= t as i32);
        D::usat(k as i32, O::BITS)
    }

    fn check<O: Packing>(&self, ch_im_out: usize) -> Result<(), KernelError> {
        KernelError::check_len("thresholds", ch_im_out << O::BITS, self.ladder.len())
    }
}

/// PACT per-channel: weight zero-points are already folded into the
/// accumulation, so only the saturating cast remains.
#[derive(Debug, Clone, Copy, Default)]
pub struct PactCh;

impl Requantize for PactCh {
    #[inline(always)]
    fn requantize<O: Packing, D: Dsp>(&self, _ch: usize, acc: i32) -> u8 {
        D::usat(acc, O::BITS)
    }

    fn check<O: Packing>(&self, _ch_im_out: usize) -> Result<(), KernelError> {
        Ok(())
    }
}
