//! Dual-halfword integer ALU used by the convolution kernels.
//!
//! A 32-bit word carries two signed 16-bit lanes, low lane in bits 0..16.
//! The kernels are written once against [`Dsp`]; [`Native`] picks the
//! implementation for the build target.

/// Fixed-width vector ALU.
pub trait Dsp {
    /// `acc + lo(a) * lo(b) + hi(a) * hi(b)` with signed lanes, wrapping (SMLAD).
    fn mul_add_pair(a: u32, b: u32, acc: i32) -> i32;

    /// Lane-wise wrapping `a - b` (SSUB16).
    fn sub_pair(a: u32, b: u32) -> u32;

    /// High word of the signed 64-bit product (SMMUL).
    fn hi_mul(a: i32, b: i32) -> i32;

    /// Clamps `x` into `[0, 2^bits - 1]` (USAT).
    #[inline(always)]
    fn usat(x: i32, bits: u32) -> u8 {
        let max = (1i32 << bits) - 1;
        x.clamp(0, max) as u8
    }
}

/// Portable implementation on plain integer arithmetic.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scalar;

impl Dsp for Scalar {
    #[inline(always)]
    fn mul_add_pair(a: u32, b: u32, acc: i32) -> i32 {
        let (a_lo, a_hi) = split_pair(a);
        let (b_lo, b_hi) = split_pair(b);
        acc.wrapping_add(a_lo as i32 * b_lo as i32)
            .wrapping_add(a_hi as i32 * b_hi as i32)
    }

    #[inline(always)]
    fn sub_pair(a: u32, b: u32) -> u32 {
        let (a_lo, a_hi) = split_pair(a);
        let (b_lo, b_hi) = split_pair(b);
        pack_pair(a_lo.wrapping_sub(b_lo), a_hi.wrapping_sub(b_hi))
    }

    #[inline(always)]
    fn hi_mul(a: i32, b: i32) -> i32 {
        ((a as i64 * b as i64) >> 32) as i32
    }
}

#[cfg(all(target_arch = "arm", target_feature = "dsp"))]
pub type Native = crate::kernels::arm::ArmDsp;

#[cfg(not(all(target_arch = "arm", target_feature = "dsp")))]
pub type Native = Scalar;

#[inline(always)]
pub fn pack_pair(lo: i16, hi: i16) -> u32 {
    (lo as u16 as u32) | ((hi as u16 as u32) << 16)
}

#[inline(always)]
pub fn split_pair(x: u32) -> (i16, i16) {
    (x as u16 as i16, (x >> 16) as u16 as i16)
}

/// Reads `buf[idx]` and `buf[idx + 1]` as one dual-halfword word.
#[inline(always)]
pub fn load_pair(buf: &[i16], idx: usize) -> u32 {
    pack_pair(buf[idx], buf[idx + 1])
}

/// Broadcasts a zero-point to both lanes.
#[inline(always)]
pub fn splat(z: u8) -> u32 {
    pack_pair(z as i16, z as i16)
}
