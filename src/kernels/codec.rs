//! Packed sub-byte <-> 16-bit working representation.
//!
//! The working order is not the logical order: inside every complete group of
//! four elements `[a0, a1, a2, a3]` the values are stored as
//! `[a0, a2, a1, a3]`, so that a 32-bit load yields the halfword pairs
//! `(a0, a2)` and `(a1, a3)`. Weight rows and patches are both read in this
//! order, which leaves their dot product unchanged. Elements past the last
//! complete group keep their logical position.

use crate::kernels::dsp::pack_pair;
use crate::tensor::Packing;

const REORDER: [usize; 4] = [0, 2, 1, 3];

/// Working-order position of logical element `i` in a vector of `n` elements.
/// The mapping is its own inverse.
#[inline(always)]
pub fn reorder_index(i: usize, n: usize) -> usize {
    let base = i & !3;
    if base + 4 <= n {
        base + REORDER[i & 3]
    } else {
        i
    }
}

/// Unpacks `dst.len()` elements from the start of `src` into `dst` as
/// `value - z`, in working order.
#[inline]
pub fn unpack_reordered<P: Packing>(src: &[u8], dst: &mut [i16], z: u8) {
    let z = z as i16;
    let full = dst.len() & !3;
    let (body, tail) = dst.split_at_mut(full);
    for (q, chunk) in body.chunks_exact_mut(4).enumerate() {
        let [a0, a1, a2, a3] = P::quad(src, q * 4);
        chunk[0] = a0 as i16 - z;
        chunk[1] = a2 as i16 - z;
        chunk[2] = a1 as i16 - z;
        chunk[3] = a3 as i16 - z;
    }
    for (j, d) in tail.iter_mut().enumerate() {
        *d = P::get(src, full + j) as i16 - z;
    }
}

/// Inverse of [`unpack_reordered`]: adds `z` back, clamps into `[0, MAX]` and
/// packs `src.len()` elements into the start of `dst`. Bits of `dst` past the
/// last element are left untouched.
pub fn pack_reordered<P: Packing>(src: &[i16], dst: &mut [u8], z: u8) {
    let n = src.len();
    for i in 0..n {
        let v = (src[reorder_index(i, n)] as i32 + z as i32).clamp(0, P::MAX as i32);
        P::set(dst, i, v as u8);
    }
}

/// Reads one 32-bit word of packed weights (`P::BLOCK` elements) into
/// `P::BLOCK / 2` dual-halfword lanes in working order, without zero-point
/// subtraction. Returns `src` advanced past the word.
#[inline(always)]
pub fn read_and_pad_reordered<'a, P: Packing>(src: &'a [u8], lanes: &mut [u32; 8]) -> &'a [u8] {
    for q in 0..P::BLOCK / 4 {
        let [a0, a1, a2, a3] = P::quad(src, q * 4);
        lanes[2 * q] = pack_pair(a0 as i16, a2 as i16);
        lanes[2 * q + 1] = pack_pair(a1 as i16, a3 as i16);
    }
    &src[4..]
}

/// Padding contribution of an out-of-bounds sample: a raw 0, shifted by the
/// input zero-point like any real sample.
#[inline(always)]
pub fn fill_padding(dst: &mut [i16], z: u8) {
    dst.fill(-(z as i16));
}
