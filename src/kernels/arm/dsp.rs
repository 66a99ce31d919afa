//! Cortex-M DSP extension (ARMv7E-M) implementation of the dual-halfword ALU.

use crate::kernels::dsp::Dsp;
use core::arch::asm;

#[derive(Debug, Clone, Copy, Default)]
pub struct ArmDsp;

impl Dsp for ArmDsp {
    #[inline(always)]
    fn mul_add_pair(a: u32, b: u32, acc: i32) -> i32 {
        let out: i32;
        unsafe {
            asm!(
                "smlad {out}, {a}, {b}, {acc}",
                out = lateout(reg) out,
                a = in(reg) a,
                b = in(reg) b,
                acc = in(reg) acc,
                options(pure, nomem, nostack)
            );
        }
        out
    }

    #[inline(always)]
    fn sub_pair(a: u32, b: u32) -> u32 {
        let out: u32;
        unsafe {
            // SSUB16 also sets the GE flags, which nothing here reads.
            asm!(
                "ssub16 {out}, {a}, {b}",
                out = lateout(reg) out,
                a = in(reg) a,
                b = in(reg) b,
                options(pure, nomem, nostack)
            );
        }
        out
    }

    #[inline(always)]
    fn hi_mul(a: i32, b: i32) -> i32 {
        let out: i32;
        unsafe {
            asm!(
                "smmul {out}, {a}, {b}",
                out = lateout(reg) out,
                a = in(reg) a,
                b = in(reg) b,
                options(pure, nomem, nostack)
            );
        }
        out
    }
}
