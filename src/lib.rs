//! Mixed-precision integer convolution kernels.
//!
//! Activations and weights are stored densely packed at 2, 4 or 8 bits per
//! element. Convolutions unroll patches into a 16-bit scratch buffer, run a
//! two-rows-by-two-patches dot-product kernel on dual-halfword SIMD lanes and
//! requantize each output channel back to the packed output width.
//!
//! Nothing in here allocates: every buffer is borrowed from the caller.
#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub mod error;
pub mod kernels;
pub mod tensor;

pub use error::KernelError;
pub use kernels::conv2d::{
    conv_hwc, conv_hwc_u2_u2_u8_icn, conv_hwc_u4_u4_u2_pact_ch_thr, conv_hwc_u8_u8_u2_pact_ch,
    conv_hwc_with, ChannelConstraint, ConvGeometry, Padding,
};
pub use kernels::quantization::{Icn, PactCh, Requantize, ShiftPair, Thresholds};
pub use tensor::{Packed, PackedMut, Packing, WeightOffsets, U2, U4, U8};
